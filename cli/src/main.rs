mod provision_cmd;
mod serve_cmd;
mod ws_channel;

use anyhow::Result;
use clap::Parser;
use clap::Subcommand;

use crate::provision_cmd::ProvisionCommand;
use crate::serve_cmd::ServeCommand;

/// Session shell server and GitOps provisioning client.
#[derive(Debug, Parser)]
#[command(name = "opshell", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the session shell server.
    Serve(ServeCommand),
    /// Run the provisioning pipeline against a running server.
    Provision(ProvisionCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    match Cli::parse().command {
        Command::Serve(cmd) => cmd.run().await,
        Command::Provision(cmd) => cmd.run().await,
    }
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
