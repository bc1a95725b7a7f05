use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;

use opshell_server::ServerConfig;

#[derive(Debug, Parser)]
pub struct ServeCommand {
    /// Path to a TOML config file.
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Override the configured bind address.
    #[arg(long = "bind", value_name = "ADDR")]
    bind: Option<SocketAddr>,
}

impl ServeCommand {
    pub async fn run(self) -> Result<()> {
        let mut config = ServerConfig::load(self.config.as_deref())?;
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        opshell_server::serve(config)
            .await
            .context("session shell server failed")
    }
}
