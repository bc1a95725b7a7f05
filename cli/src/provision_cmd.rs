use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use chrono::Utc;
use clap::Parser;

use opshell_provision::PipelineRun;
use opshell_provision::ProvisioningContext;
use opshell_provision::Provisioner;
use opshell_provision::ReadinessPoll;
use opshell_provision::registry::CredentialRegistry;
use opshell_provision::registry::DeploymentRecord;
use opshell_provision::registry::DeploymentRegistry;
use opshell_provision::registry::EnvCredentialRegistry;
use opshell_provision::registry::JsonFileDeploymentRegistry;

use crate::ws_channel::WsChannel;

#[derive(Debug, Parser)]
pub struct ProvisionCommand {
    /// WebSocket endpoint of the session shell server.
    #[arg(
        long = "channel",
        value_name = "URL",
        default_value = "ws://127.0.0.1:8787/channel"
    )]
    channel: String,
    /// Target EKS cluster name.
    #[arg(long = "cluster", value_name = "NAME")]
    cluster: String,
    /// Cluster region.
    #[arg(long = "region", value_name = "REGION")]
    region: String,
    /// Namespace applications are deployed into.
    #[arg(long = "namespace", value_name = "NAMESPACE")]
    namespace: String,
    /// Source repository URL (a trailing `.git` is stripped).
    #[arg(long = "repo", value_name = "URL")]
    repository_url: Option<String>,
    /// Selected source folder in `repo/folder` form.
    #[arg(long = "folder", value_name = "REPO/FOLDER")]
    source_folder: Option<String>,
    /// Log in to the controller once the pipeline is ready.
    #[arg(long = "login")]
    login: bool,
    /// Register the repository and create the application once ready.
    /// Git credentials come from OPSHELL_GIT_USERNAME / OPSHELL_GIT_TOKEN.
    #[arg(long = "register")]
    register: bool,
    /// Append the completed dialog to this JSON-lines record file.
    #[arg(long = "record", value_name = "PATH")]
    record_path: Option<PathBuf>,
    /// Post-install readiness poll attempts.
    #[arg(long = "readiness-attempts", value_name = "N", default_value_t = 24)]
    readiness_attempts: u32,
    /// Seconds between readiness poll attempts.
    #[arg(long = "readiness-interval", value_name = "SECS", default_value_t = 5)]
    readiness_interval_secs: u64,
}

impl ProvisionCommand {
    pub async fn run(self) -> Result<()> {
        let mut ctx = ProvisioningContext::new(&self.cluster, &self.region, &self.namespace);
        ctx.repository_url = self.repository_url.clone();
        ctx.source_folder = self.source_folder.clone();
        ctx.git_credentials = EnvCredentialRegistry::new().git_credentials();

        let channel = WsChannel::connect(&self.channel)
            .await
            .context("could not reach the session shell server")?;
        let readiness = ReadinessPoll {
            interval: Duration::from_secs(self.readiness_interval_secs),
            max_attempts: self.readiness_attempts,
        };
        let mut provisioner = Provisioner::with_readiness(channel, readiness);

        let run = provisioner
            .run_pipeline(&mut ctx)
            .await
            .context("provisioning pipeline failed")?;
        let outcome = match run {
            PipelineRun::Completed(outcome) => outcome,
            PipelineRun::Skipped => bail!("context was already initialized"),
        };

        println!();
        println!("controller endpoint: {}", outcome.endpoint);
        match &outcome.initial_password {
            Some(password) => {
                println!("initial admin password: {password}");
            }
            None => println!("initial admin password unavailable (may already be rotated)"),
        }

        if self.login {
            provisioner
                .login(&ctx)
                .await
                .context("controller login failed")?;
        }
        if self.register {
            provisioner
                .register_and_create(&ctx)
                .await
                .context("repository registration / application creation failed")?;
        }

        if let Some(path) = &self.record_path {
            let record = DeploymentRecord {
                cluster: ctx.cluster.clone(),
                region: ctx.region.clone(),
                namespace: ctx.namespace.clone(),
                repository_url: ctx.repository_url.clone(),
                source_folder: ctx.source_folder.clone(),
                endpoint: outcome.endpoint.clone(),
                recorded_at: Utc::now(),
            };
            JsonFileDeploymentRegistry::new(path.clone())
                .record(&record)
                .with_context(|| format!("could not append deployment record to {}", path.display()))?;
        }

        Ok(())
    }
}
