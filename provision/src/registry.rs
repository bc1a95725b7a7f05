//! Collaborator contracts consumed by the orchestrator. These are
//! conventional request/response surfaces; only the pieces the CLI actually
//! drives ship with an implementation here.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::context::GitCredentials;

/// Outcome of a completed provisioning dialog, persisted for later reuse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentRecord {
    pub cluster: String,
    pub region: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_folder: Option<String>,
    pub endpoint: String,
    pub recorded_at: DateTime<Utc>,
}

/// Where completed dialogs are persisted.
pub trait DeploymentRegistry {
    fn record(&mut self, record: &DeploymentRecord) -> std::io::Result<()>;
}

/// Reads the acting user's git credentials.
pub trait CredentialRegistry {
    fn git_credentials(&self) -> Option<GitCredentials>;
}

/// Appends one JSON line per deployment record.
#[derive(Debug, Clone)]
pub struct JsonFileDeploymentRegistry {
    path: PathBuf,
}

impl JsonFileDeploymentRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl DeploymentRegistry for JsonFileDeploymentRegistry {
    fn record(&mut self, record: &DeploymentRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record).map_err(std::io::Error::other)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

/// Resolves git credentials from the process environment.
#[derive(Debug, Clone)]
pub struct EnvCredentialRegistry {
    username_var: &'static str,
    token_var: &'static str,
}

impl EnvCredentialRegistry {
    pub fn new() -> Self {
        Self {
            username_var: "OPSHELL_GIT_USERNAME",
            token_var: "OPSHELL_GIT_TOKEN",
        }
    }
}

impl Default for EnvCredentialRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialRegistry for EnvCredentialRegistry {
    fn git_credentials(&self) -> Option<GitCredentials> {
        let username = std::env::var(self.username_var).ok()?;
        let token = std::env::var(self.token_var).ok()?;
        if username.is_empty() || token.is_empty() {
            return None;
        }
        Some(GitCredentials { username, token })
    }
}
