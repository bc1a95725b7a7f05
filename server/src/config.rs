use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use opshell_core::SessionConfig;

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8787))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {error}")]
    Read {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("failed to parse config file `{path}`: {error}")]
    Parse {
        path: PathBuf,
        #[source]
        error: toml::de::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the WebSocket server listens on.
    pub bind: SocketAddr,
    /// Starting working directory for new sessions; the server process's
    /// own working directory when unset.
    pub initial_dir: Option<PathBuf>,
    /// Optional program allow-list applied to spawned sub-commands.
    pub allowed_programs: Option<Vec<String>>,
    /// Optional per-command timeout in seconds.
    pub command_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            initial_dir: None,
            allowed_programs: None,
            command_timeout_secs: None,
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file, or fall back to defaults when no path is
    /// given. A named file that cannot be read or parsed is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        toml::from_str(&contents).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    pub(crate) fn session_config(&self) -> std::io::Result<SessionConfig> {
        let initial_dir = match &self.initial_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let mut session = SessionConfig::new(initial_dir);
        session.allowed_programs = self.allowed_programs.clone();
        session.command_timeout = self.command_timeout_secs.map(Duration::from_secs);
        Ok(session)
    }
}
