use async_trait::async_trait;
use thiserror::Error;

/// Aggregated result of one submitted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Concatenated stdout and stderr text, in arrival order.
    pub output: String,
    /// Exit code of the spawned command; 0 for in-process built-ins.
    pub exit_code: i32,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    /// The server reported a spawn-level failure for the command.
    #[error("command failed: {message}")]
    Command { message: String },
    /// The channel itself failed (connection lost, protocol violation).
    #[error("channel transport failure: {message}")]
    Transport { message: String },
}

/// One command in flight at a time, enforced by `&mut self`: a caller
/// cannot issue the next command until the previous call resolved.
#[async_trait]
pub trait CommandChannel: Send {
    async fn run_command(&mut self, command: &str) -> Result<CommandOutcome, ChannelError>;
}
