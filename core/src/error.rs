use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to spawn `{command}`: {error}")]
    Spawn {
        command: String,
        #[source]
        error: io::Error,
    },
    #[error("program `{program}` is not permitted on this channel")]
    ProgramNotAllowed { program: String },
    #[error("failed to read process output: {error}")]
    ReadOutput {
        #[source]
        error: io::Error,
    },
    #[error("failed to wait for child process: {error}")]
    Wait {
        #[source]
        error: io::Error,
    },
    #[error("session is no longer accepting submissions")]
    SessionClosed,
}

impl ShellError {
    pub(crate) fn spawn(command: &str, error: io::Error) -> Self {
        Self::Spawn {
            command: command.to_string(),
            error,
        }
    }

    pub(crate) fn read_output(error: io::Error) -> Self {
        Self::ReadOutput { error }
    }
}
