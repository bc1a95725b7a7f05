use thiserror::Error;

use crate::channel::ChannelError;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{step}: {source}")]
    Channel {
        step: &'static str,
        #[source]
        source: ChannelError,
    },
    #[error("{step} failed with exit code {exit_code}")]
    StepFailed { step: &'static str, exit_code: i32 },
    #[error("controller pods not ready after {attempts} checks")]
    ControllerNotReady { attempts: u32 },
    #[error("missing {field}")]
    MissingField { field: &'static str },
    #[error("endpoint or initial password not available; run the pipeline first")]
    CredentialsUnavailable,
    #[error("invalid source folder `{folder}`; expected `repo/folder`")]
    InvalidSourceFolder { folder: String },
}

impl ProvisionError {
    pub(crate) fn channel(step: &'static str, source: ChannelError) -> Self {
        Self::Channel { step, source }
    }
}
