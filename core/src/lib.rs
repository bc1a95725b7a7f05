//! Session shell engine.
//!
//! Each channel connection owns one [`SessionHandle`]: an actor
//! task holding the session's mutable working directory and processing
//! submissions strictly one at a time. Submitted text is split into
//! newline-delimited sub-commands; `cd`/`ls`/`clear` are handled in
//! process, everything else is spawned as a child of the server and its
//! output streamed back as it arrives.

mod command;
mod error;
mod exec;
mod session;

pub use command::DomainTool;
pub use command::SubCommand;
pub use command::classify;
pub use command::split_submission;
pub use error::ShellError;
pub use session::CLEAR_SEQUENCE;
pub use session::SessionConfig;
pub use session::SessionHandle;
pub use session::spawn_session;
