//! Wire types for the shell channel.
//!
//! One WebSocket connection carries one session. The client submits raw
//! (possibly multi-line) command text; the server streams events back.
//! Every outbound event echoes the per-session sequence number assigned to
//! the submission it belongs to, so a client can correlate interleaved
//! traffic without relying on listener registration order.

use serde::Deserialize;
use serde::Serialize;

/// Messages accepted from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Raw command text. Multi-line input is split into independent
    /// sub-commands server-side.
    Submit { text: String },
}

/// Which child-process stream a chunk of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Messages emitted by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A chunk of output, streamed as it is produced. Built-in commands
    /// (`cd`, `ls`, `clear`) report on the stdout stream.
    Output {
        seq: u64,
        stream: OutputStream,
        text: String,
    },
    /// A spawned sub-command exited. Emitted once per child process; not
    /// emitted for built-ins.
    CommandExited { seq: u64, exit_code: i32 },
    /// A sub-command could not be spawned at all. Non-zero exits are *not*
    /// reported here; they arrive as `CommandExited`.
    CommandError { seq: u64, message: String },
    /// Every sub-command of the submission has been processed.
    SubmissionComplete { seq: u64 },
}

impl ServerMessage {
    /// Sequence number of the submission this event belongs to.
    pub fn seq(&self) -> u64 {
        match self {
            ServerMessage::Output { seq, .. }
            | ServerMessage::CommandExited { seq, .. }
            | ServerMessage::CommandError { seq, .. }
            | ServerMessage::SubmissionComplete { seq } => *seq,
        }
    }
}
