use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;

use opshell_protocol::OutputStream;
use opshell_protocol::ServerMessage;

use crate::command::DomainTool;
use crate::command::SubCommand;
use crate::command::classify;
use crate::command::first_program;
use crate::command::split_submission;
use crate::error::ShellError;
use crate::exec::ExecParams;
use crate::exec::OutputSink;
use crate::exec::run_subcommand;

/// Terminal reset sequence answered to `clear`. Session state is unaffected.
pub const CLEAR_SEQUENCE: &str = "\x1b[2J\x1b[H";

const SUBMISSION_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Starting working directory for the session.
    pub initial_dir: PathBuf,
    /// Optional program allow-list. When set, the first shell token of a
    /// spawned sub-command must name one of these programs; anything else
    /// is refused at spawn level. `None` preserves the trusted-operator
    /// model: the channel runs arbitrary commands as the server's identity.
    pub allowed_programs: Option<Vec<String>>,
    /// Optional per-command timeout. A child still running when it elapses
    /// is killed and reported with exit code 124.
    pub command_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn new(initial_dir: PathBuf) -> Self {
        Self {
            initial_dir,
            allowed_programs: None,
            command_timeout: None,
        }
    }
}

/// Client-side handle to a session actor. Dropping the handle closes the
/// submission queue and lets the actor task wind down; no session state
/// survives it.
#[derive(Debug)]
pub struct SessionHandle {
    submissions: mpsc::Sender<String>,
    _task: JoinHandle<()>,
}

impl SessionHandle {
    /// Queue one submission. Submissions are processed strictly in order,
    /// one at a time; the queue is the busy gate, so two submissions can
    /// never interleave their events.
    pub async fn submit(&self, text: impl Into<String>) -> Result<(), ShellError> {
        self.submissions
            .send(text.into())
            .await
            .map_err(|_| ShellError::SessionClosed)
    }
}

/// Spawn a session actor that owns the working directory and emits
/// [`ServerMessage`] events for every submission it processes.
pub fn spawn_session(
    config: SessionConfig,
    events: mpsc::Sender<ServerMessage>,
) -> SessionHandle {
    let (tx, mut rx) = mpsc::channel::<String>(SUBMISSION_QUEUE_DEPTH);
    let task = tokio::spawn(async move {
        let mut session = ShellSession::new(config, events);
        while let Some(text) = rx.recv().await {
            session.handle_submission(&text).await;
        }
        debug!("session actor stopped");
    });
    SessionHandle {
        submissions: tx,
        _task: task,
    }
}

struct ShellSession {
    working_dir: PathBuf,
    next_seq: u64,
    allowed_programs: Option<Vec<String>>,
    command_timeout: Option<Duration>,
    events: mpsc::Sender<ServerMessage>,
}

impl ShellSession {
    fn new(config: SessionConfig, events: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            working_dir: config.initial_dir,
            next_seq: 0,
            allowed_programs: config.allowed_programs,
            command_timeout: config.command_timeout,
            events,
        }
    }

    async fn handle_submission(&mut self, text: &str) {
        self.next_seq += 1;
        let seq = self.next_seq;
        // Sub-commands run strictly sequentially; a failing one never stops
        // the rest of the batch.
        for line in split_submission(text) {
            match classify(line) {
                SubCommand::ChangeDir { target } => self.change_dir(seq, &target).await,
                SubCommand::ListDir => self.list_dir(seq).await,
                SubCommand::ClearScreen => {
                    self.emit_output(seq, OutputStream::Stdout, CLEAR_SEQUENCE.to_string())
                        .await;
                }
                SubCommand::Spawn { line, tool } => self.run_child(seq, &line, tool).await,
            }
        }
        let _ = self
            .events
            .send(ServerMessage::SubmissionComplete { seq })
            .await;
    }

    async fn change_dir(&mut self, seq: u64, target: &str) {
        let resolved = if target == ".." {
            self.working_dir
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.working_dir.clone())
        } else {
            self.working_dir.join(target)
        };
        if resolved.is_dir() {
            self.working_dir = std::fs::canonicalize(&resolved).unwrap_or(resolved);
            let text = format!("changed directory to {}", self.working_dir.display());
            self.emit_output(seq, OutputStream::Stdout, text).await;
        } else {
            // Reported as ordinary output: the error event kind is reserved
            // for process-level failures.
            let text = format!("cd: not a directory: {target}");
            self.emit_output(seq, OutputStream::Stdout, text).await;
        }
    }

    async fn list_dir(&mut self, seq: u64) {
        let text = match read_dir_names(&self.working_dir).await {
            Ok(mut names) => {
                names.sort();
                names.join("\n")
            }
            Err(error) => format!("ls: {error}"),
        };
        self.emit_output(seq, OutputStream::Stdout, text).await;
    }

    async fn run_child(&mut self, seq: u64, line: &str, tool: Option<DomainTool>) {
        if let Some(allowed) = &self.allowed_programs {
            let program = first_program(line);
            let permitted = program
                .as_deref()
                .is_some_and(|p| allowed.iter().any(|a| a == p));
            if !permitted {
                let error = ShellError::ProgramNotAllowed {
                    program: program.unwrap_or_else(|| line.to_string()),
                };
                self.emit_error(seq, error.to_string()).await;
                return;
            }
        }

        info!(
            seq,
            tool = tool.map(DomainTool::label).unwrap_or("generic"),
            command = line,
            "spawning sub-command"
        );
        let params = ExecParams {
            line: line.to_string(),
            cwd: self.working_dir.clone(),
            timeout: self.command_timeout,
        };
        let sink = OutputSink {
            seq,
            tx: self.events.clone(),
        };
        match run_subcommand(params, sink).await {
            Ok(exit_code) => {
                let _ = self
                    .events
                    .send(ServerMessage::CommandExited { seq, exit_code })
                    .await;
            }
            Err(error) => self.emit_error(seq, error.to_string()).await,
        }
    }

    async fn emit_output(&self, seq: u64, stream: OutputStream, text: String) {
        let _ = self
            .events
            .send(ServerMessage::Output { seq, stream, text })
            .await;
    }

    async fn emit_error(&self, seq: u64, message: String) {
        let _ = self
            .events
            .send(ServerMessage::CommandError { seq, message })
            .await;
    }
}

async fn read_dir_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn start(config: SessionConfig) -> (SessionHandle, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(256);
        (spawn_session(config, tx), rx)
    }

    /// Receive events until (and including) the next `SubmissionComplete`.
    async fn collect_submission(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let done = matches!(event, ServerMessage::SubmissionComplete { .. });
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    fn output_text(events: &[ServerMessage]) -> String {
        events
            .iter()
            .filter_map(|event| match event {
                ServerMessage::Output { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_sub_commands_strictly_in_order() {
        let dir = TempDir::new().expect("tempdir");
        let (session, mut rx) = start(SessionConfig::new(dir.path().to_path_buf()));

        session.submit("printf one\nprintf two").await.expect("submit");
        let events = collect_submission(&mut rx).await;

        assert_eq!(
            events,
            vec![
                ServerMessage::Output {
                    seq: 1,
                    stream: OutputStream::Stdout,
                    text: "one".to_string(),
                },
                ServerMessage::CommandExited {
                    seq: 1,
                    exit_code: 0,
                },
                ServerMessage::Output {
                    seq: 1,
                    stream: OutputStream::Stdout,
                    text: "two".to_string(),
                },
                ServerMessage::CommandExited {
                    seq: 1,
                    exit_code: 0,
                },
                ServerMessage::SubmissionComplete { seq: 1 },
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_does_not_stop_the_batch() {
        let dir = TempDir::new().expect("tempdir");
        let (session, mut rx) = start(SessionConfig::new(dir.path().to_path_buf()));

        session.submit("false\nprintf ok").await.expect("submit");
        let events = collect_submission(&mut rx).await;

        assert_eq!(
            events,
            vec![
                ServerMessage::CommandExited {
                    seq: 1,
                    exit_code: 1,
                },
                ServerMessage::Output {
                    seq: 1,
                    stream: OutputStream::Stdout,
                    text: "ok".to_string(),
                },
                ServerMessage::CommandExited {
                    seq: 1,
                    exit_code: 0,
                },
                ServerMessage::SubmissionComplete { seq: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn working_directory_persists_across_submissions() {
        let dir = TempDir::new().expect("tempdir");
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).expect("mkdir");
        std::fs::write(sub.join("a.txt"), b"").expect("write");
        std::fs::write(sub.join("b.txt"), b"").expect("write");
        let (session, mut rx) = start(SessionConfig::new(dir.path().to_path_buf()));

        session.submit("cd sub").await.expect("submit");
        collect_submission(&mut rx).await;
        session.submit("ls").await.expect("submit");
        let events = collect_submission(&mut rx).await;

        assert_eq!(output_text(&events), "a.txt\nb.txt");
    }

    #[tokio::test]
    async fn dot_dot_moves_to_parent() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");
        let (session, mut rx) = start(SessionConfig::new(dir.path().join("sub")));

        session.submit("cd ..").await.expect("submit");
        collect_submission(&mut rx).await;
        session.submit("ls").await.expect("submit");
        let events = collect_submission(&mut rx).await;

        assert_eq!(output_text(&events), "sub");
    }

    #[tokio::test]
    async fn invalid_cd_target_is_plain_output_not_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let (session, mut rx) = start(SessionConfig::new(dir.path().to_path_buf()));

        session.submit("cd missing-dir").await.expect("submit");
        let events = collect_submission(&mut rx).await;

        assert!(
            events
                .iter()
                .all(|e| !matches!(e, ServerMessage::CommandError { .. }))
        );
        assert!(output_text(&events).contains("missing-dir"));
    }

    #[tokio::test]
    async fn clear_answers_with_reset_sequence() {
        let dir = TempDir::new().expect("tempdir");
        let (session, mut rx) = start(SessionConfig::new(dir.path().to_path_buf()));

        session.submit("clear").await.expect("submit");
        let events = collect_submission(&mut rx).await;

        assert_eq!(output_text(&events), CLEAR_SEQUENCE);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn allow_list_refuses_unlisted_programs() {
        let dir = TempDir::new().expect("tempdir");
        let mut config = SessionConfig::new(dir.path().to_path_buf());
        config.allowed_programs = Some(vec!["printf".to_string()]);
        let (session, mut rx) = start(config);

        session.submit("uname -a").await.expect("submit");
        let events = collect_submission(&mut rx).await;
        assert!(matches!(
            events.first(),
            Some(ServerMessage::CommandError { seq: 1, .. })
        ));
        assert!(
            events
                .iter()
                .all(|e| !matches!(e, ServerMessage::CommandExited { .. }))
        );

        session.submit("printf fine").await.expect("submit");
        let events = collect_submission(&mut rx).await;
        assert_eq!(output_text(&events), "fine");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timed_out_command_is_killed_and_reports_124() {
        let dir = TempDir::new().expect("tempdir");
        let mut config = SessionConfig::new(dir.path().to_path_buf());
        config.command_timeout = Some(Duration::from_millis(200));
        let (session, mut rx) = start(config);

        session.submit("sleep 30").await.expect("submit");
        let events = collect_submission(&mut rx).await;

        assert!(events.contains(&ServerMessage::CommandExited {
            seq: 1,
            exit_code: 124,
        }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn queued_submissions_never_interleave() {
        let dir = TempDir::new().expect("tempdir");
        let (session, mut rx) = start(SessionConfig::new(dir.path().to_path_buf()));

        // Queue the second submission while the first is still running.
        session.submit("sleep 0.2\nprintf first").await.expect("submit");
        session.submit("printf second").await.expect("submit");

        let first = collect_submission(&mut rx).await;
        let second = collect_submission(&mut rx).await;

        assert!(first.iter().all(|e| e.seq() == 1));
        assert!(second.iter().all(|e| e.seq() == 2));
        assert_eq!(output_text(&first), "first");
        assert_eq!(output_text(&second), "second");
    }
}
