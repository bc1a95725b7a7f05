use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::BufReader;
use tokio::process::Command;
use tokio::sync::mpsc::Sender;

use opshell_protocol::OutputStream;
use opshell_protocol::ServerMessage;

use crate::error::ShellError;

pub(crate) const EXEC_TIMEOUT_EXIT_CODE: i32 = 124; // conventional timeout exit code
const EXIT_CODE_SIGNAL_BASE: i32 = 128; // conventional shell: 128 + signal
const READ_CHUNK_SIZE: usize = 8192; // bytes per read

#[derive(Debug, Clone)]
pub(crate) struct ExecParams {
    pub line: String,
    pub cwd: PathBuf,
    pub timeout: Option<Duration>,
}

/// Emits streamed output events for one submission.
#[derive(Clone)]
pub(crate) struct OutputSink {
    pub seq: u64,
    pub tx: Sender<ServerMessage>,
}

impl OutputSink {
    pub(crate) async fn emit(&self, stream: OutputStream, text: String) {
        let _ = self
            .tx
            .send(ServerMessage::Output {
                seq: self.seq,
                stream,
                text,
            })
            .await;
    }
}

/// Run one sub-command as a child process, streaming stdout and stderr
/// chunks as they arrive, and return its exit code. The sub-command text is
/// handed to the platform shell verbatim with the session's working
/// directory as cwd.
pub(crate) async fn run_subcommand(params: ExecParams, sink: OutputSink) -> Result<i32, ShellError> {
    let mut child = shell_command(&params.line)
        .current_dir(&params.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|error| ShellError::spawn(&params.line, error))?;

    // Both streams were configured with `Stdio::piped()` above, so `take()`
    // should normally return `Some`; treat anything else as an I/O error.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ShellError::read_output(std::io::Error::other("stdout pipe missing")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ShellError::read_output(std::io::Error::other("stderr pipe missing")))?;

    let stdout_task = tokio::spawn(stream_chunks(
        BufReader::new(stdout),
        OutputStream::Stdout,
        sink.clone(),
    ));
    let stderr_task = tokio::spawn(stream_chunks(
        BufReader::new(stderr),
        OutputStream::Stderr,
        sink.clone(),
    ));

    let (exit_code, timed_out) = match params.timeout {
        Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => (
                exit_code_of(status.map_err(|error| ShellError::Wait { error })?),
                false,
            ),
            Err(_) => {
                child
                    .start_kill()
                    .map_err(|error| ShellError::Wait { error })?;
                let _ = child.wait().await;
                (EXEC_TIMEOUT_EXIT_CODE, true)
            }
        },
        None => (
            exit_code_of(
                child
                    .wait()
                    .await
                    .map_err(|error| ShellError::Wait { error })?,
            ),
            false,
        ),
    };

    // Drain the readers before reporting the exit so output events never
    // trail the exit event.
    let _ = stdout_task.await;
    let _ = stderr_task.await;

    if timed_out {
        sink.emit(
            OutputStream::Stderr,
            format!(
                "command timed out after {}s and was killed\n",
                params.timeout.unwrap_or_default().as_secs()
            ),
        )
        .await;
    }

    Ok(exit_code)
}

async fn stream_chunks<R: AsyncRead + Unpin + Send + 'static>(
    mut reader: R,
    stream: OutputStream,
    sink: OutputSink,
) -> std::io::Result<()> {
    let mut buf = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&buf[..n]).into_owned();
        sink.emit(stream, text).await;
    }
    Ok(())
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(line);
    cmd
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(line);
    cmd
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or_else(|| {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return EXIT_CODE_SIGNAL_BASE + signal;
            }
        }
        -1
    })
}
