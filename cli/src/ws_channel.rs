use std::io::Write;

use async_trait::async_trait;
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

use opshell_protocol::ClientMessage;
use opshell_protocol::OutputStream;
use opshell_protocol::ServerMessage;
use opshell_provision::channel::ChannelError;
use opshell_provision::channel::CommandChannel;
use opshell_provision::channel::CommandOutcome;

/// `CommandChannel` over a live WebSocket connection. Every event is echoed
/// to the terminal verbatim as it arrives, so tolerated failures are still
/// visible in the transcript.
pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsChannel {
    pub async fn connect(url: &str) -> Result<Self, ChannelError> {
        let (stream, _) = connect_async(url).await.map_err(|error| {
            ChannelError::Transport {
                message: format!("failed to connect to {url}: {error}"),
            }
        })?;
        Ok(Self { stream })
    }
}

#[async_trait]
impl CommandChannel for WsChannel {
    async fn run_command(&mut self, command: &str) -> Result<CommandOutcome, ChannelError> {
        println!("$ {command}");
        let submit = serde_json::to_string(&ClientMessage::Submit {
            text: command.to_string(),
        })
        .map_err(|error| ChannelError::Transport {
            message: format!("failed to serialize submission: {error}"),
        })?;
        self.stream
            .send(Message::Text(submit.into()))
            .await
            .map_err(|error| ChannelError::Transport {
                message: format!("failed to send submission: {error}"),
            })?;

        let mut output = String::new();
        let mut exit_code = 0;
        let mut spawn_failure: Option<String> = None;
        loop {
            let Some(frame) = self.stream.next().await else {
                return Err(ChannelError::Transport {
                    message: "connection closed mid-command".to_string(),
                });
            };
            let frame = frame.map_err(|error| ChannelError::Transport {
                message: format!("websocket receive failed: {error}"),
            })?;
            let Message::Text(text) = frame else {
                continue;
            };
            let event: ServerMessage = match serde_json::from_str(&text) {
                Ok(event) => event,
                Err(error) => {
                    warn!(error = %error, "ignoring malformed server event");
                    continue;
                }
            };
            match event {
                ServerMessage::Output { stream, text, .. } => {
                    match stream {
                        OutputStream::Stdout => {
                            print!("{text}");
                            let _ = std::io::stdout().flush();
                        }
                        OutputStream::Stderr => {
                            eprint!("{text}");
                            let _ = std::io::stderr().flush();
                        }
                    }
                    output.push_str(&text);
                }
                ServerMessage::CommandExited {
                    exit_code: code, ..
                } => {
                    if code == 0 {
                        println!("[exit code 0]");
                    } else {
                        println!("[exit code {code} - failed]");
                    }
                    exit_code = code;
                }
                ServerMessage::CommandError { message, .. } => {
                    eprintln!("command failed: {message}");
                    spawn_failure = Some(message);
                }
                ServerMessage::SubmissionComplete { .. } => break,
            }
        }

        if let Some(message) = spawn_failure {
            return Err(ChannelError::Command { message });
        }
        Ok(CommandOutcome { output, exit_code })
    }
}
