//! WebSocket front end for the session shell engine.
//!
//! One connection is one session: on upgrade a session actor is spawned
//! with the configured working directory, inbound `submit` messages feed
//! its queue, and every event it emits is serialized back over the socket.
//! Disconnecting tears the session down; nothing survives a reconnect.
//!
//! The channel runs arbitrary commands as the server's own identity. Only
//! expose it to operators already authorized to do exactly that, or
//! restrict it with `allowed_programs` in the config.

mod config;
mod ws;

pub use config::ConfigError;
pub use config::ServerConfig;
pub use ws::router;

use tracing::info;

/// Bind and serve until the process is stopped.
pub async fn serve(config: ServerConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(addr = %listener.local_addr()?, "session shell server listening");
    axum::serve(listener, router(config)).await
}
