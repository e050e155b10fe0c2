//! HTTP server lifecycle.
//!
//! Provides [`start_server`] which binds to a TCP port and serves the
//! router until the process is terminated.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The host address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// The TCP port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// The parsed socket address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if host and port do not form a valid address.
    pub fn addr(&self) -> Result<SocketAddr, ServerError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                ServerError::Bind(format!("invalid address {}:{}: {e}", self.host, self.port))
            })
    }
}

/// Start the HTTP server.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind or the server
/// encounters a fatal I/O error.
pub async fn start_server(config: &ServerConfig, state: AppState) -> Result<(), ServerError> {
    let addr = config.addr()?;
    let router = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    info!(%addr, "callsys server listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))?;

    Ok(())
}

/// Errors that can occur when starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bad_host_is_a_bind_error() {
        let config = ServerConfig {
            host: "not a host".to_owned(),
            port: 3000,
        };
        assert!(matches!(config.addr(), Err(ServerError::Bind(_))));
        assert!(ServerConfig::default().addr().is_ok());
    }
}
