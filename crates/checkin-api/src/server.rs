//! Operator HTTP server lifecycle.
//!
//! [`start_server`] binds the listener and serves until the supplied
//! shutdown future resolves, then drains in-flight requests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use checkin_core::{Clock, EventStateStore};
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Configuration for the operator server.
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
            port: 8080,
        }
    }
}

impl From<&checkin_core::config::ServerConfig> for ServerConfig {
    fn from(config: &checkin_core::config::ServerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }
}

/// Bind and serve the operator API until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`ServeError::Bind`] if the address is invalid or cannot be
/// bound, or [`ServeError::Serve`] on a fatal I/O error while serving.
pub async fn start_server<S, C>(
    config: &ServerConfig,
    state: Arc<AppState<S, C>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServeError>
where
    S: EventStateStore + 'static,
    C: Clock + 'static,
{
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| ServeError::Bind(format!("invalid address: {e}")))?;

    let router = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServeError::Bind(format!("bind failed on {addr}: {e}")))?;

    info!(%addr, "Operator API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServeError::Serve(format!("serve error: {e}")))?;

    info!("Operator API stopped");
    Ok(())
}

/// Errors that can occur when starting or running the operator server.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}
