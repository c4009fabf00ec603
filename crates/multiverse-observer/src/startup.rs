//! Server startup helper for embedding in the engine binary.
//!
//! Provides [`spawn_observer`] which binds the HTTP + `WebSocket` server and
//! launches it on a background Tokio task, so the API runs concurrently with
//! the tick loop.
//!
//! # Usage
//!
//! ```rust,ignore
//! use multiverse_observer::startup::spawn_observer;
//!
//! let (handle, addr) = spawn_observer(&config, state, shutdown).await?;
//! // The server is now accepting connections on `addr`.
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Bind the server and serve it on a background Tokio task.
///
/// The bind happens before this function returns, so an address that is
/// unusable is reported here rather than from inside the task. The server
/// stops accepting connections once `shutdown` resolves.
///
/// Returns the task handle and the bound address (useful with port `0`).
pub async fn spawn_observer<F>(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(JoinHandle<()>, SocketAddr), StartupError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (listener, addr) = crate::server::bind(config).await?;

    let handle = tokio::spawn(async move {
        if let Err(e) = crate::server::serve(listener, state, shutdown).await {
            tracing::error!(error = %e, "HTTP server exited with error");
        }
    });

    tracing::info!(%addr, "HTTP server spawned on background task");

    Ok((handle, addr))
}
