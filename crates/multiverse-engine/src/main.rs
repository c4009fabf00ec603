//! Server binary for the Game-of-Life multiverse.
//!
//! This is the main entry point that wires together the multiverse, the
//! HTTP control API, the `WebSocket` update stream, and the tick driver.
//! It runs until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `multiverse-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Create the empty multiverse and the broadcast hub
//! 4. Bind and start the HTTP server
//! 5. Run the tick driver until shutdown
//! 6. Close every stream connection and wait for the server to stop

mod error;
mod hub_callback;

use std::path::Path;
use std::sync::Arc;

use multiverse_core::{Multiverse, MultiverseConfig, TickDriver};
use multiverse_observer::server::ServerConfig;
use multiverse_observer::{AppState, Hub, spawn_observer};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::hub_callback::HubCallback;

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "multiverse-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the server cannot bind.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let config = MultiverseConfig::load_or_default(Path::new(CONFIG_PATH))?;
    config.validate()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level)),
        )
        .with_target(true)
        .with_file(config.log.set_report_caller)
        .with_line_number(config.log.set_report_caller)
        .init();

    info!("multiverse-engine starting");
    info!(
        host = %config.server.host,
        port = config.server.port,
        fps = config.game.fps,
        capacity = config.game.capacity,
        universe_prepend = config.game.universe_prepend,
        remove_static_universe_after = config.game.remove_static_universe_after,
        ws_queue_capacity = config.server.ws_queue_capacity,
        read_timeout_s = config.server.read_timeout,
        write_timeout_s = config.server.write_timeout,
        ws_handshake_timeout_s = config.server.ws_handshake_timeout,
        "Configuration loaded"
    );

    // 3. Create the multiverse and hub.
    let multiverse = Multiverse::new(config.game.capacity).into_shared();
    let hub = Arc::new(Hub::new());
    let app_state = Arc::new(AppState::from_config(
        Arc::clone(&multiverse),
        Arc::clone(&hub),
        &config,
    ));

    // 4. Start the HTTP server.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (server, addr) = spawn_observer(
        &ServerConfig::from(&config.server),
        app_state,
        wait_for_shutdown(shutdown_rx),
    )
    .await?;
    info!(%addr, "HTTP server started");

    // 5. Run the tick driver.
    let driver = TickDriver::new(multiverse, &config.game)?;
    let ctrl_c = async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => error!(error = %e, "Cannot listen for Ctrl-C, shutting down"),
        }
        if shutdown_tx.send(true).is_err() {
            debug!("HTTP server already stopped");
        }
    };
    let summary = driver.run(Arc::new(HubCallback::new(Arc::clone(&hub))), ctrl_c).await;

    // 6. Drain.
    let closed = hub.close_all();
    if let Err(e) = server.await {
        warn!(error = %e, "HTTP server task failed");
    }

    info!(
        ticks_started = summary.ticks_started,
        ticks_skipped = summary.ticks_skipped,
        connections_closed = closed,
        "multiverse-engine shutdown complete"
    );

    Ok(())
}

/// Resolve once `true` is published on the shutdown channel or its sender
/// is dropped.
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        debug!("Shutdown sender dropped");
    }
}
