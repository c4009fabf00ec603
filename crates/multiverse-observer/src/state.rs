//! Shared application state for the multiverse server.
//!
//! [`AppState`] holds the multiverse shared with the tick driver, the hub
//! that fans tick payloads out to `WebSocket` clients, and the handful of
//! config values the handlers need.

use std::sync::Arc;
use std::time::Duration;

use multiverse_core::config::ServerSection;
use multiverse_core::{InsertMode, MultiverseConfig, SharedMultiverse};

use crate::hub::Hub;

/// Per-request and per-frame time limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// Time allowed to receive a request body.
    pub read: Duration,
    /// Time allowed to produce a response or push one `WebSocket` frame.
    pub write: Duration,
    /// Time allowed to answer a `WebSocket` upgrade.
    pub ws_handshake: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self::from(&ServerSection::default())
    }
}

impl From<&ServerSection> for HttpTimeouts {
    fn from(section: &ServerSection) -> Self {
        Self {
            read: Duration::from_secs(section.read_timeout),
            write: Duration::from_secs(section.write_timeout),
            ws_handshake: Duration::from_secs(section.ws_handshake_timeout),
        }
    }
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The multiverse, also driven by the tick loop.
    pub multiverse: SharedMultiverse,
    /// Registry of live update subscribers.
    pub hub: Arc<Hub>,
    /// Where `POST /api/universe` places new universes.
    pub insert_mode: InsertMode,
    /// Per-client update queue length.
    pub ws_queue_capacity: usize,
    /// Request and frame time limits.
    pub timeouts: HttpTimeouts,
}

impl AppState {
    /// Create state around an existing multiverse and hub with default
    /// time limits.
    pub fn new(
        multiverse: SharedMultiverse,
        hub: Arc<Hub>,
        insert_mode: InsertMode,
        ws_queue_capacity: usize,
    ) -> Self {
        Self {
            multiverse,
            hub,
            insert_mode,
            ws_queue_capacity,
            timeouts: HttpTimeouts::default(),
        }
    }

    /// Replace the time limits.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: HttpTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Create state using the `game` and `server` config sections.
    pub fn from_config(multiverse: SharedMultiverse, hub: Arc<Hub>, config: &MultiverseConfig) -> Self {
        Self::new(
            multiverse,
            hub,
            config.game.insert_mode(),
            config.server.ws_queue_capacity,
        )
        .with_timeouts(HttpTimeouts::from(&config.server))
    }
}
