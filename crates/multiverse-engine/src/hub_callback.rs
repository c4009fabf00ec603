//! Tick callback that publishes each tick to the update stream.

use std::sync::Arc;

use multiverse_core::TickCallback;
use multiverse_observer::{Hub, Payload};
use tracing::debug;

/// Callback that bridges the tick driver to the broadcast hub.
pub struct HubCallback {
    hub: Arc<Hub>,
}

impl HubCallback {
    /// Create a callback publishing to `hub`.
    pub const fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

impl TickCallback for HubCallback {
    fn on_tick(&self, tick: u64, payload: Payload) {
        let report = self.hub.broadcast(&payload);
        debug!(
            tick,
            delivered = report.delivered,
            failed = report.failed,
            bytes = payload.len(),
            "Tick broadcast sent"
        );
    }
}
