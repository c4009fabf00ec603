//! Broadcast hub: the registry of live subscriber sinks.
//!
//! The [`Hub`] fans one payload out to every registered [`Sink`]. Each sink
//! is delivered to independently: a failing sink is logged and skipped, and
//! the rest still receive the payload. The hub never evicts a sink on its
//! own; a sink leaves the registry only through
//! [`Hub::remove_connection`], which the sink's read loop calls when its
//! transport ends and which an external disconnect may call as well.
//!
//! The registry lock is held only to clone the current sink list, so a
//! broadcast never blocks registration or removal for the duration of the
//! sends.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};
use uuid::Uuid;

/// Serialized update shared by every subscriber of one tick.
pub type Payload = Arc<str>;

/// Unique identifier for a registered sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a new random connection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Errors a sink can report when handed a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The consuming side of the sink is gone.
    #[error("sink {0} is closed")]
    Closed(ConnectionId),
}

/// A subscriber endpoint the hub can push payloads to.
pub trait Sink: Send + Sync {
    /// Stable identifier used for registration and removal.
    fn id(&self) -> ConnectionId;

    /// Hand a payload to the sink without blocking.
    fn send(&self, payload: Payload) -> Result<(), SinkError>;

    /// Close the underlying transport.
    fn close(&self);
}

/// Delivery counts for one [`Hub::broadcast`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sinks that accepted the payload.
    pub delivered: usize,
    /// Sinks that reported an error.
    pub failed: usize,
}

/// Registry of live sinks with best-effort fan-out.
#[derive(Default)]
pub struct Hub {
    sinks: RwLock<HashMap<ConnectionId, Arc<dyn Sink>>>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink. A sink already registered under the same ID is replaced.
    pub fn add_connection(&self, sink: Arc<dyn Sink>) {
        let id = sink.id();
        let total = {
            let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
            sinks.insert(id, sink);
            sinks.len()
        };
        info!(%id, total, "Hub added connection");
    }

    /// Unregister a sink and close it.
    ///
    /// Returns `false` if no sink with this ID was registered, which is the
    /// normal outcome for the second of two racing removals.
    pub fn remove_connection(&self, id: ConnectionId) -> bool {
        let removed = self
            .sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        match removed {
            Some(sink) => {
                sink.close();
                info!(%id, total = self.len(), "Hub removed connection");
                true
            }
            None => {
                debug!(%id, "Hub removal of unknown connection ignored");
                false
            }
        }
    }

    /// Unregister and close every sink. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Arc<dyn Sink>> = self
            .sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, sink)| sink)
            .collect();

        for sink in &drained {
            sink.close();
        }
        info!(closed = drained.len(), "Hub closed all connections");
        drained.len()
    }

    /// Send `payload` to every registered sink.
    pub fn broadcast(&self, payload: &Payload) -> BroadcastReport {
        let sinks: Vec<Arc<dyn Sink>> = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut report = BroadcastReport::default();
        for sink in sinks {
            match sink.send(Arc::clone(payload)) {
                Ok(()) => report.delivered = report.delivered.saturating_add(1),
                Err(e) => {
                    warn!(id = %sink.id(), error = %e, "Broadcast to sink failed");
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }
        report
    }

    /// Number of registered sinks.
    pub fn len(&self) -> usize {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no sink is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("connections", &self.len())
            .finish()
    }
}

impl fmt::Display for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hub with {} active connections", self.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct Recording {
        id: ConnectionId,
        received: Mutex<Vec<String>>,
        closes: AtomicUsize,
        failing: bool,
    }

    impl Recording {
        fn failing() -> Self {
            Self {
                failing: true,
                ..Self::default()
            }
        }
    }

    impl Sink for Recording {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn send(&self, payload: Payload) -> Result<(), SinkError> {
            if self.failing {
                return Err(SinkError::Closed(self.id));
            }
            self.received.lock().unwrap().push(payload.to_string());
            Ok(())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn payload(text: &str) -> Payload {
        Arc::from(text)
    }

    #[test]
    fn broadcast_reaches_every_sink() {
        let hub = Hub::new();
        let a = Arc::new(Recording::default());
        let b = Arc::new(Recording::default());
        hub.add_connection(a.clone());
        hub.add_connection(b.clone());

        let report = hub.broadcast(&payload("[]"));
        assert_eq!(report, BroadcastReport { delivered: 2, failed: 0 });
        assert_eq!(*a.received.lock().unwrap(), ["[]"]);
        assert_eq!(*b.received.lock().unwrap(), ["[]"]);
    }

    #[test]
    fn failing_sink_does_not_block_others_and_is_kept() {
        let hub = Hub::new();
        let bad = Arc::new(Recording::failing());
        let good = Arc::new(Recording::default());
        hub.add_connection(bad.clone());
        hub.add_connection(good.clone());

        let report = hub.broadcast(&payload("x"));
        assert_eq!(report, BroadcastReport { delivered: 1, failed: 1 });
        assert_eq!(good.received.lock().unwrap().len(), 1);
        assert_eq!(hub.len(), 2);

        // Still registered, so the next broadcast tries it again.
        let again = hub.broadcast(&payload("y"));
        assert_eq!(again, BroadcastReport { delivered: 1, failed: 1 });
    }

    #[test]
    fn remove_closes_once_and_reports_presence() {
        let hub = Hub::new();
        let sink = Arc::new(Recording::default());
        hub.add_connection(sink.clone());

        assert!(hub.remove_connection(sink.id()));
        assert!(!hub.remove_connection(sink.id()));
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
        assert!(hub.is_empty());

        hub.broadcast(&payload("after"));
        assert!(sink.received.lock().unwrap().is_empty());
    }

    #[test]
    fn removing_unknown_connection_is_not_an_error() {
        let hub = Hub::new();
        assert!(!hub.remove_connection(ConnectionId::new()));
    }

    #[test]
    fn concurrent_removals_take_effect_once() {
        let hub = Arc::new(Hub::new());
        let sink = Arc::new(Recording::default());
        hub.add_connection(sink.clone());
        let id = sink.id();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let hub = Arc::clone(&hub);
                std::thread::spawn(move || hub.remove_connection(id))
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&removed| removed)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_all_empties_the_registry() {
        let hub = Hub::new();
        let sinks: Vec<_> = (0..3).map(|_| Arc::new(Recording::default())).collect();
        for sink in &sinks {
            hub.add_connection(sink.clone());
        }

        assert_eq!(hub.close_all(), 3);
        assert!(hub.is_empty());
        assert!(sinks.iter().all(|s| s.closes.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn broadcast_with_no_sinks_is_empty() {
        let hub = Hub::new();
        assert_eq!(hub.broadcast(&payload("x")), BroadcastReport::default());
        assert_eq!(hub.to_string(), "Hub with 0 active connections");
    }
}
