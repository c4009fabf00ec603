//! Tick driver: evolve, serialize, and publish on a fixed schedule.
//!
//! [`TickDriver::run`] fires once per tick period. Each firing:
//!
//! 1. acquires the multiverse lock as an owned guard,
//! 2. moves it onto the blocking pool where [`Multiverse::evolve`] fans the
//!    universes out over rayon and evicts stale ones,
//! 3. serializes the resulting state while still holding the lock,
//! 4. hands the payload to the [`TickCallback`] after releasing the lock.
//!
//! A [`TickGuard`] makes the driver non-reentrant: when a firing arrives
//! while the previous tick is still running, that firing is skipped rather
//! than queued, so the engine always evolves from the latest completed state.
//!
//! [`Multiverse::evolve`]: crate::multiverse::Multiverse::evolve

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Level, debug, enabled, info, trace, warn};

use crate::config::GameConfig;
use crate::multiverse::{EvolveReport, SharedMultiverse};

/// Errors that can occur when building or running the tick driver.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The configured rate does not give a usable tick period.
    #[error("invalid tick rate: {fps} fps")]
    InvalidFps {
        /// The configured ticks per second.
        fps: u32,
    },

    /// The tick period is zero.
    #[error("tick period must be non-zero (got {period:?})")]
    InvalidPeriod {
        /// The rejected period.
        period: Duration,
    },

    /// The blocking evolve task panicked or was cancelled.
    #[error("evolve task failed: {source}")]
    Join {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },
}

/// Receives the serialized multiverse after every completed tick.
///
/// Implementations must not block for long: the reentrancy guard is held
/// until `on_tick` returns.
pub trait TickCallback: Send + Sync {
    /// Called with the tick number and the JSON payload of that tick.
    fn on_tick(&self, tick: u64, payload: Arc<str>);
}

/// A no-op tick callback for testing.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&self, _tick: u64, _payload: Arc<str>) {}
}

/// Non-reentrancy guard shared by every firing of one driver.
#[derive(Debug, Clone, Default)]
pub struct TickGuard {
    busy: Arc<AtomicBool>,
}

impl TickGuard {
    /// Create an idle guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard. Returns `None` if a tick is already running.
    pub fn try_begin(&self) -> Option<TickPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_was_idle| TickPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    /// Whether a tick currently holds the guard.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof of holding the [`TickGuard`]; releases it on drop.
#[derive(Debug)]
pub struct TickPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for TickPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// What one completed tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Sequence number of this tick, starting at 1.
    pub tick: u64,
    /// Evolution and eviction counts.
    pub evolve: EvolveReport,
    /// Whether a payload was handed to the callback.
    pub published: bool,
}

/// Counters returned when [`TickDriver::run`] stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Firings that started a tick.
    pub ticks_started: u64,
    /// Firings dropped because the previous tick was still running.
    pub ticks_skipped: u64,
}

/// Periodic evolve-serialize-publish loop over a shared multiverse.
#[derive(Debug, Clone)]
pub struct TickDriver {
    multiverse: SharedMultiverse,
    period: Duration,
    stale_ttl: Duration,
    guard: TickGuard,
    ticks: Arc<AtomicU64>,
}

impl TickDriver {
    /// Build a driver from the `game` configuration section.
    pub fn new(multiverse: SharedMultiverse, game: &GameConfig) -> Result<Self, RunnerError> {
        let Some(period) = game.tick_period().filter(|p| !p.is_zero()) else {
            return Err(RunnerError::InvalidFps { fps: game.fps });
        };
        Self::with_timing(multiverse, period, game.stale_ttl())
    }

    /// Build a driver with an explicit period and stale TTL.
    pub fn with_timing(
        multiverse: SharedMultiverse,
        period: Duration,
        stale_ttl: Duration,
    ) -> Result<Self, RunnerError> {
        if period.is_zero() {
            return Err(RunnerError::InvalidPeriod { period });
        }
        Ok(Self {
            multiverse,
            period,
            stale_ttl,
            guard: TickGuard::new(),
            ticks: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Time between two firings.
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Run one tick now: evolve, serialize, then publish via `callback`.
    ///
    /// A serialization failure is logged and nothing is published; the
    /// evolved state is kept for the next tick.
    pub async fn tick_once(&self, callback: &dyn TickCallback) -> Result<TickReport, RunnerError> {
        let guard = Arc::clone(&self.multiverse).lock_owned().await;
        let stale_ttl = self.stale_ttl;

        let (evolve, payload) = tokio::task::spawn_blocking(move || {
            let mut multiverse = guard;
            let report = multiverse.evolve(stale_ttl);
            if enabled!(Level::TRACE) {
                trace!("{}\n{}", *multiverse, multiverse.render());
            }
            (report, multiverse.to_json())
        })
        .await?;

        let tick = self.ticks.fetch_add(1, Ordering::AcqRel).saturating_add(1);

        let published = match payload {
            Ok(json) => {
                callback.on_tick(tick, Arc::from(json));
                true
            }
            Err(e) => {
                warn!(tick, error = %e, "Failed to serialize multiverse, skipping broadcast");
                false
            }
        };

        Ok(TickReport {
            tick,
            evolve,
            published,
        })
    }

    /// Fire ticks every period until `shutdown` resolves.
    ///
    /// Each tick runs on its own task so the timer keeps firing while it
    /// works; firings that find the guard held are counted and dropped.
    /// On shutdown the last in-flight tick is awaited before returning.
    pub async fn run<F>(self, callback: Arc<dyn TickCallback>, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()> + Send,
    {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut summary = RunSummary::default();
        let mut in_flight: Option<JoinHandle<()>> = None;
        tokio::pin!(shutdown);

        info!(period_ms = self.period.as_millis(), stale_ttl_s = self.stale_ttl.as_secs(), "Tick driver starting");

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = interval.tick() => {
                    let Some(permit) = self.guard.try_begin() else {
                        summary.ticks_skipped = summary.ticks_skipped.saturating_add(1);
                        debug!("Previous tick still running, skipping");
                        continue;
                    };
                    summary.ticks_started = summary.ticks_started.saturating_add(1);

                    let driver = self.clone();
                    let callback = Arc::clone(&callback);
                    in_flight = Some(tokio::spawn(async move {
                        let _permit = permit;
                        match driver.tick_once(callback.as_ref()).await {
                            Ok(report) => debug!(?report, "Tick complete"),
                            Err(e) => warn!(error = %e, "Tick failed"),
                        }
                    }));
                }
            }
        }

        if let Some(handle) = in_flight
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Tick task failed during shutdown");
        }

        info!(
            ticks_started = summary.ticks_started,
            ticks_skipped = summary.ticks_skipped,
            "Tick driver stopped"
        );
        summary
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Mutex;

    use tokio::sync::{mpsc, oneshot};

    use super::*;
    use crate::grid::Grid;
    use crate::multiverse::Multiverse;
    use crate::universe::Universe;

    fn blinker() -> Universe {
        let mut grid = Grid::dead(5, 5).unwrap();
        for x in 1..=3 {
            grid.set(2, x, true);
        }
        Universe::new(grid, "#0F0")
    }

    #[derive(Default)]
    struct Collect {
        payloads: Mutex<Vec<(u64, String)>>,
    }

    impl TickCallback for Collect {
        fn on_tick(&self, tick: u64, payload: Arc<str>) {
            self.payloads.lock().unwrap().push((tick, payload.to_string()));
        }
    }

    struct Forward(mpsc::UnboundedSender<u64>);

    impl TickCallback for Forward {
        fn on_tick(&self, tick: u64, _payload: Arc<str>) {
            let _ = self.0.send(tick);
        }
    }

    struct Slow(Duration);

    impl TickCallback for Slow {
        fn on_tick(&self, _tick: u64, _payload: Arc<str>) {
            std::thread::sleep(self.0);
        }
    }

    #[test]
    fn guard_is_not_reentrant() {
        let guard = TickGuard::new();
        let permit = guard.try_begin().unwrap();
        assert!(guard.is_busy());
        assert!(guard.try_begin().is_none());
        drop(permit);
        assert!(!guard.is_busy());
        assert!(guard.try_begin().is_some());
    }

    #[test]
    fn zero_fps_is_rejected() {
        let game = GameConfig {
            fps: 0,
            ..GameConfig::default()
        };
        let err = TickDriver::new(Multiverse::default().into_shared(), &game).unwrap_err();
        assert!(matches!(err, RunnerError::InvalidFps { fps: 0 }));
    }

    #[test]
    fn high_fps_keeps_sub_millisecond_period() {
        let game = GameConfig {
            fps: 2000,
            ..GameConfig::default()
        };
        let driver = TickDriver::new(Multiverse::default().into_shared(), &game).unwrap();
        assert_eq!(driver.period(), Duration::from_micros(500));
    }

    #[test]
    fn zero_period_error_carries_the_period() {
        let err = TickDriver::with_timing(
            Multiverse::default().into_shared(),
            Duration::ZERO,
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(matches!(err, RunnerError::InvalidPeriod { period } if period.is_zero()));
        assert_eq!(err.to_string(), "tick period must be non-zero (got 0ns)");
    }

    #[test]
    fn period_follows_fps() {
        let game = GameConfig {
            fps: 20,
            ..GameConfig::default()
        };
        let driver = TickDriver::new(Multiverse::default().into_shared(), &game).unwrap();
        assert_eq!(driver.period(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn tick_once_evolves_and_publishes() {
        let mut mv = Multiverse::new(4);
        mv.append(blinker()).unwrap();
        mv.append(Universe::new(Grid::dead(3, 3).unwrap(), "#000")).unwrap();
        let shared = mv.into_shared();

        let driver =
            TickDriver::with_timing(Arc::clone(&shared), Duration::from_millis(10), Duration::ZERO)
                .unwrap();
        let collect = Collect::default();

        let report = driver.tick_once(&collect).await.unwrap();
        assert_eq!(report.tick, 1);
        assert!(report.published);
        assert_eq!(report.evolve.evolved, 2);
        assert_eq!(report.evolve.evicted, 1);

        let payloads = collect.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        let json: serde_json::Value = serde_json::from_str(&payloads[0].1).unwrap();
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["colour"], "#0F0");
        // Vertical phase of the blinker.
        assert_eq!(entries[0]["cells"][1][2], true);
        assert_eq!(entries[0]["cells"][2][1], false);

        assert_eq!(shared.lock().await.universes()[0].generation(), 1);
    }

    #[tokio::test]
    async fn run_publishes_until_shutdown() {
        let mut mv = Multiverse::new(4);
        mv.append(blinker()).unwrap();
        let shared = mv.into_shared();

        let driver =
            TickDriver::with_timing(Arc::clone(&shared), Duration::from_millis(5), Duration::from_secs(60))
                .unwrap();
        let (tick_tx, mut tick_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(driver.run(Arc::new(Forward(tick_tx)), async move {
            let _ = stop_rx.await;
        }));

        let mut seen = Vec::new();
        while seen.len() < 3 {
            seen.push(tick_rx.recv().await.unwrap());
        }
        stop_tx.send(()).unwrap();
        let summary = handle.await.unwrap();

        assert_eq!(seen, [1, 2, 3]);
        assert!(summary.ticks_started >= 3);
        assert!(shared.lock().await.universes()[0].generation() >= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_ticks_are_skipped_not_queued() {
        let mut mv = Multiverse::new(4);
        mv.append(blinker()).unwrap();
        let shared = mv.into_shared();

        let driver =
            TickDriver::with_timing(Arc::clone(&shared), Duration::from_millis(5), Duration::from_secs(60))
                .unwrap();

        let summary = driver
            .run(
                Arc::new(Slow(Duration::from_millis(40))),
                tokio::time::sleep(Duration::from_millis(200)),
            )
            .await;

        assert!(summary.ticks_skipped > 0);
        let generation = shared.lock().await.universes()[0].generation();
        assert_eq!(generation, summary.ticks_started);
    }

    #[tokio::test]
    async fn blocked_lock_delays_the_tick() {
        let shared = Multiverse::new(4).into_shared();
        let driver =
            TickDriver::with_timing(Arc::clone(&shared), Duration::from_millis(5), Duration::ZERO)
                .unwrap();

        let held = shared.lock().await;
        let pending = tokio::spawn({
            let driver = driver.clone();
            async move { driver.tick_once(&NoOpCallback).await.unwrap() }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());
        drop(held);

        let report = pending.await.unwrap();
        assert_eq!(report.evolve.evolved, 0);
    }
}
