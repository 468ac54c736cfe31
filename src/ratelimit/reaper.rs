//! Background eviction of stale rate limit entries.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::clock::{Clock, SystemClock};
use super::store::LimiterStore;

/// Default time between sweeps in milliseconds.
pub const DEFAULT_REAPER_INTERVAL_MS: u64 = 300_000;
/// Default idle time past a window's end before its entry is evicted.
pub const DEFAULT_EVICTION_GRACE_MS: u64 = 300_000;
/// Shortest sweep interval; shorter requests are raised to it.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a running sweep loop.
struct ReaperTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Periodically removes entries nobody will query again.
///
/// The sweep interval and the eviction grace period are independent of any
/// policy's window length.
pub struct Reaper {
    store: Arc<LimiterStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    grace: chrono::Duration,
    task: Mutex<Option<ReaperTask>>,
}

impl Reaper {
    /// Create a reaper using the system clock.
    pub fn new(store: Arc<LimiterStore>, interval: Duration, grace: Duration) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), interval, grace)
    }

    /// Create a reaper with an explicit time source.
    ///
    /// An `interval` below one millisecond, including zero, is raised to one
    /// millisecond.
    pub fn with_clock(
        store: Arc<LimiterStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        grace: Duration,
    ) -> Self {
        if interval < MIN_INTERVAL {
            warn!(?interval, "Reaper interval too short, using 1ms");
        }
        Self {
            store,
            clock,
            interval: interval.max(MIN_INTERVAL),
            grace: chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::MAX),
            task: Mutex::new(None),
        }
    }

    /// Run one sweep and return how many entries were evicted.
    pub fn tick(&self) -> usize {
        let now = self.clock.now();
        let grace = self.grace;

        self.store
            .entries()
            .into_iter()
            .filter(|(_, state)| state.is_evictable(now, grace))
            .filter(|(key, _)| {
                // Re-check under the key's lock: a request may have reopened
                // the window since the snapshot was taken.
                self.store
                    .remove_if(key, |current| current.is_evictable(now, grace))
            })
            .count()
    }

    /// Run one sweep, containing any panic so the loop keeps going.
    fn run_tick(&self) {
        match catch_unwind(AssertUnwindSafe(|| self.tick())) {
            Ok(evicted) => {
                debug!(
                    evicted = evicted,
                    remaining = self.store.len(),
                    "Reaper sweep complete"
                );
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(reason = %reason, "Reaper sweep failed, continuing");
            }
        }
    }

    /// Spawn the sweep loop on the current tokio runtime.
    ///
    /// Calling `start` on a running reaper does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            warn!("Reaper already running");
            return;
        }

        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let reaper = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reaper.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => reaper.run_tick(),
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        info!(
            interval_ms = self.interval.as_millis() as u64,
            grace_ms = self.grace.num_milliseconds(),
            "Reaper started"
        );
        *task = Some(ReaperTask { shutdown, handle });
    }

    /// Stop the sweep loop and wait for it to exit.
    pub async fn stop(&self) {
        let Some(task) = self.task.lock().take() else {
            return;
        };

        let _ = task.shutdown.send(());
        if let Err(e) = task.handle.await {
            error!(error = %e, "Reaper task ended abnormally");
        }
        info!("Reaper stopped");
    }

    /// Whether the sweep loop is running.
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }
}

impl std::fmt::Debug for Reaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaper")
            .field("interval", &self.interval)
            .field("grace", &self.grace)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::window::WindowState;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FIVE_MINUTES: Duration = Duration::from_secs(300);

    fn reaper_with_clock() -> (Arc<Reaper>, Arc<LimiterStore>, Arc<ManualClock>) {
        let store = Arc::new(LimiterStore::new());
        let clock = Arc::new(ManualClock::default());
        let reaper = Arc::new(Reaper::with_clock(
            store.clone(),
            clock.clone(),
            FIVE_MINUTES,
            FIVE_MINUTES,
        ));
        (reaper, store, clock)
    }

    fn ending_at(window_end: DateTime<Utc>) -> WindowState {
        WindowState {
            count: 1,
            window_end,
        }
    }

    #[test]
    fn test_tick_evicts_only_stale_entries() {
        let (reaper, store, clock) = reaper_with_clock();
        let now = clock.now();

        store.set("stale", ending_at(now - chrono::Duration::minutes(6)));
        store.set("in-grace", ending_at(now - chrono::Duration::minutes(4)));
        store.set("active", ending_at(now + chrono::Duration::seconds(30)));

        assert_eq!(reaper.tick(), 1);
        assert!(store.get("stale").is_none());
        assert!(store.get("in-grace").is_some());
        assert!(store.get("active").is_some());
    }

    #[test]
    fn test_grace_is_independent_of_window() {
        let store = Arc::new(LimiterStore::new());
        let clock = Arc::new(ManualClock::default());
        let reaper = Reaper::with_clock(
            store.clone(),
            clock.clone(),
            FIVE_MINUTES,
            Duration::from_secs(10),
        );

        store.set("a", ending_at(clock.now()));
        clock.advance(chrono::Duration::seconds(10));
        assert_eq!(reaper.tick(), 0);

        clock.advance(chrono::Duration::milliseconds(1));
        assert_eq!(reaper.tick(), 1);
        assert!(store.is_empty());
    }

    struct FlakyClock {
        inner: ManualClock,
        calls: AtomicUsize,
    }

    impl Clock for FlakyClock {
        fn now(&self) -> DateTime<Utc> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("clock unavailable");
            }
            self.inner.now()
        }
    }

    #[test]
    fn test_failed_sweep_does_not_poison_later_sweeps() {
        let store = Arc::new(LimiterStore::new());
        let clock = Arc::new(FlakyClock {
            inner: ManualClock::default(),
            calls: AtomicUsize::new(0),
        });
        store.set(
            "stale",
            ending_at(clock.inner.now() - chrono::Duration::hours(1)),
        );
        let reaper = Reaper::with_clock(store.clone(), clock, FIVE_MINUTES, FIVE_MINUTES);

        reaper.run_tick();
        assert_eq!(store.len(), 1);

        reaper.run_tick();
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_loop_sweeps_on_interval() {
        let (reaper, store, clock) = reaper_with_clock();
        store.set("stale", ending_at(clock.now() - chrono::Duration::minutes(10)));

        reaper.start();
        assert!(reaper.is_running());

        // Nothing happens before the first interval elapses
        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(store.len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert!(store.is_empty());

        reaper.stop().await;
        assert!(!reaper.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let store = Arc::new(LimiterStore::new());
        let clock = Arc::new(ManualClock::default());
        let reaper = Arc::new(Reaper::with_clock(
            store.clone(),
            clock.clone(),
            Duration::ZERO,
            FIVE_MINUTES,
        ));
        assert_eq!(reaper.interval, MIN_INTERVAL);
        store.set("stale", ending_at(clock.now() - chrono::Duration::minutes(10)));

        reaper.start();
        tokio::time::sleep(Duration::from_millis(5)).await;
        tokio::task::yield_now().await;
        assert!(store.is_empty());

        // The loop survived its ticks and still shuts down cleanly
        assert!(reaper.is_running());
        reaper.stop().await;
        assert!(!reaper.is_running());
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_without_start_is_noop() {
        let (reaper, _store, _clock) = reaper_with_clock();

        reaper.stop().await;
        reaper.start();
        reaper.start();
        assert!(reaper.is_running());

        reaper.stop().await;
        reaper.stop().await;
        assert!(!reaper.is_running());
    }
}
