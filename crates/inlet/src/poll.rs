use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// Produces the future run on each poll tick.
pub type SilentFetch = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Repeating silent-refresh timer, independent of everything but the
/// injected fetch callback.
///
/// At most one fetch is in flight at a time: a tick that fires while the
/// previous fetch is still running is skipped, not queued. Re-arming
/// (`start` while running, or `set_interval`) never kills an in-flight
/// fetch, because fetches run on their own task.
pub struct PollScheduler {
    fetch: SilentFetch,
    interval: Mutex<Duration>,
    timer: Mutex<Option<JoinHandle<()>>>,
    in_flight: Arc<AtomicBool>,
}

impl PollScheduler {
    pub fn new(fetch: SilentFetch) -> Self {
        Self {
            fetch,
            interval: Mutex::new(Duration::from_millis(30_000)),
            timer: Mutex::new(None),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Arm the timer. Idempotent: an already-armed timer is torn down first,
    /// so there is never more than one live timer.
    pub fn start(&self, interval: Duration) {
        *self.interval.lock() = interval;
        self.arm(interval);
        debug!(target: "inlet::poll", interval_ms = interval.as_millis() as u64, "poll scheduler armed");
    }

    /// Disarm the timer. Idempotent; an in-flight fetch is left to finish.
    pub fn stop(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
            debug!(target: "inlet::poll", "poll scheduler disarmed");
        }
    }

    /// Change the period. Re-arms immediately when running; otherwise only
    /// records the interval for the next `start`.
    pub fn set_interval(&self, interval: Duration) {
        *self.interval.lock() = interval;
        if self.is_running() {
            self.arm(interval);
        }
    }

    pub fn interval(&self) -> Duration {
        *self.interval.lock()
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    fn arm(&self, interval: Duration) {
        let fetch = self.fetch.clone();
        let in_flight = self.in_flight.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick of a tokio interval completes immediately;
            // consume it so the first fetch lands one full period out.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if in_flight.swap(true, Ordering::SeqCst) {
                    trace!(target: "inlet::poll", "previous fetch still in flight, skipping tick");
                    continue;
                }
                let fetch = fetch.clone();
                let in_flight = in_flight.clone();
                tokio::spawn(async move {
                    fetch().await;
                    in_flight.store(false, Ordering::SeqCst);
                });
            }
        });

        let mut guard = self.timer.lock();
        if let Some(previous) = guard.replace(handle) {
            previous.abort();
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
    }
}
