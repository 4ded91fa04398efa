use std::time::Duration;

/// Exponential retry schedule: doubles from `base` up to `cap`, reset to
/// `base` whenever a connection is established.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            next: base.min(cap),
        }
    }

    /// Delay to wait before the upcoming retry; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.cap);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.base.min(self.cap);
    }
}
