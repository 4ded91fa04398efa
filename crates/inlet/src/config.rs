use std::env;
use std::time::Duration;

use tracing::warn;

/// Tuning for the synchronization engine.
///
/// One instance per view, injected at construction; nothing here is global.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period of the silent-refresh scheduler.
    pub poll_interval: Duration,
    /// Reconnect attempts before the push channel gives up and polling takes
    /// over permanently.
    pub max_reconnect_attempts: u32,
    /// First retry delay; doubles on each failure.
    pub backoff_base: Duration,
    /// Retry delay ceiling.
    pub backoff_cap: Duration,
    /// Budget for a single push-channel connection attempt.
    pub connect_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(30_000),
            max_reconnect_attempts: 5,
            backoff_base: Duration::from_millis(1_000),
            backoff_cap: Duration::from_millis(30_000),
            connect_timeout: Duration::from_millis(10_000),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env_duration_ms("INLET_POLL_INTERVAL_MS", defaults.poll_interval),
            max_reconnect_attempts: env_u32(
                "INLET_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            backoff_base: env_duration_ms("INLET_BACKOFF_BASE_MS", defaults.backoff_base),
            backoff_cap: env_duration_ms("INLET_BACKOFF_CAP_MS", defaults.backoff_cap),
            connect_timeout: env_duration_ms("INLET_CONNECT_TIMEOUT_MS", defaults.connect_timeout),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

fn env_duration_ms(key: &str, default: Duration) -> Duration {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => Duration::from_millis(ms),
            _ => {
                warn!(target: "inlet::config", key, value = %raw, "ignoring invalid duration");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<u32>() {
            Ok(value) => value,
            Err(_) => {
                warn!(target: "inlet::config", key, value = %raw, "ignoring invalid integer");
                default
            }
        },
        Err(_) => default,
    }
}
