use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::PushChannel;
use crate::config::SyncConfig;

pub mod backoff;

use backoff::Backoff;

/// Connection lifecycle of the push channel. Exactly one value at any
/// instant; transitions are the only way to change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Everything the controller reports upward.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    /// Emitted on every entry to `Connected`.
    Connected { at: DateTime<Utc> },
    /// A raw push payload, routed onward by the update router.
    Message(String),
    /// Retries are exhausted; the caller should arm the poll scheduler as a
    /// permanent fallback. Not fatal.
    FallbackToPolling,
}

/// State machine around one push channel: connect, watch the stream, retry
/// with exponential backoff, and signal fallback once retries run out.
pub struct ConnectionController {
    channel: Arc<dyn PushChannel>,
    max_reconnect_attempts: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
    connect_timeout: Duration,
    state: Arc<RwLock<ConnectionState>>,
    events: broadcast::Sender<ConnectionEvent>,
    last_message_at: Arc<RwLock<Option<DateTime<Utc>>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionController {
    pub fn new(channel: Arc<dyn PushChannel>, config: &SyncConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            channel,
            max_reconnect_attempts: config.max_reconnect_attempts,
            backoff_base: config.backoff_base,
            backoff_cap: config.backoff_cap,
            connect_timeout: config.connect_timeout,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            events,
            last_message_at: Arc::new(RwLock::new(None)),
            task: Mutex::new(None),
        }
    }

    /// Start the connect loop. Idempotent while a loop is already live.
    pub fn connect(&self) {
        let mut guard = self.task.lock();
        if guard.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!(target: "inlet::connection", "connect() while already active, ignoring");
            return;
        }

        let channel = self.channel.clone();
        let state = self.state.clone();
        let events = self.events.clone();
        let last_message_at = self.last_message_at.clone();
        let max_attempts = self.max_reconnect_attempts;
        let connect_timeout = self.connect_timeout;
        let mut backoff = Backoff::new(self.backoff_base, self.backoff_cap);

        *guard = Some(tokio::spawn(async move {
            let mut failures: u32 = 0;
            set_state(&state, &events, ConnectionState::Connecting);
            loop {
                let opened = match tokio::time::timeout(connect_timeout, channel.open()).await {
                    Ok(Ok(socket)) => Some(socket),
                    Ok(Err(err)) => {
                        warn!(target: "inlet::connection", error = %err, "push channel open failed");
                        None
                    }
                    Err(_) => {
                        warn!(
                            target: "inlet::connection",
                            timeout_ms = connect_timeout.as_millis() as u64,
                            "push channel open timed out"
                        );
                        None
                    }
                };

                if let Some(mut socket) = opened {
                    failures = 0;
                    backoff.reset();
                    set_state(&state, &events, ConnectionState::Connected);
                    let _ = events.send(ConnectionEvent::Connected { at: Utc::now() });
                    info!(target: "inlet::connection", "push channel connected");

                    while let Some(raw) = socket.recv().await {
                        *last_message_at.write() = Some(Utc::now());
                        let _ = events.send(ConnectionEvent::Message(raw));
                    }
                    debug!(target: "inlet::connection", "push channel stream ended");
                }

                failures += 1;
                if failures > max_attempts {
                    set_state(&state, &events, ConnectionState::Disconnected);
                    warn!(
                        target: "inlet::connection",
                        attempts = max_attempts,
                        "push channel retries exhausted, signalling fallback to polling"
                    );
                    let _ = events.send(ConnectionEvent::FallbackToPolling);
                    return;
                }

                set_state(&state, &events, ConnectionState::Reconnecting);
                let delay = backoff.next_delay();
                debug!(
                    target: "inlet::connection",
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    "retrying push channel"
                );
                tokio::time::sleep(delay).await;
            }
        }));
    }

    /// Tear the connection down. Idempotent and safe in any state,
    /// including mid-connect.
    pub fn disconnect(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        set_state(&self.state, &self.events, ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        *self.last_message_at.read()
    }
}

impl Drop for ConnectionController {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

fn set_state(
    state: &RwLock<ConnectionState>,
    events: &broadcast::Sender<ConnectionEvent>,
    next: ConnectionState,
) {
    let mut guard = state.write();
    if *guard == next {
        return;
    }
    debug!(target: "inlet::connection", from = ?*guard, to = ?next, "connection state change");
    *guard = next;
    let _ = events.send(ConnectionEvent::StateChanged(next));
}
