use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::broadcast;

/// A single frame delivered on a push topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFrame {
    pub topic: String,
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("push bus has no live subscribers for this topic")]
    NoSubscribers,
    #[error("push bus transport error: {0}")]
    Transport(String),
}

pub type BusResult<T> = Result<T, BusError>;

/// Topic-keyed fan-out. Implemented in-memory here; a networked
/// implementation only needs to honor per-topic delivery order.
pub trait PushBus: Send + Sync {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<PushFrame>;
    fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()>;
}

/// In-memory bus for tests and single-process deployments.
#[derive(Debug)]
pub struct LocalBus {
    capacity: usize,
    topics: parking_lot::RwLock<HashMap<String, broadcast::Sender<PushFrame>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Capacity bounds how far a slow subscriber may lag before frames drop.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            topics: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<PushFrame> {
        let mut guard = self.topics.write();
        guard
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PushBus for LocalBus {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<PushFrame> {
        self.sender_for(topic).subscribe()
    }

    fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()> {
        let sender = self.sender_for(topic);
        sender
            .send(PushFrame {
                topic: topic.to_string(),
                payload,
            })
            .map(|_| ())
            .map_err(|_| BusError::NoSubscribers)
    }
}
