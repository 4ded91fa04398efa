use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use push_bus::{PushBus, PushFrame};
use tokio::sync::broadcast;
use tracing::warn;

use super::{PushChannel, PushSocket};

/// Loopback channel over the in-process push bus, for tests and
/// single-process deployments where the event producer lives in the same
/// binary.
pub struct LocalChannel {
    bus: Arc<dyn PushBus>,
    topic: String,
}

impl LocalChannel {
    pub fn new(bus: Arc<dyn PushBus>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl PushChannel for LocalChannel {
    async fn open(&self) -> Result<Box<dyn PushSocket>> {
        Ok(Box::new(LocalPushSocket {
            receiver: self.bus.subscribe(&self.topic),
        }))
    }
}

struct LocalPushSocket {
    receiver: broadcast::Receiver<PushFrame>,
}

#[async_trait]
impl PushSocket for LocalPushSocket {
    async fn recv(&mut self) -> Option<String> {
        loop {
            match self.receiver.recv().await {
                Ok(frame) => match String::from_utf8(frame.payload.to_vec()) {
                    Ok(text) => return Some(text),
                    Err(_) => {
                        warn!(target: "inlet::channel", topic = %frame.topic, "dropping non-utf8 frame");
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target: "inlet::channel", skipped, "loopback subscriber lagged, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
