use anyhow::Result;
use async_trait::async_trait;

pub mod local;
pub mod websocket;

/// A persistent server-to-client message stream.
///
/// `open` performs exactly one connection attempt; retry and backoff policy
/// live in the connection controller, not here.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn open(&self) -> Result<Box<dyn PushSocket>>;
}

/// One live connection. `recv` resolves to `None` once the stream closes or
/// fails; the socket is discarded afterwards and a fresh one is opened by
/// the controller.
#[async_trait]
pub trait PushSocket: Send {
    async fn recv(&mut self) -> Option<String>;
}
