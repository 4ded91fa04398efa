use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::warn;
use url::Url;

use super::{PushChannel, PushSocket};

/// WebSocket implementation of the push channel.
pub struct WebSocketChannel {
    url: Url,
}

impl WebSocketChannel {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim()).context("invalid push channel url")?;
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl PushChannel for WebSocketChannel {
    async fn open(&self) -> Result<Box<dyn PushSocket>> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("websocket connect to {} failed", self.url))?;
        Ok(Box::new(WebSocketPushSocket { stream }))
    }
}

struct WebSocketPushSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushSocket for WebSocketPushSocket {
    async fn recv(&mut self) -> Option<String> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => return Some(text),
                    Err(_) => {
                        warn!(target: "inlet::channel", "dropping non-utf8 binary frame");
                    }
                },
                Ok(Message::Close(_)) | Err(_) => return None,
                // Ping/Pong keepalives and raw frames carry no events.
                _ => {}
            }
        }
        None
    }
}
