//! Delivery of encoded responses to the message bus.
//!
//! The transport moves opaque bytes to a reply destination. It knows nothing
//! about envelopes or hooks.

use {
    async_trait::async_trait,
    bytes::Bytes,
    courier_protocol::ResponseEnvelope,
    tokio::sync::mpsc,
    tracing::debug,
};

use crate::error::{Error, Result};

/// Publishes encoded responses.
///
/// This trait is object-safe (`Arc<dyn Transport>`).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Publish `message` to `reply_to`.
    ///
    /// Resolves once the transport has accepted the message; an error means
    /// the response did not leave the process.
    async fn send(&self, reply_to: &str, message: Bytes) -> Result<()>;
}

/// A message handed to a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct Delivery {
    pub reply_to: String,
    pub message: Bytes,
}

impl Delivery {
    /// Decode the delivered bytes as a JSON envelope.
    pub fn envelope(&self) -> serde_json::Result<ResponseEnvelope> {
        serde_json::from_slice(&self.message)
    }
}

/// In-process transport that forwards every delivery to a channel.
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl MemoryTransport {
    /// Create a transport and the receiving end of its deliveries.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, reply_to: &str, message: Bytes) -> Result<()> {
        debug!(reply_to, bytes = message.len(), "memory transport delivery");
        self.tx
            .send(Delivery {
                reply_to: reply_to.to_string(),
                message,
            })
            .map_err(|_| Error::message("memory transport receiver dropped"))
    }
}
