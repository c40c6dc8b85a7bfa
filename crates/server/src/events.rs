//! Lifecycle signals emitted while responses are produced.
//!
//! Events are fire-and-forget: emitting with no subscribers is not an error,
//! and a subscriber that falls behind loses the oldest events.

use {
    courier_common::RpcError,
    tokio::sync::broadcast,
    tracing::{debug, trace},
};

#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A response is entering the send pipeline.
    PreResponse { request_id: Option<String> },
    /// Something went wrong while producing or delivering a response.
    ResponseError {
        request_id: Option<String>,
        error: RpcError,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PreResponse { .. } => "serverPreResponse",
            Self::ResponseError { .. } => "serverResponseError",
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::PreResponse { request_id } | Self::ResponseError { request_id, .. } => {
                request_id.as_deref()
            },
        }
    }
}

/// Broadcast channel for [`ServerEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ServerEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => trace!(event = name, receivers, "event emitted"),
            Err(_) => debug!(event = name, "event emitted with no subscribers"),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit(ServerEvent::PreResponse {
            request_id: Some("r1".into()),
        });
        bus.emit(ServerEvent::ResponseError {
            request_id: Some("r1".into()),
            error: RpcError::internal("x"),
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.name(), "serverPreResponse");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.name(), "serverResponseError");
        assert_eq!(second.request_id(), Some("r1"));
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let bus = EventBus::new(0);
        bus.emit(ServerEvent::PreResponse { request_id: None });
    }
}
