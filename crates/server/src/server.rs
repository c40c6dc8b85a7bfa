//! The reply server: frozen extension chains, encoder, transport, and events.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    courier_common::{CallContext, ExtensionRegistry, HookHandler, HookPoint},
    courier_config::{CourierConfig, Severity},
    courier_protocol::Hop,
    tokio::sync::broadcast,
    tracing::{info, warn},
};

use crate::{
    error::{Error, Result},
    events::{EventBus, ServerEvent},
    message::{Encoder, JsonEncoder, MessageBuilder},
    reply::Reply,
    transport::Transport,
};

/// Collects extensions and collaborators before the server starts.
///
/// Extensions can only be registered here. Once [`CourierBuilder::build`]
/// returns, the chains are fixed for the life of the server.
pub struct CourierBuilder {
    config: CourierConfig,
    registry: ExtensionRegistry,
    encoder: Option<Arc<dyn Encoder>>,
    transport: Option<Arc<dyn Transport>>,
}

impl CourierBuilder {
    pub fn new(config: CourierConfig) -> Self {
        Self {
            config,
            registry: ExtensionRegistry::new(),
            encoder: None,
            transport: None,
        }
    }

    #[must_use]
    pub fn extension(mut self, handler: Arc<dyn HookHandler>) -> Self {
        self.registry.register(handler);
        self
    }

    /// Override the default [`JsonEncoder`].
    #[must_use]
    pub fn encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Courier> {
        let transport = self.transport.ok_or(Error::MissingTransport)?;

        let report = courier_config::validate(&self.config);
        for diagnostic in &report.diagnostics {
            warn!(%diagnostic, "configuration diagnostic");
        }
        if report.has_errors() {
            let errors: Vec<String> = report
                .diagnostics
                .iter()
                .filter(|d| d.severity == Severity::Error)
                .map(ToString::to_string)
                .collect();
            return Err(Error::InvalidConfig(errors.join("; ")));
        }

        let encoder: Arc<dyn Encoder> = match self.encoder {
            Some(encoder) => encoder,
            None => Arc::new(JsonEncoder::new(self.config.encoder.max_payload_bytes)),
        };
        let events = EventBus::new(self.config.events.capacity);

        info!(
            app = %self.config.name,
            on_error = self.registry.handler_names(HookPoint::OnError).len(),
            on_send = self.registry.handler_names(HookPoint::OnSend).len(),
            on_response = self.registry.handler_names(HookPoint::OnResponse).len(),
            "courier ready"
        );

        Ok(Courier {
            inner: Arc::new(CourierInner {
                config: self.config,
                registry: self.registry,
                encoder,
                transport,
                events,
            }),
        })
    }
}

struct CourierInner {
    config: CourierConfig,
    registry: ExtensionRegistry,
    encoder: Arc<dyn Encoder>,
    transport: Arc<dyn Transport>,
    events: EventBus,
}

/// Handle to a running reply server. Cheap to clone.
#[derive(Clone)]
pub struct Courier {
    inner: Arc<CourierInner>,
}

impl Courier {
    pub fn builder(config: CourierConfig) -> CourierBuilder {
        CourierBuilder::new(config)
    }

    /// Start the reply for one inbound call.
    pub fn reply(&self, call: CallContext) -> Reply {
        Reply::new(self.clone(), call)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &CourierConfig {
        &self.inner.config
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.inner.registry
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub(crate) fn message_builder(&self) -> MessageBuilder<'_> {
        MessageBuilder::new(
            self.inner.encoder.as_ref(),
            &self.inner.config.errors.prop_blacklist,
            &self.inner.events,
        )
    }

    /// Location metadata recorded on errors raised by this server.
    pub(crate) fn hop(&self, call: &CallContext) -> Hop {
        let trace = call.trace.as_ref();
        Hop {
            service: trace.and_then(|t| t.service.clone()),
            method: trace.and_then(|t| t.method.clone()),
            app: self.inner.config.name.clone(),
            ts: now_ms(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::transport::MemoryTransport, courier_protocol::TraceInfo};

    fn transport() -> Arc<dyn Transport> {
        let (transport, _rx) = MemoryTransport::channel();
        Arc::new(transport)
    }

    #[test]
    fn build_requires_transport() {
        let err = Courier::builder(CourierConfig::default())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::MissingTransport));
    }

    #[test]
    fn build_rejects_invalid_config() {
        let mut config = CourierConfig::default();
        config.name = String::new();
        let err = Courier::builder(config)
            .transport(transport())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn hop_uses_trace_and_app_name() {
        let mut config = CourierConfig::default();
        config.name = "billing".into();
        let courier = Courier::builder(config)
            .transport(transport())
            .build()
            .unwrap();

        let trace = TraceInfo {
            service: Some("invoices".into()),
            method: Some("create".into()),
            ..TraceInfo::default()
        };
        let hop = courier.hop(&CallContext::new().with_trace(trace));
        assert_eq!(hop.app, "billing");
        assert_eq!(hop.service.as_deref(), Some("invoices"));
        assert_eq!(hop.method.as_deref(), Some("create"));
        assert!(hop.ts > 0);
    }
}
