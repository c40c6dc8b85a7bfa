//! Per-call state shared between the reply pipeline and its hooks.

use {
    courier_protocol::{RequestInfo, TraceInfo},
    serde_json::{Map, Value},
};

use crate::error::RpcError;

// ── CallContext ─────────────────────────────────────────────────────────────

/// Read-only description of the inbound call a reply answers.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub meta: Option<Map<String, Value>>,
    pub trace: Option<TraceInfo>,
    pub request: Option<RequestInfo>,
    /// Destination for the response. `None` for fire-and-forget calls.
    pub reply_to: Option<String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self
    }

    #[must_use]
    pub fn with_trace(mut self, trace: TraceInfo) -> Self {
        self.trace = Some(trace);
        self
    }

    #[must_use]
    pub fn with_request(mut self, request: RequestInfo) -> Self {
        self.request = Some(request);
        self
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request.as_ref().map(|r| r.id.as_str())
    }
}

// ── Response ────────────────────────────────────────────────────────────────

/// The response being assembled for one call.
///
/// `payload` and `error` are mutually exclusive: setting one clears the other.
/// A cleared payload reads as `null`.
#[derive(Debug, Clone, Default)]
pub struct Response {
    payload: Value,
    error: Option<RpcError>,
    reply_to: Option<String>,
}

impl Response {
    pub fn new(reply_to: Option<String>) -> Self {
        Self {
            payload: Value::Null,
            error: None,
            reply_to,
        }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn error(&self) -> Option<&RpcError> {
        self.error.as_ref()
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn set_payload(&mut self, payload: Value) {
        self.error = None;
        self.payload = payload;
    }

    pub fn set_error(&mut self, error: RpcError) {
        self.payload = Value::Null;
        self.error = Some(error);
    }
}

// ── ReplyMessage ────────────────────────────────────────────────────────────

/// What a handler hands to a reply: a payload or an error.
#[derive(Debug, Clone)]
pub enum ReplyMessage {
    Payload(Value),
    Error(RpcError),
}

impl ReplyMessage {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl From<Value> for ReplyMessage {
    fn from(value: Value) -> Self {
        Self::Payload(value)
    }
}

impl From<RpcError> for ReplyMessage {
    fn from(error: RpcError) -> Self {
        Self::Error(error)
    }
}

impl From<Result<Value, RpcError>> for ReplyMessage {
    fn from(result: Result<Value, RpcError>) -> Self {
        match result {
            Ok(value) => Self::Payload(value),
            Err(error) => Self::Error(error),
        }
    }
}
