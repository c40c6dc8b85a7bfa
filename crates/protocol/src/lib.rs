//! Wire definitions for responses published back onto the message bus.
//!
//! Every response is a single JSON envelope:
//!
//! ```text
//! { "meta": {..}, "trace": {..}, "request": {..}, "result": <value|null>, "error": <object|null> }
//! ```
//!
//! `result` and `error` are never both non-null.

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const MAX_PAYLOAD_BYTES: usize = 524_288; // 512 KB
/// Smallest encoder limit that still leaves room for a fallback envelope.
pub const MIN_FALLBACK_BYTES: usize = 1_024;
/// Longest message kept on a fallback error.
pub const FALLBACK_MESSAGE_CHARS: usize = 256;
pub const DEFAULT_APP_NAME: &str = "courier";

/// Field names stripped from serialized errors unless configured otherwise.
pub const DEFAULT_PROP_BLACKLIST: &[&str] = &[error_fields::STACK];

/// Last-resort encoding of a fallback envelope. Always valid JSON.
pub const FALLBACK_MESSAGE: &[u8] = br#"{"meta":{},"trace":{},"request":null,"result":null,"error":{"name":"EncodingError","message":"Server payload encoding"}}"#;

// ── Error names ──────────────────────────────────────────────────────────────

pub mod error_names {
    pub const ERROR: &str = "Error";
    pub const INTERNAL: &str = "InternalError";
    pub const ENCODING: &str = "EncodingError";
}

/// Reserved keys of a serialized error object.
pub mod error_fields {
    pub const NAME: &str = "name";
    pub const MESSAGE: &str = "message";
    pub const CODE: &str = "code";
    pub const HOPS: &str = "hops";
    pub const STACK: &str = "stack";
    pub const CAUSE: &str = "cause";

    pub const ALL: &[&str] = &[NAME, MESSAGE, CODE, HOPS, STACK, CAUSE];
}

/// A serialized error as it travels on the wire.
pub type ErrorObject = serde_json::Map<String, serde_json::Value>;

// ── Call identity ────────────────────────────────────────────────────────────

/// Whether the caller expects an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    #[default]
    Request,
    Pubsub,
}

/// Identity of the inbound call a response answers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestInfo {
    pub id: String,
    #[serde(rename = "type", default)]
    pub request_type: RequestType,
}

impl RequestInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            request_type: RequestType::Request,
        }
    }
}

/// Distributed trace position of a call. Absent fields are omitted, so an
/// empty trace serializes as `{}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceInfo {
    #[serde(rename = "traceId", skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(rename = "spanId", skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(rename = "parentSpanId", skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// Where in the call chain an error was first observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub app: String,
    /// Milliseconds since the unix epoch.
    pub ts: u64,
}

// ── Envelope ─────────────────────────────────────────────────────────────────

/// Server → caller response message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub trace: TraceInfo,
    pub request: Option<RequestInfo>,
    pub result: serde_json::Value,
    pub error: Option<ErrorObject>,
}

impl ResponseEnvelope {
    /// Returns `true` if the envelope carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Replace the body with an error, forcing `result` to null.
    pub fn set_error(&mut self, error: ErrorObject) {
        self.result = serde_json::Value::Null;
        self.error = Some(error);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn empty_envelope_defaults_to_empty_mappings() {
        let envelope = ResponseEnvelope::default();
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({"meta": {}, "trace": {}, "request": null, "result": null, "error": null})
        );
    }

    #[test]
    fn trace_uses_camel_case_keys() {
        let trace = TraceInfo {
            trace_id: Some("t1".into()),
            parent_span_id: Some("p1".into()),
            method: Some("a:1".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&trace).unwrap();
        assert_eq!(
            value,
            json!({"traceId": "t1", "parentSpanId": "p1", "method": "a:1"})
        );
    }

    #[test]
    fn set_error_nulls_result() {
        let mut envelope = ResponseEnvelope {
            result: json!("ok"),
            ..Default::default()
        };
        let mut error = ErrorObject::new();
        error.insert(error_fields::MESSAGE.into(), json!("boom"));
        envelope.set_error(error);
        assert!(envelope.is_error());
        assert_eq!(envelope.result, serde_json::Value::Null);
    }

    #[test]
    fn request_type_defaults_to_request() {
        let info: RequestInfo = serde_json::from_value(json!({"id": "abc"})).unwrap();
        assert_eq!(info.request_type, RequestType::Request);
        let pubsub: RequestInfo =
            serde_json::from_value(json!({"id": "abc", "type": "pubsub"})).unwrap();
        assert_eq!(pubsub.request_type, RequestType::Pubsub);
    }

    #[test]
    fn fallback_message_is_valid_envelope() {
        let envelope: ResponseEnvelope = serde_json::from_slice(FALLBACK_MESSAGE).unwrap();
        assert_eq!(envelope.result, serde_json::Value::Null);
        let error = envelope.error.unwrap();
        assert_eq!(error[error_fields::NAME], json!(error_names::ENCODING));
        assert!(FALLBACK_MESSAGE.len() < MIN_FALLBACK_BYTES);
    }
}
