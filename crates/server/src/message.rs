//! Response envelope assembly and encoding.
//!
//! Building never fails: when the configured encoder rejects an envelope the
//! error is replaced by a minimal `EncodingError` and encoding is retried,
//! ending in a fixed byte string if nothing else works.

use {
    bytes::Bytes,
    courier_common::{RpcError, Response},
    courier_protocol::{FALLBACK_MESSAGE, MAX_PAYLOAD_BYTES, RequestInfo, ResponseEnvelope, TraceInfo},
    serde_json::{Map, Value},
    thiserror::Error,
    tracing::{error, warn},
};

#[cfg(feature = "metrics")]
use courier_metrics::{counter, encoding as encoding_metrics, histogram};

use crate::events::{EventBus, ServerEvent};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("encoded message is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("{0}")]
    Message(String),
}

/// Turns an envelope into wire bytes.
///
/// When the encoder rejects both the response and its fallback envelope,
/// [`MessageBuilder::build`] sends `serde_json` bytes (or the static
/// `FALLBACK_MESSAGE`) without calling the encoder again. Encoders with a
/// non-JSON wire format must accept the fallback envelope, which holds only
/// short strings and nulls.
pub trait Encoder: Send + Sync {
    fn encode(&self, envelope: &ResponseEnvelope) -> Result<Bytes, EncodeError>;
}

impl<F> Encoder for F
where
    F: Fn(&ResponseEnvelope) -> Result<Bytes, EncodeError> + Send + Sync,
{
    fn encode(&self, envelope: &ResponseEnvelope) -> Result<Bytes, EncodeError> {
        self(envelope)
    }
}

/// JSON encoder with an upper bound on the encoded size.
#[derive(Debug, Clone, Copy)]
pub struct JsonEncoder {
    max_payload_bytes: usize,
}

impl JsonEncoder {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }
}

impl Default for JsonEncoder {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_BYTES)
    }
}

impl Encoder for JsonEncoder {
    fn encode(&self, envelope: &ResponseEnvelope) -> Result<Bytes, EncodeError> {
        let encoded = serde_json::to_vec(envelope)?;
        if encoded.len() > self.max_payload_bytes {
            return Err(EncodeError::PayloadTooLarge {
                size: encoded.len(),
                limit: self.max_payload_bytes,
            });
        }
        Ok(Bytes::from(encoded))
    }
}

/// Assembles and encodes the outbound message for one response.
pub struct MessageBuilder<'a> {
    encoder: &'a dyn Encoder,
    prop_blacklist: &'a [String],
    events: &'a EventBus,
}

impl<'a> MessageBuilder<'a> {
    pub fn new(encoder: &'a dyn Encoder, prop_blacklist: &'a [String], events: &'a EventBus) -> Self {
        Self {
            encoder,
            prop_blacklist,
            events,
        }
    }

    /// The envelope for `response`, before encoding.
    ///
    /// Missing meta and trace become empty objects. `result` is null whenever
    /// the response carries an error.
    pub fn envelope(
        &self,
        response: &Response,
        meta: Option<&Map<String, Value>>,
        trace: Option<&TraceInfo>,
        request: Option<&RequestInfo>,
    ) -> ResponseEnvelope {
        let mut envelope = ResponseEnvelope {
            meta: meta.cloned().unwrap_or_default(),
            trace: trace.cloned().unwrap_or_default(),
            request: request.cloned(),
            result: response.payload().clone(),
            error: None,
        };
        if let Some(err) = response.error() {
            envelope.set_error(err.to_object(self.prop_blacklist));
        }
        envelope
    }

    /// Encode `response` into a transport-ready message.
    pub fn build(
        &self,
        response: &Response,
        meta: Option<&Map<String, Value>>,
        trace: Option<&TraceInfo>,
        request: Option<&RequestInfo>,
    ) -> Bytes {
        let mut envelope = self.envelope(response, meta, trace, request);

        let message = match self.encoder.encode(&envelope) {
            Ok(message) => message,
            Err(source) => {
                #[cfg(feature = "metrics")]
                counter!(encoding_metrics::FAILURES_TOTAL).increment(1);

                let failure = RpcError::encoding("Server payload encoding")
                    .caused_by(RpcError::new(source.to_string()).with_name("EncodeError"));
                error!(
                    request_id = ?request.map(|r| r.id.as_str()),
                    error = %source,
                    "failed to encode response, sending encoding error instead"
                );
                self.events.emit(ServerEvent::ResponseError {
                    request_id: request.map(|r| r.id.clone()),
                    error: failure.clone(),
                });

                envelope.set_error(failure.to_fallback_object(self.prop_blacklist));
                self.encode_fallback(envelope)
            },
        };

        #[cfg(feature = "metrics")]
        histogram!(encoding_metrics::MESSAGE_BYTES).record(message.len() as f64);

        message
    }

    fn encode_fallback(&self, envelope: ResponseEnvelope) -> Bytes {
        match self.encoder.encode(&envelope) {
            Ok(message) => return message,
            Err(e) => warn!(error = %e, "encoder rejected the fallback envelope"),
        }

        // Drop caller-supplied meta and trace, which may be what broke the
        // encoder, and keep only the error.
        let minimal = ResponseEnvelope {
            request: envelope.request,
            error: envelope.error,
            ..ResponseEnvelope::default()
        };
        serde_json::to_vec(&minimal)
            .map(Bytes::from)
            .unwrap_or_else(|_| Bytes::from_static(FALLBACK_MESSAGE))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn blacklist() -> Vec<String> {
        vec!["stack".to_string()]
    }

    fn decode(bytes: &Bytes) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn payload_envelope_uses_empty_defaults() {
        let encoder = JsonEncoder::default();
        let events = EventBus::new(4);
        let blacklist = blacklist();
        let builder = MessageBuilder::new(&encoder, &blacklist, &events);

        let mut response = Response::new(Some("inbox".into()));
        response.set_payload(json!("ok"));
        let request = RequestInfo::new("r1");
        let message = decode(&builder.build(&response, None, None, Some(&request)));

        assert_eq!(message["result"], json!("ok"));
        assert_eq!(message["error"], Value::Null);
        assert_eq!(message["meta"], json!({}));
        assert_eq!(message["trace"], json!({}));
        assert_eq!(message["request"]["id"], json!("r1"));
    }

    #[test]
    fn error_envelope_strips_blacklisted_fields() {
        let encoder = JsonEncoder::default();
        let events = EventBus::new(4);
        let blacklist = blacklist();
        let builder = MessageBuilder::new(&encoder, &blacklist, &events);

        let mut response = Response::new(Some("inbox".into()));
        response.set_error(RpcError::new("boom").with_stack("at handler"));
        let message = decode(&builder.build(&response, None, None, None));

        assert_eq!(message["result"], Value::Null);
        assert_eq!(message["error"]["message"], json!("boom"));
        assert!(message["error"].get("stack").is_none());
    }

    #[tokio::test]
    async fn oversized_payload_falls_back_to_encoding_error() {
        let encoder = JsonEncoder::new(2_048);
        let events = EventBus::new(4);
        let mut rx = events.subscribe();
        let blacklist = blacklist();
        let builder = MessageBuilder::new(&encoder, &blacklist, &events);

        let mut response = Response::new(Some("inbox".into()));
        response.set_payload(json!("x".repeat(10_000)));
        let bytes = builder.build(&response, None, None, None);
        assert!(bytes.len() <= 2_048);

        let message = decode(&bytes);
        assert_eq!(message["result"], Value::Null);
        assert_eq!(message["error"]["name"], json!("EncodingError"));
        assert_eq!(message["error"]["message"], json!("Server payload encoding"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "serverResponseError");
    }

    #[test]
    fn failing_encoder_falls_back_to_builtin_json() {
        let encoder = |_: &ResponseEnvelope| -> Result<Bytes, EncodeError> {
            Err(EncodeError::Message("codec offline".into()))
        };
        let events = EventBus::new(4);
        let blacklist = blacklist();
        let builder = MessageBuilder::new(&encoder, &blacklist, &events);

        let mut meta = Map::new();
        meta.insert("tenant".into(), json!("acme"));
        let mut response = Response::new(Some("inbox".into()));
        response.set_payload(json!({"a": 1}));
        let message = decode(&builder.build(&response, Some(&meta), None, None));

        assert_eq!(message["result"], Value::Null);
        assert_eq!(message["meta"], json!({}));
        assert_eq!(message["error"]["name"], json!("EncodingError"));
        assert_eq!(message["error"]["cause"]["message"], json!("codec offline"));
    }

    #[test]
    fn encoder_rejecting_results_only_is_retried_once() {
        let encoder = |envelope: &ResponseEnvelope| -> Result<Bytes, EncodeError> {
            if envelope.result.is_null() {
                Ok(Bytes::from(serde_json::to_vec(envelope)?))
            } else {
                Err(EncodeError::Message("unsupported result".into()))
            }
        };
        let events = EventBus::new(4);
        let blacklist = blacklist();
        let builder = MessageBuilder::new(&encoder, &blacklist, &events);

        let mut meta = Map::new();
        meta.insert("tenant".into(), json!("acme"));
        let mut response = Response::new(Some("inbox".into()));
        response.set_payload(json!(1));
        let message = decode(&builder.build(&response, Some(&meta), None, None));

        // Meta survives when the primary encoder accepts the fallback.
        assert_eq!(message["meta"]["tenant"], json!("acme"));
        assert_eq!(message["error"]["name"], json!("EncodingError"));
    }
}
