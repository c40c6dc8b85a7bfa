//! Metric name and label definitions.
//!
//! All metric names used by courier live here so the set of exported series
//! can be read in one place.

/// Reply lifecycle metrics
pub mod reply {
    /// Replies created for inbound calls
    pub const STARTED_TOTAL: &str = "courier_replies_started_total";
    /// Sends ignored because the reply was already sent
    pub const DUPLICATE_SENDS_TOTAL: &str = "courier_reply_duplicate_sends_total";
    /// Payload sends rejected because the reply already carries an error
    pub const REJECTED_SENDS_TOTAL: &str = "courier_reply_rejected_sends_total";
    /// Responses accepted by the transport
    pub const DELIVERED_TOTAL: &str = "courier_replies_delivered_total";
    /// Responses the transport refused
    pub const DELIVERY_FAILURES_TOTAL: &str = "courier_reply_delivery_failures_total";
    /// Replies for calls without a reply destination
    pub const FIRE_AND_FORGET_TOTAL: &str = "courier_replies_fire_and_forget_total";
}

/// Extension runner metrics
pub mod extensions {
    /// Handler invocations (labels: point)
    pub const INVOCATIONS_TOTAL: &str = "courier_extension_invocations_total";
    /// Handler failures (labels: point)
    pub const FAILURES_TOTAL: &str = "courier_extension_failures_total";
    /// Handler duration in seconds (labels: point)
    pub const DURATION_SECONDS: &str = "courier_extension_duration_seconds";
}

/// Message encoding metrics
pub mod encoding {
    /// Envelopes the configured encoder rejected
    pub const FAILURES_TOTAL: &str = "courier_encoding_failures_total";
    /// Size of encoded responses in bytes
    pub const MESSAGE_BYTES: &str = "courier_encoded_message_bytes";
}

/// Common label keys used across metrics
pub mod labels {
    pub const POINT: &str = "point";
}
