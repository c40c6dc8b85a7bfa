//! Configuration schema types.

use {
    courier_protocol::{DEFAULT_APP_NAME, DEFAULT_PROP_BLACKLIST, MAX_PAYLOAD_BYTES},
    serde::{Deserialize, Serialize},
};

/// Root configuration consumed by the reply pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// Application name, recorded as `app` in error hop metadata.
    pub name: String,
    pub errors: ErrorsConfig,
    pub encoder: EncoderConfig,
    pub events: EventsConfig,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_APP_NAME.into(),
            errors: ErrorsConfig::default(),
            encoder: EncoderConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

/// How errors are serialized for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorsConfig {
    /// Fields removed from serialized errors before they leave the process.
    #[serde(rename = "propBlacklist", alias = "prop_blacklist")]
    pub prop_blacklist: Vec<String>,
}

impl Default for ErrorsConfig {
    fn default() -> Self {
        Self {
            prop_blacklist: DEFAULT_PROP_BLACKLIST
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Encoded responses larger than this are treated as encoding failures.
    pub max_payload_bytes: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: MAX_PAYLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Buffered lifecycle events per subscriber before old ones are dropped.
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_strip_stack() {
        let config = CourierConfig::default();
        assert_eq!(config.errors.prop_blacklist, vec!["stack".to_string()]);
        assert_eq!(config.encoder.max_payload_bytes, MAX_PAYLOAD_BYTES);
        assert_eq!(config.name, "courier");
    }

    #[test]
    fn prop_blacklist_accepts_both_spellings() {
        let camel: CourierConfig =
            toml::from_str("[errors]\npropBlacklist = [\"stack\", \"details\"]\n").unwrap();
        let snake: CourierConfig =
            toml::from_str("[errors]\nprop_blacklist = [\"stack\", \"details\"]\n").unwrap();
        assert_eq!(camel.errors, snake.errors);
        assert_eq!(camel.errors.prop_blacklist.len(), 2);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config: CourierConfig = toml::from_str("name = \"math\"\n[encoder]\n").unwrap();
        assert_eq!(config.name, "math");
        assert_eq!(config.errors, ErrorsConfig::default());
        assert_eq!(config.events.capacity, 64);
    }
}
