//! Semantic checks on a loaded configuration.

use std::{collections::HashSet, fmt};

use courier_protocol::{MIN_FALLBACK_BYTES, error_fields};

use crate::schema::CourierConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "errors.propBlacklist"
    pub path: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.severity, self.path, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Check a configuration for values the reply pipeline cannot work with.
pub fn validate(config: &CourierConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.name.trim().is_empty() {
        result.push(Severity::Error, "name", "application name must not be empty");
    }

    if config.encoder.max_payload_bytes < MIN_FALLBACK_BYTES {
        result.push(
            Severity::Error,
            "encoder.max_payload_bytes",
            format!(
                "must be at least {MIN_FALLBACK_BYTES} bytes so fallback responses can be encoded"
            ),
        );
    }

    if config.events.capacity == 0 {
        result.push(Severity::Error, "events.capacity", "must be greater than zero");
    }

    let blacklist = &config.errors.prop_blacklist;
    if !blacklist.iter().any(|p| p == error_fields::STACK) {
        result.push(
            Severity::Warning,
            "errors.propBlacklist",
            "stack traces are not stripped and may leak to remote callers",
        );
    }

    let mut seen = HashSet::new();
    for field in blacklist {
        if !seen.insert(field.as_str()) {
            result.push(
                Severity::Warning,
                "errors.propBlacklist",
                format!("duplicate entry \"{field}\""),
            );
        }
        if field == error_fields::NAME || field == error_fields::MESSAGE {
            result.push(
                Severity::Warning,
                "errors.propBlacklist",
                format!("stripping \"{field}\" leaves callers unable to identify errors"),
            );
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_clean() {
        let result = validate(&CourierConfig::default());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn tiny_payload_limit_is_an_error() {
        let mut config = CourierConfig::default();
        config.encoder.max_payload_bytes = 16;
        let result = validate(&config);
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].path, "encoder.max_payload_bytes");
    }

    #[test]
    fn empty_blacklist_warns_about_stacks() {
        let mut config = CourierConfig::default();
        config.errors.prop_blacklist.clear();
        let result = validate(&config);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn duplicate_and_identity_fields_warn() {
        let mut config = CourierConfig::default();
        config.errors.prop_blacklist = vec!["stack".into(), "stack".into(), "message".into()];
        let result = validate(&config);
        assert_eq!(result.count(Severity::Warning), 2);
    }

    #[test]
    fn blank_name_is_an_error() {
        let mut config = CourierConfig::default();
        config.name = "  ".into();
        assert!(validate(&config).has_errors());
    }
}
