//! Normalized error model for the response pipeline.
//!
//! Every failure that can end up in a response, whether the handler raised it,
//! a hook raised it, or the encoder did, is carried as an [`RpcError`]. Errors
//! wrap each other through [`RpcError::caused_by`], forming a singly linked
//! chain from the outermost error down to the root cause. The chain is built
//! by moving the inner error into its wrapper, so it can never contain a cycle.

use std::{
    backtrace::{Backtrace, BacktraceStatus},
    fmt,
};

use {
    courier_protocol::{ErrorObject, FALLBACK_MESSAGE_CHARS, Hop, error_fields, error_names},
    serde::{Deserialize, Serialize},
    serde_json::Value,
    thiserror::Error,
};

// ── ErrorKind ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Raised by handler or hook code.
    Application,
    /// Framework error, e.g. a protocol violation inside the reply pipeline.
    Internal,
    /// A message could not be serialized.
    Encoding,
}

impl ErrorKind {
    /// Wire name used when an error of this kind has no explicit name.
    pub fn default_name(self) -> &'static str {
        match self {
            Self::Application => error_names::ERROR,
            Self::Internal => error_names::INTERNAL,
            Self::Encoding => error_names::ENCODING,
        }
    }

    /// Recover a kind from a wire name. Unknown names are application errors.
    pub fn from_name(name: &str) -> Self {
        match name {
            error_names::INTERNAL => Self::Internal,
            error_names::ENCODING => Self::Encoding,
            _ => Self::Application,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_name())
    }
}

// ── RpcError ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
#[error("{name}: {message}")]
pub struct RpcError {
    kind: ErrorKind,
    name: String,
    message: String,
    code: Option<String>,
    details: ErrorObject,
    hops: Vec<Hop>,
    stack: Option<String>,
    #[source]
    cause: Option<Box<RpcError>>,
}

impl RpcError {
    fn with_kind(kind: ErrorKind, message: String) -> Self {
        Self {
            kind,
            name: kind.default_name().to_string(),
            message,
            code: None,
            details: ErrorObject::new(),
            hops: Vec::new(),
            stack: capture_stack(),
            cause: None,
        }
    }

    /// An application error, the equivalent of a handler raising a plain error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Application, message.into())
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Internal, message.into())
    }

    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Encoding, message.into())
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach a structured detail. Reserved keys (`name`, `message`, ...) are
    /// shadowed by the error's own fields when serialized.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Wrap `inner` as the cause of this error, replacing any previous cause.
    #[must_use]
    pub fn caused_by(mut self, inner: impl Into<RpcError>) -> Self {
        self.cause = Some(Box::new(inner.into()));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn details(&self) -> &ErrorObject {
        &self.details
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    pub fn cause(&self) -> Option<&RpcError> {
        self.cause.as_deref()
    }

    /// Iterate the chain from this error down to the root cause.
    pub fn chain(&self) -> impl Iterator<Item = &RpcError> {
        std::iter::successors(Some(self), |e| e.cause())
    }

    /// The innermost error of the chain (`self` when there is no cause).
    pub fn root(&self) -> &RpcError {
        let mut current = self;
        while let Some(cause) = current.cause() {
            current = cause;
        }
        current
    }

    pub fn root_mut(&mut self) -> &mut RpcError {
        match self.cause {
            Some(ref mut cause) => cause.root_mut(),
            None => self,
        }
    }

    pub fn attach_hop(&mut self, hop: Hop) {
        self.hops.push(hop);
    }

    /// Convert to a plain object safe to put on the wire.
    ///
    /// Fields named in `blacklist` are removed at every level of the cause
    /// chain.
    pub fn to_object(&self, blacklist: &[String]) -> ErrorObject {
        let mut object: ErrorObject = self
            .details
            .iter()
            .filter(|(key, _)| !error_fields::ALL.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        object.insert(error_fields::NAME.into(), Value::String(self.name.clone()));
        object.insert(
            error_fields::MESSAGE.into(),
            Value::String(self.message.clone()),
        );
        if let Some(code) = &self.code {
            object.insert(error_fields::CODE.into(), Value::String(code.clone()));
        }
        if !self.hops.is_empty()
            && let Ok(hops) = serde_json::to_value(&self.hops)
        {
            object.insert(error_fields::HOPS.into(), hops);
        }
        if let Some(stack) = &self.stack {
            object.insert(error_fields::STACK.into(), Value::String(stack.clone()));
        }
        if let Some(cause) = &self.cause {
            object.insert(
                error_fields::CAUSE.into(),
                Value::Object(cause.to_object(blacklist)),
            );
        }

        strip_blacklisted(&mut object, blacklist);
        object
    }

    /// A minimal representation used when the full response could not be
    /// encoded: name and a bounded message, plus the same for the direct cause.
    /// Contains only strings, so it always encodes.
    pub fn to_fallback_object(&self, blacklist: &[String]) -> ErrorObject {
        let mut object = minimal_object(self);
        if let Some(cause) = &self.cause {
            let mut cause = minimal_object(cause);
            strip_blacklisted(&mut cause, blacklist);
            object.insert(error_fields::CAUSE.into(), Value::Object(cause));
        }
        strip_blacklisted(&mut object, blacklist);
        object
    }

    /// Rebuild an error from its wire representation.
    pub fn from_object(value: &Value) -> Self {
        let Value::Object(object) = value else {
            return Self {
                stack: None,
                ..Self::new(plain_message(value))
            };
        };

        let name = object
            .get(error_fields::NAME)
            .and_then(Value::as_str)
            .unwrap_or(error_names::ERROR);
        let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);

        Self {
            kind: ErrorKind::from_name(name),
            name: name.to_string(),
            message: text(error_fields::MESSAGE).unwrap_or_default(),
            code: text(error_fields::CODE),
            details: object
                .iter()
                .filter(|(key, _)| !error_fields::ALL.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            hops: object
                .get(error_fields::HOPS)
                .and_then(|hops| serde_json::from_value(hops.clone()).ok())
                .unwrap_or_default(),
            stack: text(error_fields::STACK),
            cause: object
                .get(error_fields::CAUSE)
                .filter(|cause| !cause.is_null())
                .map(|cause| Box::new(Self::from_object(cause))),
        }
    }

    /// Normalize an arbitrary failure.
    ///
    /// An [`RpcError`] inside the `anyhow` error is returned as is; otherwise
    /// the context chain is rebuilt as an application error chain.
    pub fn from_anyhow(error: anyhow::Error) -> Self {
        let error = match error.downcast::<RpcError>() {
            Ok(rpc) => return rpc,
            Err(error) => error,
        };

        let mut messages: Vec<String> = error.chain().map(ToString::to_string).collect();
        let mut current: Option<RpcError> = None;
        while let Some(message) = messages.pop() {
            let next = RpcError::new(message);
            current = Some(match current.take() {
                Some(inner) => next.caused_by(inner),
                None => next,
            });
        }
        current.unwrap_or_else(|| RpcError::new(error.to_string()))
    }
}

impl From<anyhow::Error> for RpcError {
    fn from(error: anyhow::Error) -> Self {
        Self::from_anyhow(error)
    }
}

fn capture_stack() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}

fn minimal_object(error: &RpcError) -> ErrorObject {
    let mut object = ErrorObject::new();
    object.insert(error_fields::NAME.into(), Value::String(error.name.clone()));
    object.insert(
        error_fields::MESSAGE.into(),
        Value::String(error.message.chars().take(FALLBACK_MESSAGE_CHARS).collect()),
    );
    object
}

fn strip_blacklisted(object: &mut ErrorObject, blacklist: &[String]) {
    object.retain(|key, _| !blacklist.iter().any(|denied| denied == key));
}

fn plain_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
