//! Extension hooks run at fixed points of the reply lifecycle.
//!
//! Handlers are registered on an [`ExtensionRegistry`] while the framework is
//! being assembled. Once calls are dispatched the registry is only read, so
//! lookups need no locking.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use courier_metrics::{counter, extensions as extension_metrics, histogram, labels};

use crate::{
    error::RpcError,
    types::{CallContext, Response},
};

// ── HookPoint ───────────────────────────────────────────────────────────────

/// Lifecycle points of a reply that extensions can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookPoint {
    /// A handler replied with an error.
    OnError,
    /// A response is about to be encoded and delivered.
    OnSend,
    /// The transport accepted the response.
    OnResponse,
}

impl HookPoint {
    pub const ALL: &'static [HookPoint] = &[Self::OnError, Self::OnSend, Self::OnResponse];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnError => "onError",
            Self::OnSend => "onSend",
            Self::OnResponse => "onResponse",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── HookHandler trait ───────────────────────────────────────────────────────

/// An extension invoked at one or more [`HookPoint`]s.
///
/// Handlers may await before returning; the next handler does not start
/// until this one has finished. Returning an error stops the chain.
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// A human-readable name for this handler.
    fn name(&self) -> &str;

    /// Which lifecycle points this handler subscribes to.
    fn points(&self) -> &[HookPoint];

    async fn handle(
        &self,
        point: HookPoint,
        call: &CallContext,
        response: &mut Response,
    ) -> Result<()>;
}

// ── HookStats ───────────────────────────────────────────────────────────────

/// Per-handler invocation statistics.
pub struct HookStats {
    pub call_count: AtomicU64,
    pub failure_count: AtomicU64,
    pub total_latency_us: AtomicU64,
}

impl HookStats {
    pub fn new() -> Self {
        Self {
            call_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
        }
    }

    pub fn record_success(&self, latency: Duration) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, latency: Duration) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn avg_latency(&self) -> Duration {
        let calls = self.call_count.load(Ordering::Relaxed);
        if calls == 0 {
            return Duration::ZERO;
        }
        let total = self.total_latency_us.load(Ordering::Relaxed);
        Duration::from_micros(total / calls)
    }
}

impl Default for HookStats {
    fn default() -> Self {
        Self::new()
    }
}

// ── Handler entry (with stats) ──────────────────────────────────────────────

struct HandlerEntry {
    handler: Arc<dyn HookHandler>,
    stats: Arc<HookStats>,
}

// ── ExtensionRegistry ───────────────────────────────────────────────────────

/// Ordered extension lists, one per [`HookPoint`].
///
/// Handlers run in registration order.
pub struct ExtensionRegistry {
    handlers: HashMap<HookPoint, Vec<HandlerEntry>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Append a handler to every point it subscribes to.
    pub fn register(&mut self, handler: Arc<dyn HookHandler>) {
        let stats = Arc::new(HookStats::new());
        for &point in handler.points() {
            self.handlers.entry(point).or_default().push(HandlerEntry {
                handler: Arc::clone(&handler),
                stats: Arc::clone(&stats),
            });
        }
        info!(
            handler = handler.name(),
            points = ?handler.points(),
            "extension registered"
        );
    }

    /// Returns true if any handlers are registered for the given point.
    pub fn has_handlers(&self, point: HookPoint) -> bool {
        self.handlers.get(&point).is_some_and(|v| !v.is_empty())
    }

    /// Handler names for a point, in execution order.
    pub fn handler_names(&self, point: HookPoint) -> Vec<String> {
        self.handlers
            .get(&point)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| e.handler.name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get stats for a named handler. Returns None if not found.
    pub fn handler_stats(&self, name: &str) -> Option<Arc<HookStats>> {
        self.handlers
            .values()
            .flatten()
            .find(|entry| entry.handler.name() == name)
            .map(|entry| Arc::clone(&entry.stats))
    }

    /// Run every handler registered for `point`, one after another.
    ///
    /// Stops at the first failure and returns it, normalized. An empty list
    /// completes immediately with `Ok`.
    pub async fn run(
        &self,
        point: HookPoint,
        call: &CallContext,
        response: &mut Response,
    ) -> std::result::Result<(), RpcError> {
        let handlers = match self.handlers.get(&point) {
            Some(h) if !h.is_empty() => h,
            _ => return Ok(()),
        };

        debug!(point = %point, count = handlers.len(), "running extensions");

        for entry in handlers {
            let start = Instant::now();
            let result = entry.handler.handle(point, call, response).await;
            let latency = start.elapsed();

            #[cfg(feature = "metrics")]
            {
                counter!(extension_metrics::INVOCATIONS_TOTAL, labels::POINT => point.as_str())
                    .increment(1);
                histogram!(extension_metrics::DURATION_SECONDS, labels::POINT => point.as_str())
                    .record(latency.as_secs_f64());
            }

            match result {
                Ok(()) => {
                    entry.stats.record_success(latency);
                },
                Err(e) => {
                    entry.stats.record_failure(latency);
                    #[cfg(feature = "metrics")]
                    counter!(extension_metrics::FAILURES_TOTAL, labels::POINT => point.as_str())
                        .increment(1);
                    let error = RpcError::from_anyhow(e);
                    warn!(
                        handler = entry.handler.name(),
                        point = %point,
                        error = %error,
                        "extension failed"
                    );
                    return Err(error);
                },
            }
        }

        Ok(())
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
