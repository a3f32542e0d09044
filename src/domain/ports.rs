use crate::domain::errors::{BackendError, SinkError};
use crate::domain::events::{EventKind, LifecycleEvent};
use crate::domain::metric_point::{Destination, MetricPoint, Tags};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;

/// Callback invoked by a cache for one lifecycle event.
pub type EventHandler = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Opaque handle returned by [`CacheEvents::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// The lifecycle event surface of an observed cache.
pub trait CacheEvents: Send + Sync {
    fn cache_name(&self) -> &str;

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId;

    /// Returns false when the id was not subscribed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Current number of entries in the backing store, if the cache exposes it.
    fn item_count(&self) -> Option<u64>;
}

/// Narrow push-path port implemented once per concrete metrics backend.
pub trait MetricsBackend: Send + Sync {
    fn increment_counter(&self, name: &str, tags: &Tags) -> Result<(), BackendError>;

    fn set_gauge(&self, name: &str, tags: &Tags, value: u64) -> Result<(), BackendError>;
}

/// All counter payloads emitted by one source during one polling interval.
#[derive(Debug, Clone)]
pub struct FlushRound {
    pub source_name: String,
    pub payloads: Vec<Value>,
}

/// Process-wide diagnostic tracing facility, seen only through the operations
/// the bridge needs.
pub trait DiagnosticsRuntime: Send + Sync {
    /// Names of every source currently alive in the process.
    fn sources(&self) -> Vec<String>;

    /// Start delivering rounds of `source` into `tx`, collecting every counter
    /// it declares. A source already polled for another listener adds `tx`
    /// to its listeners and keeps its running interval. Enabling the same
    /// `tx` twice is a no-op. Returns false only when the source cannot be
    /// polled at all.
    fn enable(&self, source: &str, interval: Duration, tx: Sender<FlushRound>) -> bool;

    /// Stop delivering rounds of `source` into `tx`. Polling stops with the
    /// last listener.
    fn disable(&self, source: &str, tx: &Sender<FlushRound>) -> bool;
}

/// A destination for batches of metric points.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    fn name(&self) -> &str;

    async fn write(&self, points: &[MetricPoint], destination: &Destination)
    -> Result<(), SinkError>;
}
