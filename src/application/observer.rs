//! Push-path adapter between a cache's lifecycle events and a metrics backend.
//!
//! The observer owns its counters' identity (tags) while the backend owns the
//! values, so detaching and reattaching never resets a total.

use crate::domain::conventions::{MetricEvent, SemanticConventions};
use crate::domain::errors::ConstructionError;
use crate::domain::events::{EventKind, EvictionReason, LifecycleEvent};
use crate::domain::metric_point::Tags;
use crate::domain::ports::{CacheEvents, EventHandler, MetricsBackend, SubscriptionId};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, warn};

/// Identity of the counter set an observer publishes.
#[derive(Debug, Clone)]
pub struct ObserverOptions {
    pub cache_name: String,
    pub application: String,
    pub application_version: String,
    /// Re-sample the store size into the `item_count` gauge on Hit/Miss/Set.
    pub sample_item_count: bool,
}

impl ObserverOptions {
    pub fn new(cache_name: impl Into<String>, application: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            application: application.into(),
            application_version: env!("CARGO_PKG_VERSION").to_string(),
            sample_item_count: true,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.application_version = version.into();
        self
    }

    pub fn with_item_count_sampling(mut self, enabled: bool) -> Self {
        self.sample_item_count = enabled;
        self
    }
}

struct PreparedMetric {
    name: String,
    tags: Tags,
}

/// State shared with every handler closure.
struct ObserverCore {
    backend: Arc<dyn MetricsBackend>,
    metrics: HashMap<MetricEvent, PreparedMetric>,
    sample_item_count: bool,
}

impl ObserverCore {
    fn record(&self, event: &LifecycleEvent, cache: &Weak<dyn CacheEvents>) {
        let metric = metric_for(event);
        self.increment(metric);

        if self.sample_item_count
            && matches!(
                event.kind(),
                EventKind::Hit | EventKind::Miss | EventKind::Set
            )
            && let Some(count) = cache.upgrade().and_then(|c| c.item_count())
        {
            self.gauge(MetricEvent::ItemCount, count);
        }
    }

    fn increment(&self, metric: MetricEvent) {
        let Some(prepared) = self.metrics.get(&metric) else {
            return;
        };
        if let Err(e) = self.backend.increment_counter(&prepared.name, &prepared.tags) {
            debug!("CacheEventObserver: Dropped {} increment: {}", prepared.name, e);
        }
    }

    fn gauge(&self, metric: MetricEvent, value: u64) {
        let Some(prepared) = self.metrics.get(&metric) else {
            return;
        };
        if let Err(e) = self.backend.set_gauge(&prepared.name, &prepared.tags, value) {
            debug!("CacheEventObserver: Dropped {} sample: {}", prepared.name, e);
        }
    }
}

/// Maps one lifecycle event onto exactly one counter.
pub fn metric_for(event: &LifecycleEvent) -> MetricEvent {
    match event {
        LifecycleEvent::Hit {
            is_stale: false, ..
        } => MetricEvent::Hit,
        LifecycleEvent::Hit { is_stale: true, .. } => MetricEvent::StaleHit,
        LifecycleEvent::Miss { .. } => MetricEvent::Miss,
        LifecycleEvent::Set { .. } => MetricEvent::Set,
        LifecycleEvent::Remove { .. } => MetricEvent::Removed,
        LifecycleEvent::Eviction {
            reason: EvictionReason::Expired,
            ..
        } => MetricEvent::ExpiredEvict,
        LifecycleEvent::Eviction {
            reason: EvictionReason::Capacity,
            ..
        } => MetricEvent::CapacityEvict,
        LifecycleEvent::BackgroundRefreshSuccess { .. } => MetricEvent::BackgroundRefresh,
        LifecycleEvent::BackgroundRefreshError { .. } => MetricEvent::BackgroundRefreshError,
        LifecycleEvent::FactoryError { .. } => MetricEvent::FactoryError,
        LifecycleEvent::SyntheticTimeout { .. } => MetricEvent::FactorySyntheticTimeout,
        LifecycleEvent::FailSafeActivate { .. } => MetricEvent::FailSafeActivate,
    }
}

struct Attachment {
    cache: Arc<dyn CacheEvents>,
    subscriptions: Vec<SubscriptionId>,
}

/// Subscribes to a cache's lifecycle events and increments backend counters.
///
/// `start` and `stop` are idempotent. Starting against a different cache
/// detaches from the previous one first.
pub struct CacheEventObserver {
    cache_name: String,
    core: Arc<ObserverCore>,
    attachment: Mutex<Option<Attachment>>,
}

impl CacheEventObserver {
    pub fn new(
        options: ObserverOptions,
        backend: Arc<dyn MetricsBackend>,
        conventions: Arc<dyn SemanticConventions>,
    ) -> Result<Self, ConstructionError> {
        if options.cache_name.trim().is_empty() {
            return Err(ConstructionError::empty("cache_name"));
        }
        if options.application.trim().is_empty() {
            return Err(ConstructionError::empty("application"));
        }

        let mut base = Tags::new();
        base.insert(
            conventions.application_tag().to_string(),
            options.application.clone(),
        );
        base.insert(
            conventions.application_version_tag().to_string(),
            options.application_version.clone(),
        );
        base.insert(
            conventions.cache_name_tag().to_string(),
            options.cache_name.clone(),
        );

        let metrics = MetricEvent::COUNTERS
            .iter()
            .copied()
            .chain(std::iter::once(MetricEvent::ItemCount))
            .map(|metric| {
                let name = conventions.event_value(metric).to_string();
                let mut tags = base.clone();
                tags.insert(conventions.cache_event_tag().to_string(), name.clone());
                (metric, PreparedMetric { name, tags })
            })
            .collect();

        Ok(Self {
            cache_name: options.cache_name,
            core: Arc::new(ObserverCore {
                backend,
                metrics,
                sample_item_count: options.sample_item_count,
            }),
            attachment: Mutex::new(None),
        })
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Attach one handler per lifecycle event kind.
    pub fn start<C: CacheEvents + 'static>(&self, cache: &Arc<C>) {
        let cache: Arc<dyn CacheEvents> = cache.clone();
        let mut attachment = match self.attachment.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(current) = attachment.as_ref() {
            if same_cache(&current.cache, &cache) {
                debug!(
                    "CacheEventObserver[{}]: Already attached, ignoring start",
                    self.cache_name
                );
                return;
            }
            warn!(
                "CacheEventObserver[{}]: Switching from cache {} to {}",
                self.cache_name,
                current.cache.cache_name(),
                cache.cache_name()
            );
        }
        if let Some(previous) = attachment.take() {
            detach(previous);
        }

        let weak = Arc::downgrade(&cache);
        let subscriptions = EventKind::ALL
            .iter()
            .map(|kind| cache.subscribe(*kind, self.handler(weak.clone())))
            .collect();

        info!(
            "CacheEventObserver[{}]: Attached to cache {}",
            self.cache_name,
            cache.cache_name()
        );
        *attachment = Some(Attachment {
            cache,
            subscriptions,
        });
    }

    /// Detach every handler from `cache`. A no-op when not attached to it.
    pub fn stop<C: CacheEvents + 'static>(&self, cache: &Arc<C>) {
        let cache: Arc<dyn CacheEvents> = cache.clone();
        let mut attachment = match self.attachment.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let attached_here = attachment
            .as_ref()
            .is_some_and(|current| same_cache(&current.cache, &cache));
        if !attached_here {
            return;
        }
        if let Some(current) = attachment.take() {
            detach(current);
            info!(
                "CacheEventObserver[{}]: Detached from cache {}",
                self.cache_name,
                cache.cache_name()
            );
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attachment
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    fn handler(&self, cache: Weak<dyn CacheEvents>) -> EventHandler {
        let core = Arc::clone(&self.core);
        Arc::new(move |event: &LifecycleEvent| {
            let outcome = catch_unwind(AssertUnwindSafe(|| core.record(event, &cache)));
            if outcome.is_err() {
                debug!("CacheEventObserver: Handler panicked on {:?}", event.kind());
            }
        })
    }
}

impl Drop for CacheEventObserver {
    fn drop(&mut self) {
        let attachment = match self.attachment.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(attachment) = attachment {
            detach(attachment);
        }
    }
}

fn detach(attachment: Attachment) {
    for id in attachment.subscriptions {
        attachment.cache.unsubscribe(id);
    }
}

fn same_cache(a: &Arc<dyn CacheEvents>, b: &Arc<dyn CacheEvents>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
