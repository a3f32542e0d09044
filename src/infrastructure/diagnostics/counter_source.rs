//! Pollable counter set for one cache.
//!
//! A [`DiagnosticCounterSource`] is a [`MetricsBackend`], so the same
//! [`crate::application::CacheEventObserver`] that feeds Prometheus can feed
//! it. Values are only read out when a registry polls [`DiagnosticCounterSource::snapshot`].

use crate::domain::conventions::{MetricEvent, SemanticConventions};
use crate::domain::errors::{BackendError, ConstructionError};
use crate::domain::metric_point::Tags;
use crate::domain::payload::{CounterKind, DiagnosticPayload};
use crate::domain::ports::{CacheEvents, MetricsBackend};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Static description of one declared counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredCounter {
    pub name: String,
    pub kind: CounterKind,
    pub metadata: String,
}

struct IncrementingCounter {
    name: String,
    total: AtomicU64,
    reported: AtomicU64,
}

impl IncrementingCounter {
    fn new(name: String) -> Self {
        Self {
            name,
            total: AtomicU64::new(0),
            reported: AtomicU64::new(0),
        }
    }

    /// Delta since the previous call.
    fn take_delta(&self) -> u64 {
        let current = self.total.load(Ordering::Acquire);
        let previous = self.reported.swap(current, Ordering::AcqRel);
        current.saturating_sub(previous)
    }
}

struct ItemCountGauge {
    name: String,
    store: Option<Weak<dyn CacheEvents>>,
    last_pushed: AtomicU64,
}

impl ItemCountGauge {
    fn read(&self) -> u64 {
        self.store
            .as_ref()
            .and_then(Weak::upgrade)
            .and_then(|store| store.item_count())
            .unwrap_or_else(|| self.last_pushed.load(Ordering::Acquire))
    }
}

/// Named set of diagnostic counters tied to one cache.
pub struct DiagnosticCounterSource {
    name: String,
    metadata: String,
    counters: Vec<IncrementingCounter>,
    index: HashMap<String, usize>,
    gauge: ItemCountGauge,
}

impl DiagnosticCounterSource {
    /// Declare one incrementing counter per cache event plus the `item_count`
    /// gauge. The source is named after the cache.
    pub fn new(
        cache_name: &str,
        conventions: &dyn SemanticConventions,
    ) -> Result<Self, ConstructionError> {
        if cache_name.trim().is_empty() {
            return Err(ConstructionError::empty("cache_name"));
        }

        let counters: Vec<IncrementingCounter> = MetricEvent::COUNTERS
            .iter()
            .map(|event| IncrementingCounter::new(conventions.event_value(*event).to_string()))
            .collect();
        let index = counters
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();

        Ok(Self {
            name: cache_name.to_string(),
            metadata: format!("{}:{}", conventions.cache_name_tag(), cache_name),
            counters,
            index,
            gauge: ItemCountGauge {
                name: conventions.event_value(MetricEvent::ItemCount).to_string(),
                store: None,
                last_pushed: AtomicU64::new(0),
            },
        })
    }

    /// Read the gauge straight from `store` instead of waiting for pushes.
    pub fn with_store<C: CacheEvents + 'static>(mut self, store: &Arc<C>) -> Self {
        let store: Arc<dyn CacheEvents> = store.clone();
        self.gauge.store = Some(Arc::downgrade(&store));
        self
    }

    /// Append extra `key:value` metadata to every counter.
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata = format!("{},{}:{}", self.metadata, key, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn declared_counters(&self) -> Vec<DeclaredCounter> {
        self.counters
            .iter()
            .map(|c| DeclaredCounter {
                name: c.name.clone(),
                kind: CounterKind::Incrementing,
                metadata: self.metadata.clone(),
            })
            .chain(std::iter::once(DeclaredCounter {
                name: self.gauge.name.clone(),
                kind: CounterKind::Gauge,
                metadata: self.metadata.clone(),
            }))
            .collect()
    }

    /// Lifetime total of an incrementing counter.
    pub fn total(&self, counter: &str) -> Option<u64> {
        self.index
            .get(counter)
            .map(|i| self.counters[*i].total.load(Ordering::Acquire))
    }

    pub fn item_count(&self) -> u64 {
        self.gauge.read()
    }

    /// One payload per declared counter. Incrementing counters report the
    /// delta since the previous snapshot.
    pub fn snapshot(&self, interval: Duration) -> Vec<DiagnosticPayload> {
        let interval_sec = interval.as_secs_f64();
        let mut payloads: Vec<DiagnosticPayload> = self
            .counters
            .iter()
            .map(|c| DiagnosticPayload {
                name: c.name.clone(),
                display_name: display_name(&c.name),
                metadata: self.metadata.clone(),
                increment: Some(c.take_delta() as f64),
                mean: None,
                counter_type: CounterKind::Incrementing.wire_type().to_string(),
                interval_sec,
            })
            .collect();

        payloads.push(DiagnosticPayload {
            name: self.gauge.name.clone(),
            display_name: display_name(&self.gauge.name),
            metadata: self.metadata.clone(),
            increment: None,
            mean: Some(self.gauge.read() as f64),
            counter_type: CounterKind::Gauge.wire_type().to_string(),
            interval_sec,
        });
        payloads
    }
}

impl MetricsBackend for DiagnosticCounterSource {
    /// Tags are ignored, a source only ever counts for its own cache.
    fn increment_counter(&self, name: &str, _tags: &Tags) -> Result<(), BackendError> {
        let i = self
            .index
            .get(name)
            .ok_or_else(|| BackendError::UnknownMetric {
                metric: name.to_string(),
            })?;
        self.counters[*i].total.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn set_gauge(&self, name: &str, _tags: &Tags, value: u64) -> Result<(), BackendError> {
        if name != self.gauge.name {
            return Err(BackendError::UnknownMetric {
                metric: name.to_string(),
            });
        }
        self.gauge.last_pushed.store(value, Ordering::Release);
        Ok(())
    }
}

fn display_name(counter: &str) -> String {
    counter
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conventions::DefaultConventions;

    fn source() -> DiagnosticCounterSource {
        DiagnosticCounterSource::new("email", &DefaultConventions).unwrap()
    }

    #[test]
    fn test_declares_every_counter_and_gauge() {
        let counters = source().declared_counters();
        assert_eq!(counters.len(), 13);
        assert!(counters.iter().all(|c| c.metadata == "cacheName:email"));
        assert_eq!(
            counters.iter().filter(|c| c.kind == CounterKind::Gauge).count(),
            1
        );
    }

    #[test]
    fn test_rejects_empty_name() {
        assert!(DiagnosticCounterSource::new("", &DefaultConventions).is_err());
    }

    #[test]
    fn test_snapshot_reports_deltas() {
        let source = source();
        let tags = Tags::new();
        for _ in 0..3 {
            source.increment_counter("hit", &tags).unwrap();
        }

        let first = source.snapshot(Duration::from_secs(5));
        let hit = first.iter().find(|p| p.name == "hit").unwrap();
        assert_eq!(hit.increment, Some(3.0));
        assert_eq!(hit.counter_type, "Sum");
        assert_eq!(hit.interval_sec, 5.0);

        source.increment_counter("hit", &tags).unwrap();
        let second = source.snapshot(Duration::from_secs(5));
        let hit = second.iter().find(|p| p.name == "hit").unwrap();
        assert_eq!(hit.increment, Some(1.0));
        assert_eq!(source.total("hit"), Some(4));
    }

    #[test]
    fn test_gauge_uses_pushed_value_without_store() {
        let source = source();
        source.set_gauge("item_count", &Tags::new(), 17).unwrap();
        let snapshot = source.snapshot(Duration::from_secs(1));
        let gauge = snapshot.iter().find(|p| p.name == "item_count").unwrap();
        assert_eq!(gauge.mean, Some(17.0));
        assert_eq!(gauge.increment, None);
    }

    #[test]
    fn test_unknown_counter_is_rejected() {
        let source = source();
        assert!(source.increment_counter("nope", &Tags::new()).is_err());
        assert!(source.set_gauge("hit", &Tags::new(), 1).is_err());
    }

    #[test]
    fn test_extra_metadata_and_display_name() {
        let source = source().with_metadata("application", "mailer");
        assert_eq!(source.metadata(), "cacheName:email,application:mailer");
        assert_eq!(display_name("background_refresh_error"), "Background Refresh Error");
    }
}
