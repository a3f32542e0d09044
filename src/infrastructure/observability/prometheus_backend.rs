//! Prometheus counters for cache events.
//!
//! One `IntCounterVec` holds every event counter, one `IntGaugeVec` holds the
//! item count. Labels are the convention tag keys.

use crate::domain::conventions::SemanticConventions;
use crate::domain::errors::BackendError;
use crate::domain::metric_point::Tags;
use crate::domain::ports::MetricsBackend;
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct PrometheusBackend {
    registry: Arc<Registry>,
    events_total: IntCounterVec,
    item_count: IntGaugeVec,
    counter_labels: Vec<String>,
    gauge_labels: Vec<String>,
    event_label: String,
}

impl PrometheusBackend {
    /// Register the cache metrics under `measurement` in a fresh registry.
    pub fn new(measurement: &str, conventions: &dyn SemanticConventions) -> anyhow::Result<Self> {
        Self::with_registry(Registry::new(), measurement, conventions)
    }

    pub fn with_registry(
        registry: Registry,
        measurement: &str,
        conventions: &dyn SemanticConventions,
    ) -> anyhow::Result<Self> {
        let base = sanitize_metric_name(measurement);
        let counter_labels: Vec<String> =
            conventions.tag_keys().iter().map(|k| k.to_string()).collect();
        let event_label = conventions.cache_event_tag().to_string();
        let gauge_labels: Vec<String> = counter_labels
            .iter()
            .filter(|k| **k != event_label)
            .cloned()
            .collect();

        let counter_refs: Vec<&str> = counter_labels.iter().map(String::as_str).collect();
        let events_total = IntCounterVec::new(
            Opts::new(format!("{}_total", base), "Cache lifecycle events"),
            &counter_refs,
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let gauge_refs: Vec<&str> = gauge_labels.iter().map(String::as_str).collect();
        let item_count = IntGaugeVec::new(
            Opts::new(
                format!("{}_item_count", base),
                "Entries currently held by the cache",
            ),
            &gauge_refs,
        )?;
        registry.register(Box::new(item_count.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            events_total,
            item_count,
            counter_labels,
            gauge_labels,
            event_label,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    /// Current value of one event counter for the given tag set.
    pub fn counter_value(&self, event: &str, tags: &Tags) -> u64 {
        self.label_values(&self.counter_labels, event, tags)
            .ok()
            .and_then(|values| self.events_total.get_metric_with_label_values(&values).ok())
            .map(|counter| counter.get())
            .unwrap_or(0)
    }

    /// Current item count for the given tag set.
    pub fn gauge_value(&self, tags: &Tags) -> i64 {
        self.label_values(&self.gauge_labels, "", tags)
            .ok()
            .and_then(|values| self.item_count.get_metric_with_label_values(&values).ok())
            .map(|gauge| gauge.get())
            .unwrap_or(0)
    }

    fn label_values<'a>(
        &self,
        labels: &'a [String],
        name: &'a str,
        tags: &'a Tags,
    ) -> Result<Vec<&'a str>, BackendError> {
        labels
            .iter()
            .map(|label| {
                if *label == self.event_label {
                    Ok(name)
                } else {
                    tags.get(label)
                        .map(String::as_str)
                        .ok_or_else(|| BackendError::Rejected {
                            metric: name.to_string(),
                            reason: format!("missing tag {}", label),
                        })
                }
            })
            .collect()
    }
}

impl MetricsBackend for PrometheusBackend {
    fn increment_counter(&self, name: &str, tags: &Tags) -> Result<(), BackendError> {
        let values = self.label_values(&self.counter_labels, name, tags)?;
        let counter = self
            .events_total
            .get_metric_with_label_values(&values)
            .map_err(|e| BackendError::Rejected {
                metric: name.to_string(),
                reason: e.to_string(),
            })?;
        counter.inc();
        Ok(())
    }

    fn set_gauge(&self, name: &str, tags: &Tags, value: u64) -> Result<(), BackendError> {
        let values = self.label_values(&self.gauge_labels, name, tags)?;
        let gauge = self
            .item_count
            .get_metric_with_label_values(&values)
            .map_err(|e| BackendError::Rejected {
                metric: name.to_string(),
                reason: e.to_string(),
            })?;
        gauge.set(i64::try_from(value).unwrap_or(i64::MAX));
        Ok(())
    }
}

/// Replace characters Prometheus does not allow in metric names.
pub fn sanitize_metric_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conventions::DefaultConventions;

    fn tags(cache: &str) -> Tags {
        let mut tags = Tags::new();
        tags.insert("application".to_string(), "mailer".to_string());
        tags.insert("applicationVersion".to_string(), "1.0.0".to_string());
        tags.insert("cacheName".to_string(), cache.to_string());
        tags
    }

    #[test]
    fn test_metrics_creation() {
        let backend = PrometheusBackend::new("dev_mailer_cache_events", &DefaultConventions)
            .expect("Failed to create backend");
        backend.increment_counter("hit", &tags("email")).unwrap();
        let output = backend.render();
        assert!(output.contains("dev_mailer_cache_events_total"));
        assert!(output.contains("cacheEvent=\"hit\""));
    }

    #[test]
    fn test_counters_are_disjoint_per_cache() {
        let backend = PrometheusBackend::new("m", &DefaultConventions).unwrap();
        backend.increment_counter("hit", &tags("email")).unwrap();
        backend.increment_counter("hit", &tags("email")).unwrap();
        backend.increment_counter("hit", &tags("domain")).unwrap();

        assert_eq!(backend.counter_value("hit", &tags("email")), 2);
        assert_eq!(backend.counter_value("hit", &tags("domain")), 1);
        assert_eq!(backend.counter_value("miss", &tags("email")), 0);
    }

    #[test]
    fn test_gauge_rendered_without_event_label() {
        let backend = PrometheusBackend::new("m", &DefaultConventions).unwrap();
        backend.set_gauge("item_count", &tags("email"), 42).unwrap();
        let output = backend.render();
        assert!(output.contains("m_item_count{"));
        assert!(output.contains("42"));
        assert_eq!(backend.gauge_value(&tags("email")), 42);
    }

    #[test]
    fn test_missing_tag_is_rejected() {
        let backend = PrometheusBackend::new("m", &DefaultConventions).unwrap();
        assert!(backend.increment_counter("hit", &Tags::new()).is_err());
    }

    #[test]
    fn test_sanitize_metric_name() {
        assert_eq!(sanitize_metric_name("dev-app.cache"), "dev_app_cache");
        assert_eq!(sanitize_metric_name("9lives"), "_9lives");
        assert_eq!(sanitize_metric_name(""), "_");
    }
}
