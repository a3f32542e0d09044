//! Semantic conventions for cache metrics.
//!
//! Tag keys and tag values end up persisted in a time-series store, so they must
//! stay stable across releases and never collide with each other. Every adapter
//! asks a [`SemanticConventions`] implementation for strings instead of
//! hardcoding them.

/// Every counter or gauge a cache adapter can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricEvent {
    Hit,
    StaleHit,
    Miss,
    Set,
    Removed,
    ExpiredEvict,
    CapacityEvict,
    BackgroundRefresh,
    BackgroundRefreshError,
    FactoryError,
    FactorySyntheticTimeout,
    FailSafeActivate,
    ItemCount,
}

impl MetricEvent {
    /// All incrementing counters, in declaration order.
    pub const COUNTERS: [MetricEvent; 12] = [
        MetricEvent::Hit,
        MetricEvent::StaleHit,
        MetricEvent::Miss,
        MetricEvent::Set,
        MetricEvent::Removed,
        MetricEvent::ExpiredEvict,
        MetricEvent::CapacityEvict,
        MetricEvent::BackgroundRefresh,
        MetricEvent::BackgroundRefreshError,
        MetricEvent::FactoryError,
        MetricEvent::FactorySyntheticTimeout,
        MetricEvent::FailSafeActivate,
    ];

    pub fn is_gauge(self) -> bool {
        matches!(self, MetricEvent::ItemCount)
    }
}

/// Naming scheme for tags and counter values.
pub trait SemanticConventions: Send + Sync {
    fn application_tag(&self) -> &str;
    fn application_version_tag(&self) -> &str;
    fn cache_name_tag(&self) -> &str;
    fn cache_event_tag(&self) -> &str;
    fn event_value(&self, event: MetricEvent) -> &str;

    /// Tag keys in the order backends should declare their labels.
    fn tag_keys(&self) -> [&str; 4] {
        [
            self.application_tag(),
            self.application_version_tag(),
            self.cache_name_tag(),
            self.cache_event_tag(),
        ]
    }
}

/// The naming scheme used by every built-in adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConventions;

impl SemanticConventions for DefaultConventions {
    fn application_tag(&self) -> &str {
        "application"
    }

    fn application_version_tag(&self) -> &str {
        "applicationVersion"
    }

    fn cache_name_tag(&self) -> &str {
        "cacheName"
    }

    fn cache_event_tag(&self) -> &str {
        "cacheEvent"
    }

    fn event_value(&self, event: MetricEvent) -> &str {
        match event {
            MetricEvent::Hit => "hit",
            MetricEvent::StaleHit => "stale_hit",
            MetricEvent::Miss => "miss",
            MetricEvent::Set => "set",
            MetricEvent::Removed => "removed",
            MetricEvent::ExpiredEvict => "expired_evict",
            MetricEvent::CapacityEvict => "capacity_evict",
            MetricEvent::BackgroundRefresh => "background_refresh",
            MetricEvent::BackgroundRefreshError => "background_refresh_error",
            MetricEvent::FactoryError => "factory_error",
            MetricEvent::FactorySyntheticTimeout => "factory_synthetic_timeout",
            MetricEvent::FailSafeActivate => "fail_safe_activate",
            MetricEvent::ItemCount => "item_count",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_event_values_are_distinct() {
        let conventions = DefaultConventions;
        let mut values: HashSet<&str> = HashSet::new();
        for event in MetricEvent::COUNTERS {
            assert!(values.insert(conventions.event_value(event)));
        }
        assert!(values.insert(conventions.event_value(MetricEvent::ItemCount)));
        assert_eq!(values.len(), 13);
    }

    #[test]
    fn test_tag_keys_are_distinct() {
        let keys = DefaultConventions.tag_keys();
        let unique: HashSet<&str> = keys.iter().copied().collect();
        assert_eq!(unique.len(), 4);
        assert_eq!(keys[2], "cacheName");
    }

    #[test]
    fn test_only_item_count_is_gauge() {
        assert!(MetricEvent::ItemCount.is_gauge());
        assert!(MetricEvent::COUNTERS.iter().all(|e| !e.is_gauge()));
    }
}
