use serde::{Deserialize, Serialize};

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvictionReason {
    Expired,
    Capacity,
}

/// Discriminant used to subscribe to one kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Hit,
    Miss,
    Set,
    Remove,
    Eviction,
    BackgroundRefreshSuccess,
    BackgroundRefreshError,
    FactoryError,
    SyntheticTimeout,
    FailSafeActivate,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::Hit,
        EventKind::Miss,
        EventKind::Set,
        EventKind::Remove,
        EventKind::Eviction,
        EventKind::BackgroundRefreshSuccess,
        EventKind::BackgroundRefreshError,
        EventKind::FactoryError,
        EventKind::SyntheticTimeout,
        EventKind::FailSafeActivate,
    ];
}

/// One observable state transition reported by a cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Hit { key: String, is_stale: bool },
    Miss { key: String },
    Set { key: String },
    Remove { key: String },
    Eviction { key: String, reason: EvictionReason },
    BackgroundRefreshSuccess { key: String },
    BackgroundRefreshError { key: String },
    FactoryError { key: String },
    SyntheticTimeout { key: String },
    FailSafeActivate { key: String },
}

impl LifecycleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LifecycleEvent::Hit { .. } => EventKind::Hit,
            LifecycleEvent::Miss { .. } => EventKind::Miss,
            LifecycleEvent::Set { .. } => EventKind::Set,
            LifecycleEvent::Remove { .. } => EventKind::Remove,
            LifecycleEvent::Eviction { .. } => EventKind::Eviction,
            LifecycleEvent::BackgroundRefreshSuccess { .. } => EventKind::BackgroundRefreshSuccess,
            LifecycleEvent::BackgroundRefreshError { .. } => EventKind::BackgroundRefreshError,
            LifecycleEvent::FactoryError { .. } => EventKind::FactoryError,
            LifecycleEvent::SyntheticTimeout { .. } => EventKind::SyntheticTimeout,
            LifecycleEvent::FailSafeActivate { .. } => EventKind::FailSafeActivate,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            LifecycleEvent::Hit { key, .. }
            | LifecycleEvent::Miss { key }
            | LifecycleEvent::Set { key }
            | LifecycleEvent::Remove { key }
            | LifecycleEvent::Eviction { key, .. }
            | LifecycleEvent::BackgroundRefreshSuccess { key }
            | LifecycleEvent::BackgroundRefreshError { key }
            | LifecycleEvent::FactoryError { key }
            | LifecycleEvent::SyntheticTimeout { key }
            | LifecycleEvent::FailSafeActivate { key } => key,
        }
    }
}
