//! Small in-memory cache that reports lifecycle events.
//!
//! A reference producer for the observers: size-limited (oldest entry evicted
//! first) and TTL-based. Events are dispatched synchronously on the calling
//! thread after the entry lock is released, so handlers may query
//! [`CacheEvents::item_count`].

use crate::domain::events::{EventKind, EvictionReason, LifecycleEvent};
use crate::domain::ports::{CacheEvents, EventHandler, SubscriptionId};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Maximum number of entries. Oldest entries are evicted beyond it.
    pub size_limit: Option<usize>,
    pub duration: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            size_limit: None,
            duration: Duration::from_secs(60),
        }
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct Entries<V> {
    map: HashMap<String, Entry<V>>,
    order: VecDeque<String>,
}

struct Inner<V> {
    name: String,
    options: CacheOptions,
    entries: Mutex<Entries<V>>,
    handlers: RwLock<Vec<(SubscriptionId, EventKind, EventHandler)>>,
    next_subscription: AtomicU64,
}

/// Cloning shares the same store and subscribers.
pub struct InMemoryCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for InMemoryCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> InMemoryCache<V> {
    pub fn new(name: impl Into<String>, options: CacheOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                options,
                entries: Mutex::new(Entries {
                    map: HashMap::new(),
                    order: VecDeque::new(),
                }),
                handlers: RwLock::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.lock_entries().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set(&self, key: &str, value: V) {
        let mut events = vec![LifecycleEvent::Set {
            key: key.to_string(),
        }];
        {
            let mut entries = self.lock_entries();
            let entry = Entry {
                value,
                expires_at: Instant::now() + self.inner.options.duration,
            };
            if entries.map.insert(key.to_string(), entry).is_none() {
                entries.order.push_back(key.to_string());
            }
            if let Some(limit) = self.inner.options.size_limit {
                while entries.map.len() > limit {
                    let Some(oldest) = entries.order.pop_front() else {
                        break;
                    };
                    if entries.map.remove(&oldest).is_some() {
                        events.push(LifecycleEvent::Eviction {
                            key: oldest,
                            reason: EvictionReason::Capacity,
                        });
                    }
                }
            }
        }
        self.emit_all(events);
    }

    /// Fresh values only. An expired entry is evicted on read.
    pub fn try_get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut events = Vec::with_capacity(2);
        let result = {
            let mut entries = self.lock_entries();
            match entries.map.get(key) {
                Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
                Some(_) => {
                    Self::evict(&mut entries, key);
                    events.push(LifecycleEvent::Eviction {
                        key: key.to_string(),
                        reason: EvictionReason::Expired,
                    });
                    None
                }
                None => None,
            }
        };

        events.push(match result {
            Some(_) => LifecycleEvent::Hit {
                key: key.to_string(),
                is_stale: false,
            },
            None => LifecycleEvent::Miss {
                key: key.to_string(),
            },
        });
        self.emit_all(events);
        result
    }

    /// Emits `Remove` whether or not the key was present.
    pub fn remove(&self, key: &str) {
        {
            let mut entries = self.lock_entries();
            Self::evict(&mut entries, key);
        }
        self.emit(&LifecycleEvent::Remove {
            key: key.to_string(),
        });
    }

    /// Evict every entry past its TTL.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = {
            let mut entries = self.lock_entries();
            let keys: Vec<String> = entries
                .map
                .iter()
                .filter(|(_, e)| now >= e.expires_at)
                .map(|(k, _)| k.clone())
                .collect();
            for key in &keys {
                Self::evict(&mut entries, key);
            }
            keys
        };

        let count = expired.len();
        self.emit_all(
            expired
                .into_iter()
                .map(|key| LifecycleEvent::Eviction {
                    key,
                    reason: EvictionReason::Expired,
                })
                .collect(),
        );
        count
    }

    fn evict(entries: &mut Entries<V>, key: &str) {
        if entries.map.remove(key).is_some() {
            entries.order.retain(|k| k != key);
        }
    }

    fn emit_all(&self, events: Vec<LifecycleEvent>) {
        for event in &events {
            self.emit(event);
        }
    }

    fn emit(&self, event: &LifecycleEvent) {
        let kind = event.kind();
        let handlers: Vec<EventHandler> = {
            let handlers = match self.inner.handlers.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            handlers
                .iter()
                .filter(|(_, k, _)| *k == kind)
                .map(|(_, _, h)| Arc::clone(h))
                .collect()
        };
        for handler in handlers {
            handler(event);
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, Entries<V>> {
        match self.inner.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> CacheEvents for InMemoryCache<V> {
    fn cache_name(&self) -> &str {
        &self.inner.name
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        let mut handlers = match self.inner.handlers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.push((id, kind, handler));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = match self.inner.handlers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = handlers.len();
        handlers.retain(|(existing, _, _)| *existing != id);
        handlers.len() != before
    }

    fn item_count(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn recorder(cache: &InMemoryCache<i32>) -> Arc<Mutex<Vec<LifecycleEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in EventKind::ALL {
            let seen = Arc::clone(&seen);
            cache.subscribe(
                kind,
                Arc::new(move |e: &LifecycleEvent| seen.lock().unwrap().push(e.clone())),
            );
        }
        seen
    }

    #[test]
    fn test_set_get_remove_events() {
        let cache = InMemoryCache::new("t", CacheOptions::default());
        let seen = recorder(&cache);

        cache.set("k", 1);
        assert_eq!(cache.try_get("k"), Some(1));
        assert_eq!(cache.try_get("other"), None);
        cache.remove("k");

        let kinds: Vec<EventKind> = seen.lock().unwrap().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Set, EventKind::Hit, EventKind::Miss, EventKind::Remove]
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let options = CacheOptions {
            size_limit: Some(2),
            ..CacheOptions::default()
        };
        let cache = InMemoryCache::new("t", options);
        let seen = recorder(&cache);

        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.try_get("a"), None);
        let evicted: Vec<LifecycleEvent> = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == EventKind::Eviction)
            .cloned()
            .collect();
        assert_eq!(
            evicted,
            vec![LifecycleEvent::Eviction {
                key: "a".to_string(),
                reason: EvictionReason::Capacity
            }]
        );
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let options = CacheOptions {
            duration: Duration::from_millis(5),
            ..CacheOptions::default()
        };
        let cache = InMemoryCache::new("t", options);
        let seen = recorder(&cache);

        cache.set("k", 1);
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(cache.try_get("k"), None);

        assert!(seen.lock().unwrap().contains(&LifecycleEvent::Eviction {
            key: "k".to_string(),
            reason: EvictionReason::Expired
        }));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let cache: InMemoryCache<i32> = InMemoryCache::new("t", CacheOptions::default());
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let id = cache.subscribe(
            EventKind::Set,
            Arc::new(move |_: &LifecycleEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        cache.set("a", 1);
        assert!(cache.unsubscribe(id));
        assert!(!cache.unsubscribe(id));
        cache.set("b", 2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
