//! In-process diagnostics runtime.
//!
//! Sources register themselves by name. Enabling a source spawns one polling
//! task that snapshots it every interval and fans the serialized payloads out
//! to every listener as one [`FlushRound`]. Later listeners join the running
//! poller; it stops once the last listener is gone.

use crate::domain::ports::{DiagnosticsRuntime, FlushRound};
use crate::infrastructure::diagnostics::counter_source::DiagnosticCounterSource;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock, Weak};
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

static GLOBAL: OnceLock<Arc<DiagnosticsRegistry>> = OnceLock::new();

#[derive(Default)]
struct Listeners {
    senders: Vec<Sender<FlushRound>>,
    /// Set by the poller when it exits. A closed set never gains listeners.
    closed: bool,
}

type SharedListeners = Arc<Mutex<Listeners>>;

struct Poller {
    listeners: SharedListeners,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct DiagnosticsRegistry {
    sources: RwLock<HashMap<String, Weak<DiagnosticCounterSource>>>,
    pollers: Mutex<HashMap<String, Poller>>,
}

impl DiagnosticsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<DiagnosticsRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(DiagnosticsRegistry::new())))
    }

    /// Returns false if a live source with the same name is already registered.
    pub fn register(&self, source: &Arc<DiagnosticCounterSource>) -> bool {
        let mut sources = match self.sources.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if sources
            .get(source.name())
            .is_some_and(|existing| existing.strong_count() > 0)
        {
            warn!(
                "DiagnosticsRegistry: Source {} is already registered",
                source.name()
            );
            return false;
        }
        sources.insert(source.name().to_string(), Arc::downgrade(source));
        debug!("DiagnosticsRegistry: Registered source {}", source.name());
        true
    }

    /// Forget a source and stop polling it for every listener.
    pub fn unregister(&self, name: &str) -> bool {
        if let Some(poller) = self.lock_pollers().remove(name) {
            lock_listeners(&poller.listeners).closed = true;
            poller.handle.abort();
        }
        let mut sources = match self.sources.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sources.remove(name).is_some()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.lock_pollers().get(name).is_some_and(|poller| {
            !poller.handle.is_finished() && !lock_listeners(&poller.listeners).closed
        })
    }

    /// Number of listeners currently receiving rounds of `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.lock_pollers()
            .get(name)
            .map(|poller| lock_listeners(&poller.listeners).senders.len())
            .unwrap_or(0)
    }

    fn lookup(&self, name: &str) -> Option<Weak<DiagnosticCounterSource>> {
        let sources = match self.sources.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sources.get(name).cloned()
    }

    fn lock_pollers(&self) -> MutexGuard<'_, HashMap<String, Poller>> {
        match self.pollers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn lock_listeners(listeners: &SharedListeners) -> MutexGuard<'_, Listeners> {
    match listeners.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl DiagnosticsRuntime for DiagnosticsRegistry {
    fn sources(&self) -> Vec<String> {
        let sources = match self.sources.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut names: Vec<String> = sources
            .iter()
            .filter(|(_, source)| source.strong_count() > 0)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn enable(&self, source: &str, interval: Duration, tx: Sender<FlushRound>) -> bool {
        let Some(weak) = self.lookup(source) else {
            warn!("DiagnosticsRegistry: Cannot enable unknown source {}", source);
            return false;
        };

        let mut pollers = self.lock_pollers();
        if let Some(poller) = pollers.get(source) {
            let mut listeners = lock_listeners(&poller.listeners);
            if !listeners.closed && !poller.handle.is_finished() {
                if listeners.senders.iter().any(|s| s.same_channel(&tx)) {
                    debug!("DiagnosticsRegistry: Listener already polls {}", source);
                } else {
                    listeners.senders.push(tx);
                    info!(
                        "DiagnosticsRegistry: Added listener to {} ({} total)",
                        source,
                        listeners.senders.len()
                    );
                }
                return true;
            }
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                "DiagnosticsRegistry: No tokio runtime, cannot poll source {}",
                source
            );
            return false;
        };

        let listeners: SharedListeners = Arc::new(Mutex::new(Listeners {
            senders: vec![tx],
            closed: false,
        }));
        let handle = runtime.spawn(poll_source(
            source.to_string(),
            weak,
            interval,
            Arc::clone(&listeners),
        ));
        pollers.insert(source.to_string(), Poller { listeners, handle });
        info!(
            "DiagnosticsRegistry: Polling {} every {:?}",
            source, interval
        );
        true
    }

    fn disable(&self, source: &str, tx: &Sender<FlushRound>) -> bool {
        let mut pollers = self.lock_pollers();
        let Some(poller) = pollers.get(source) else {
            return false;
        };

        let (removed, last) = {
            let mut listeners = lock_listeners(&poller.listeners);
            let before = listeners.senders.len();
            listeners.senders.retain(|s| !s.same_channel(tx));
            let last = listeners.senders.is_empty();
            if last {
                listeners.closed = true;
            }
            (listeners.senders.len() != before, last)
        };

        if last && let Some(poller) = pollers.remove(source) {
            poller.handle.abort();
            debug!("DiagnosticsRegistry: Stopped polling {}", source);
        }
        removed
    }
}

impl Drop for DiagnosticsRegistry {
    fn drop(&mut self) {
        let pollers = match self.pollers.get_mut() {
            Ok(pollers) => pollers,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (_, poller) in pollers.drain() {
            poller.handle.abort();
        }
    }
}

async fn poll_source(
    source_name: String,
    source: Weak<DiagnosticCounterSource>,
    interval: Duration,
    listeners: SharedListeners,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let Some(live) = source.upgrade() else {
            debug!("DiagnosticsRegistry: Source {} dropped, stop polling", source_name);
            lock_listeners(&listeners).closed = true;
            return;
        };
        let payloads = live
            .snapshot(interval)
            .into_iter()
            .filter_map(|payload| serde_json::to_value(payload).ok())
            .collect();
        drop(live);

        let round = FlushRound {
            source_name: source_name.clone(),
            payloads,
        };
        let targets = lock_listeners(&listeners).senders.clone();
        for tx in targets {
            if tx.send(round.clone()).await.is_err() {
                debug!("DiagnosticsRegistry: Listener for {} closed", source_name);
            }
        }

        let mut remaining = lock_listeners(&listeners);
        remaining.senders.retain(|s| !s.is_closed());
        if remaining.senders.is_empty() {
            remaining.closed = true;
            debug!("DiagnosticsRegistry: No listeners left for {}", source_name);
            return;
        }
    }
}
