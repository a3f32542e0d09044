//! Diagnostic counter bridge.
//!
//! Discovers diagnostic sources through a [`DiagnosticsRuntime`], enables the
//! allow-listed ones, decodes every flush round into metric points and hands
//! each round to a [`MetricsSink`] as a single batch.
//!
//! One loop owns discovery and batch delivery. A failed write only loses its
//! own round.

pub mod decoder;

use crate::domain::conventions::SemanticConventions;
use crate::domain::errors::ConstructionError;
use crate::domain::metric_point::{Destination, SourceRegistration};
use crate::domain::ports::{DiagnosticsRuntime, FlushRound, MetricsSink};
use chrono::Utc;
use decoder::{DecodeContext, decode_round};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Runtime settings for [`MetricsBridge`].
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub measurement: String,
    pub application: String,
    pub application_version: String,
    /// Source names to enable. Everything else is ignored.
    pub tracked_sources: Vec<String>,
    pub polling_interval: Duration,
    pub discovery_interval: Duration,
    pub destination: Destination,
    pub channel_capacity: usize,
}

impl BridgeSettings {
    pub fn new(application: impl Into<String>, application_version: impl Into<String>) -> Self {
        let application = application.into();
        Self {
            measurement: default_measurement("dev", &application),
            application,
            application_version: application_version.into(),
            tracked_sources: vec!["email".to_string(), "domain".to_string()],
            polling_interval: Duration::from_secs(5),
            discovery_interval: Duration::from_secs(5),
            destination: Destination::Default,
            channel_capacity: 64,
        }
    }

    pub fn validate(&self) -> Result<(), ConstructionError> {
        if self.measurement.trim().is_empty() {
            return Err(ConstructionError::empty("measurement"));
        }
        if self.application.trim().is_empty() {
            return Err(ConstructionError::empty("application"));
        }
        if self.tracked_sources.is_empty() {
            return Err(ConstructionError::empty("tracked_sources"));
        }
        if self.polling_interval.is_zero() || self.discovery_interval.is_zero() {
            return Err(ConstructionError::InvalidArgument {
                argument: "interval",
                reason: "polling and discovery intervals must be positive".to_string(),
            });
        }
        if self.channel_capacity == 0 {
            return Err(ConstructionError::InvalidArgument {
                argument: "channel_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// `<prefix>_<application>_cache_events`
pub fn default_measurement(prefix: &str, application: &str) -> String {
    if prefix.is_empty() {
        format!("{}_cache_events", application)
    } else {
        format!("{}_{}_cache_events", prefix, application)
    }
}

/// Running totals, readable while the bridge is live.
#[derive(Debug, Default)]
pub struct BridgeStats {
    rounds: AtomicU64,
    empty_rounds: AtomicU64,
    points_written: AtomicU64,
    decode_failures: AtomicU64,
    write_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BridgeStatsSnapshot {
    pub rounds: u64,
    pub empty_rounds: u64,
    pub points_written: u64,
    pub decode_failures: u64,
    pub write_failures: u64,
}

impl BridgeStats {
    pub fn snapshot(&self) -> BridgeStatsSnapshot {
        BridgeStatsSnapshot {
            rounds: self.rounds.load(Ordering::Relaxed),
            empty_rounds: self.empty_rounds.load(Ordering::Relaxed),
            points_written: self.points_written.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Long-lived background bridge from diagnostic counters to a metrics sink.
pub struct MetricsBridge {
    runtime: Arc<dyn DiagnosticsRuntime>,
    sink: Arc<dyn MetricsSink>,
    conventions: Arc<dyn SemanticConventions>,
    settings: BridgeSettings,
    registrations: Mutex<HashMap<String, SourceRegistration>>,
    stats: BridgeStats,
}

impl MetricsBridge {
    pub fn new(
        runtime: Arc<dyn DiagnosticsRuntime>,
        sink: Arc<dyn MetricsSink>,
        conventions: Arc<dyn SemanticConventions>,
        settings: BridgeSettings,
    ) -> Result<Self, ConstructionError> {
        settings.validate()?;
        Ok(Self {
            runtime,
            sink,
            conventions,
            settings,
            registrations: Mutex::new(HashMap::new()),
            stats: BridgeStats::default(),
        })
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn stats(&self) -> BridgeStatsSnapshot {
        self.stats.snapshot()
    }

    /// Every source seen so far, enabled or not.
    pub fn registrations(&self) -> Vec<SourceRegistration> {
        let mut registrations: Vec<SourceRegistration> = self
            .lock_registrations()
            .values()
            .cloned()
            .collect();
        registrations.sort_by(|a, b| a.source_name.cmp(&b.source_name));
        registrations
    }

    /// Spawn [`MetricsBridge::run`] on the current tokio runtime.
    pub fn spawn(self: Arc<Self>) -> BridgeHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let bridge = Arc::clone(&self);
        let join = tokio::spawn(async move { bridge.run(shutdown_rx).await });
        BridgeHandle {
            bridge: self,
            shutdown_tx,
            join,
        }
    }

    /// Run until `shutdown` flips to true or its sender is dropped.
    ///
    /// A batch write already in progress completes before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "MetricsBridge: Starting (sink: {}, tracking: {:?}, poll: {:?}, discovery: {:?})",
            self.sink.name(),
            self.settings.tracked_sources,
            self.settings.polling_interval,
            self.settings.discovery_interval
        );

        let (round_tx, mut round_rx) = mpsc::channel::<FlushRound>(self.settings.channel_capacity);
        let mut discovery = tokio::time::interval(self.settings.discovery_interval);
        discovery.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                _ = discovery.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    self.discover(&round_tx);
                }

                Some(round) = round_rx.recv() => {
                    self.deliver(round).await;
                }
            }
        }

        self.disable_all(&round_tx);
        // Rounds already queued carry deltas the sources no longer hold.
        round_rx.close();
        while let Ok(round) = round_rx.try_recv() {
            self.deliver(round).await;
        }
        info!("MetricsBridge: Stopped. Totals: {:?}", self.stats.snapshot());
    }

    /// Reconcile the runtime's current sources against the seen-set.
    pub fn discover(&self, round_tx: &mpsc::Sender<FlushRound>) {
        let sources = self.runtime.sources();
        let mut registrations = self.lock_registrations();

        for source_name in sources {
            if registrations.contains_key(&source_name) {
                continue;
            }

            let tracked = self
                .settings
                .tracked_sources
                .iter()
                .any(|t| *t == source_name);
            if !tracked {
                debug!("MetricsBridge: Ignoring untracked source {}", source_name);
                registrations.insert(
                    source_name.clone(),
                    SourceRegistration {
                        source_name,
                        poll_interval_seconds: 0,
                        enabled: false,
                    },
                );
                continue;
            }

            if !self.runtime.enable(
                &source_name,
                self.settings.polling_interval,
                round_tx.clone(),
            ) {
                warn!(
                    "MetricsBridge: Could not enable source {}, will retry on next discovery",
                    source_name
                );
                continue;
            }

            info!(
                "MetricsBridge: Enabled source {} every {:?}",
                source_name, self.settings.polling_interval
            );
            registrations.insert(
                source_name.clone(),
                SourceRegistration {
                    source_name,
                    poll_interval_seconds: poll_interval_seconds(self.settings.polling_interval),
                    enabled: true,
                },
            );
        }
    }

    /// Decode one flush round and write it as a single batch.
    pub async fn deliver(&self, round: FlushRound) {
        self.stats.rounds.fetch_add(1, Ordering::Relaxed);

        let ctx = DecodeContext {
            measurement: &self.settings.measurement,
            application: &self.settings.application,
            application_version: &self.settings.application_version,
            tracked_sources: &self.settings.tracked_sources,
            conventions: self.conventions.as_ref(),
        };
        let decoded = decode_round(&round, &ctx, Utc::now());

        if !decoded.failures.is_empty() {
            self.stats
                .decode_failures
                .fetch_add(decoded.failures.len() as u64, Ordering::Relaxed);
        }
        if decoded.points.is_empty() {
            self.stats.empty_rounds.fetch_add(1, Ordering::Relaxed);
            debug!(
                "MetricsBridge: Round from {} produced no points, skipping write",
                round.source_name
            );
            return;
        }

        let count = decoded.points.len();
        match self
            .sink
            .write(&decoded.points, &self.settings.destination)
            .await
        {
            Ok(()) => {
                self.stats
                    .points_written
                    .fetch_add(count as u64, Ordering::Relaxed);
                debug!(
                    "MetricsBridge: Wrote {} points from {} to {}",
                    count,
                    round.source_name,
                    self.sink.name()
                );
            }
            Err(e) => {
                self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "MetricsBridge: Dropping batch of {} points from {}: {}",
                    count, round.source_name, e
                );
            }
        }
    }

    fn disable_all(&self, round_tx: &mpsc::Sender<FlushRound>) {
        let registrations = self.lock_registrations();
        for registration in registrations.values().filter(|r| r.enabled) {
            if self.runtime.disable(&registration.source_name, round_tx) {
                debug!("MetricsBridge: Disabled source {}", registration.source_name);
            }
        }
    }

    fn lock_registrations(&self) -> std::sync::MutexGuard<'_, HashMap<String, SourceRegistration>> {
        match self.registrations.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Whole seconds, rounded up so sub-second intervals never report zero.
fn poll_interval_seconds(interval: Duration) -> u64 {
    interval.as_secs_f64().ceil() as u64
}

/// Owner handle for a spawned bridge.
pub struct BridgeHandle {
    bridge: Arc<MetricsBridge>,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl BridgeHandle {
    pub fn bridge(&self) -> &Arc<MetricsBridge> {
        &self.bridge
    }

    /// Signal the loop and wait for it to finish its current round.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            warn!("MetricsBridge: Loop ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conventions::DefaultConventions;
    use crate::domain::errors::SinkError;
    use crate::domain::metric_point::MetricPoint;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct FakeRuntime {
        sources: Mutex<Vec<String>>,
        enabled: Mutex<Vec<String>>,
        disabled: Mutex<Vec<String>>,
    }

    impl DiagnosticsRuntime for FakeRuntime {
        fn sources(&self) -> Vec<String> {
            self.sources.lock().unwrap().clone()
        }

        fn enable(&self, source: &str, _interval: Duration, _tx: mpsc::Sender<FlushRound>) -> bool {
            self.enabled.lock().unwrap().push(source.to_string());
            true
        }

        fn disable(&self, source: &str, _tx: &mpsc::Sender<FlushRound>) -> bool {
            self.disabled.lock().unwrap().push(source.to_string());
            true
        }
    }

    #[derive(Default)]
    struct FakeSink {
        batches: Mutex<Vec<Vec<MetricPoint>>>,
        destinations: Mutex<Vec<Destination>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl MetricsSink for FakeSink {
        fn name(&self) -> &str {
            "fake"
        }

        async fn write(
            &self,
            points: &[MetricPoint],
            destination: &Destination,
        ) -> Result<(), SinkError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SinkError::Unavailable {
                    reason: "down".to_string(),
                });
            }
            self.batches.lock().unwrap().push(points.to_vec());
            self.destinations.lock().unwrap().push(destination.clone());
            Ok(())
        }
    }

    fn bridge(runtime: Arc<FakeRuntime>, sink: Arc<FakeSink>) -> MetricsBridge {
        let mut settings = BridgeSettings::new("mailer", "1.0.0");
        settings.destination = Destination::Cloud {
            bucket: "metrics".to_string(),
            organization: "acme".to_string(),
        };
        MetricsBridge::new(runtime, sink, Arc::new(DefaultConventions), settings).unwrap()
    }

    fn round(source: &str, n: usize) -> FlushRound {
        FlushRound {
            source_name: source.to_string(),
            payloads: (0..n)
                .map(|i| {
                    json!({"Name": format!("c{i}"), "Metadata": format!("cacheName:{source}"), "Increment": 1.0})
                })
                .collect(),
        }
    }

    #[test]
    fn test_default_measurement_pattern() {
        assert_eq!(default_measurement("dev", "mailer"), "dev_mailer_cache_events");
        assert_eq!(BridgeSettings::new("mailer", "1").measurement, "dev_mailer_cache_events");
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = BridgeSettings::new("mailer", "1");
        settings.tracked_sources.clear();
        assert!(settings.validate().is_err());

        let mut settings = BridgeSettings::new("mailer", "1");
        settings.polling_interval = Duration::ZERO;
        assert!(settings.validate().is_err());

        assert!(BridgeSettings::new("", "1").validate().is_err());
    }

    #[tokio::test]
    async fn test_discovery_is_idempotent_and_allow_listed() {
        let runtime = Arc::new(FakeRuntime::default());
        let sink = Arc::new(FakeSink::default());
        let bridge = bridge(runtime.clone(), sink);
        let (tx, _rx) = mpsc::channel(4);

        *runtime.sources.lock().unwrap() = vec!["email".to_string(), "sessions".to_string()];
        bridge.discover(&tx);
        bridge.discover(&tx);

        runtime.sources.lock().unwrap().push("domain".to_string());
        bridge.discover(&tx);

        assert_eq!(*runtime.enabled.lock().unwrap(), vec!["email", "domain"]);
        let registrations = bridge.registrations();
        assert_eq!(registrations.len(), 3);
        let sessions = registrations
            .iter()
            .find(|r| r.source_name == "sessions")
            .unwrap();
        assert!(!sessions.enabled);
    }

    #[tokio::test]
    async fn test_deliver_writes_one_batch_to_destination() {
        let runtime = Arc::new(FakeRuntime::default());
        let sink = Arc::new(FakeSink::default());
        let bridge = bridge(runtime, sink.clone());

        bridge.deliver(round("email", 3)).await;

        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        assert!(matches!(
            sink.destinations.lock().unwrap()[0],
            Destination::Cloud { .. }
        ));
        assert_eq!(bridge.stats().points_written, 3);
    }

    #[tokio::test]
    async fn test_empty_round_skips_write() {
        let sink = Arc::new(FakeSink::default());
        let bridge = bridge(Arc::new(FakeRuntime::default()), sink.clone());

        bridge.deliver(round("email", 0)).await;
        bridge.deliver(round("sessions", 2)).await;

        assert!(sink.batches.lock().unwrap().is_empty());
        assert_eq!(bridge.stats().empty_rounds, 2);
    }

    #[tokio::test]
    async fn test_write_failure_is_isolated_to_round() {
        let sink = Arc::new(FakeSink::default());
        let bridge = bridge(Arc::new(FakeRuntime::default()), sink.clone());

        sink.fail.store(true, Ordering::SeqCst);
        bridge.deliver(round("email", 2)).await;
        sink.fail.store(false, Ordering::SeqCst);
        bridge.deliver(round("domain", 2)).await;

        let stats = bridge.stats();
        assert_eq!(stats.write_failures, 1);
        assert_eq!(stats.points_written, 2);
        assert_eq!(sink.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_disables_enabled_sources() {
        let runtime = Arc::new(FakeRuntime::default());
        *runtime.sources.lock().unwrap() = vec!["email".to_string(), "sessions".to_string()];
        let mut settings = BridgeSettings::new("mailer", "1.0.0");
        settings.discovery_interval = Duration::from_millis(10);
        let bridge = Arc::new(
            MetricsBridge::new(
                runtime.clone(),
                Arc::new(FakeSink::default()),
                Arc::new(DefaultConventions),
                settings,
            )
            .unwrap(),
        );

        let handle = bridge.spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;

        assert_eq!(*runtime.enabled.lock().unwrap(), vec!["email"]);
        assert_eq!(*runtime.disabled.lock().unwrap(), vec!["email"]);
    }

    /// Hands one last snapshotted round to the listener as it is disabled.
    #[derive(Default)]
    struct LateRoundRuntime {
        late_rounds: AtomicU64,
    }

    impl DiagnosticsRuntime for LateRoundRuntime {
        fn sources(&self) -> Vec<String> {
            vec!["email".to_string()]
        }

        fn enable(&self, _source: &str, _interval: Duration, _tx: mpsc::Sender<FlushRound>) -> bool {
            true
        }

        fn disable(&self, source: &str, tx: &mpsc::Sender<FlushRound>) -> bool {
            if tx.try_send(round(source, 4)).is_ok() {
                self.late_rounds.fetch_add(1, Ordering::SeqCst);
            }
            true
        }
    }

    #[tokio::test]
    async fn test_shutdown_delivers_rounds_already_queued() {
        let runtime = Arc::new(LateRoundRuntime::default());
        let sink = Arc::new(FakeSink::default());
        let mut settings = BridgeSettings::new("mailer", "1.0.0");
        settings.tracked_sources = vec!["email".to_string()];
        settings.discovery_interval = Duration::from_millis(10);
        let bridge = Arc::new(
            MetricsBridge::new(runtime.clone(), sink.clone(), Arc::new(DefaultConventions), settings)
                .unwrap(),
        );

        let handle = bridge.spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.bridge().registrations().len(), 1);
        handle.shutdown().await;

        assert_eq!(runtime.late_rounds.load(Ordering::SeqCst), 1);
        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 4);
    }

    #[test]
    fn test_poll_interval_seconds_rounds_up() {
        assert_eq!(poll_interval_seconds(Duration::from_millis(40)), 1);
        assert_eq!(poll_interval_seconds(Duration::from_secs(5)), 5);
        assert_eq!(poll_interval_seconds(Duration::from_millis(5_500)), 6);
    }

    #[tokio::test]
    async fn test_sub_second_interval_registers_nonzero_seconds() {
        let runtime = Arc::new(FakeRuntime::default());
        *runtime.sources.lock().unwrap() = vec!["email".to_string()];
        let mut settings = BridgeSettings::new("mailer", "1.0.0");
        settings.polling_interval = Duration::from_millis(40);
        let bridge =
            MetricsBridge::new(runtime, Arc::new(FakeSink::default()), Arc::new(DefaultConventions), settings)
                .unwrap();
        let (tx, _rx) = mpsc::channel(4);

        bridge.discover(&tx);

        assert_eq!(bridge.registrations()[0].poll_interval_seconds, 1);
    }
}
