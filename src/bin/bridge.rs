//! Cache metrics bridge - headless process
//!
//! Discovers diagnostic cache sources, polls them and forwards each round to
//! the configured metrics sink (console JSON or InfluxDB).
//!
//! # Usage
//! ```sh
//! SINK_KIND=influx INFLUX_URL=http://localhost:8086 cargo run --bin bridge -- --simulate
//! ```
//!
//! # Environment Variables
//! - `APP_NAME`, `APP_VERSION` - Application tags (default: app / crate version)
//! - `BRIDGE_POLL_INTERVAL_SECS` - Counter polling interval (default: 5)
//! - `BRIDGE_DISCOVERY_INTERVAL_SECS` - Source discovery interval (default: 5)
//! - `BRIDGE_TRACKED_CACHES` - Comma-separated cache names (default: email,domain)
//! - `SINK_KIND` - `console` or `influx` (default: console)
//! - `INFLUX_URL`, `INFLUX_DATABASE`, `INFLUX_TOKEN`, `INFLUX_BUCKET`, `INFLUX_ORG`

use anyhow::{Context, Result};
use cachepulse::application::{CacheEventObserver, MetricsBridge, ObserverOptions};
use cachepulse::config::{Config, SinkKind};
use cachepulse::domain::conventions::{DefaultConventions, SemanticConventions};
use cachepulse::domain::ports::MetricsSink;
use cachepulse::infrastructure::cache::{CacheOptions, InMemoryCache};
use cachepulse::infrastructure::sinks::{ConsoleSink, InfluxSink, InfluxSinkConfig};
use cachepulse::infrastructure::{DiagnosticCounterSource, DiagnosticsRegistry, LoggingBackend};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Cache metrics bridge", long_about = None)]
struct Cli {
    /// Override the sink kind (console, influx)
    #[arg(long)]
    sink: Option<String>,

    /// Override the polling interval in seconds
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Run a light synthetic workload against the tracked caches
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// Also log every simulated cache event at INFO
    #[arg(long, default_value_t = false)]
    log_events: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("Cache metrics bridge {} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env()?;
    if let Some(kind) = cli.sink.as_deref() {
        config.sink.kind = kind.parse()?;
    }
    if let Some(secs) = cli.poll_interval {
        config.bridge.polling_interval_secs = secs.max(1);
    }
    info!(
        "Configuration loaded: App={} Measurement={} Caches={:?} Sink={:?}",
        config.bridge.application,
        config.bridge.measurement,
        config.bridge.tracked_caches,
        config.sink.kind
    );

    let sink: Arc<dyn MetricsSink> = match config.sink.kind {
        SinkKind::Console => Arc::new(ConsoleSink::stdout()),
        SinkKind::Influx => {
            let mut influx = InfluxSinkConfig::new(
                config.sink.influx_url.clone(),
                config.sink.influx_database.clone(),
            );
            influx.token = config.sink.influx_token.clone();
            influx.timeout = Duration::from_secs(config.sink.timeout_secs);
            Arc::new(InfluxSink::new(influx).context("Failed to create InfluxDB sink")?)
        }
    };

    let conventions: Arc<dyn SemanticConventions> = Arc::new(DefaultConventions);
    let registry = DiagnosticsRegistry::global();

    // Keeps simulated caches, sources and observers alive for the process lifetime.
    let mut simulated = Vec::new();
    if cli.simulate {
        for name in &config.bridge.tracked_caches {
            let cache = Arc::new(InMemoryCache::<u64>::new(
                name.clone(),
                CacheOptions {
                    size_limit: Some(500),
                    duration: Duration::from_secs(30),
                },
            ));
            let source = Arc::new(
                DiagnosticCounterSource::new(name, conventions.as_ref())?
                    .with_store(&cache)
                    .with_metadata(conventions.application_tag(), &config.bridge.application),
            );
            if !registry.register(&source) {
                warn!("Source {} is already registered, skipping simulated cache", name);
                continue;
            }
            let observer = CacheEventObserver::new(
                ObserverOptions::new(name.clone(), config.bridge.application.clone())
                    .with_version(config.bridge.application_version.clone())
                    .with_item_count_sampling(false),
                source.clone(),
                conventions.clone(),
            )?;
            observer.start(&cache);
            let event_log = if cli.log_events {
                let logger = CacheEventObserver::new(
                    ObserverOptions::new(name.clone(), config.bridge.application.clone())
                        .with_version(config.bridge.application_version.clone()),
                    Arc::new(LoggingBackend::new(Level::INFO)),
                    conventions.clone(),
                )?;
                logger.start(&cache);
                Some(logger)
            } else {
                None
            };
            tokio::spawn(simulate(Arc::clone(&cache)));
            simulated.push((cache, source, observer, event_log));
        }
        info!("Simulating workload on {} caches", simulated.len());
    }

    let bridge = Arc::new(MetricsBridge::new(
        registry,
        sink,
        conventions,
        config.bridge_settings(),
    )?);
    let handle = bridge.spawn();

    info!("Bridge running. Press Ctrl+C to shutdown.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Waiting for in-flight batch...");
    handle.shutdown().await;
    drop(simulated);

    Ok(())
}

async fn simulate(cache: Arc<InMemoryCache<u64>>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    let mut n: u64 = 0;
    loop {
        ticker.tick().await;
        n = n.wrapping_add(7919);
        let key = format!("key-{}", n % 800);
        if cache.try_get(&key).is_none() {
            cache.set(&key, n);
        }
        if n % 13 == 0 {
            cache.remove(&key);
        }
    }
}
