//! Driftwatch main binary.
//!
//! Wires the components together:
//! - Storage: sled checkpoint store + record log, JSON config store
//! - Detection: the adaptive CUSUM detector manager
//! - Alerting: webhook (or log-only) alert pushes
//! - API: axum REST server
//!
//! Plus the background tasks: periodic state checkpoints and record-log
//! pruning, with a final checkpoint on shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use driftwatch_alerting::prelude::*;
use driftwatch_api::prelude::*;
use driftwatch_core::config::ServiceConfig;
use driftwatch_core::store::{ConfigStore, RecordLog, StateStore};
use driftwatch_detection::manager::DetectorManager;
use driftwatch_storage::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Driftwatch CLI arguments
#[derive(Debug, Parser)]
#[clap(name = "driftwatch", version, about = "Adaptive CUSUM drift detection for industrial SPC")]
struct Cli {
    /// Configuration file path
    #[clap(short, long, default_value = "config/driftwatch.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[clap(long, env = "DRIFTWATCH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[clap(long, env = "DRIFTWATCH_LOG_JSON")]
    log_json: bool,

    /// Run with in-memory stores (nothing persisted)
    #[clap(long)]
    ephemeral: bool,

    /// Validate configuration and exit
    #[clap(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    info!("Starting Driftwatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Loading configuration from: {:?}", cli.config);

    let config = if cli.config.exists() {
        ServiceConfig::from_file(&cli.config).context("Failed to load configuration")?
    } else {
        warn!("Config file not found, using built-in defaults");
        ServiceConfig::default()
    };

    if cli.dry_run {
        info!("Dry run mode - configuration validated, exiting");
        return Ok(());
    }

    let service = Driftwatch::new(config, cli.ephemeral).context("Failed to initialize")?;
    service.run().await
}

/// Initialize logging based on CLI arguments
fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .context("Invalid log level")?;

    if cli.log_json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env().add_directive(log_level.into()),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env().add_directive(log_level.into()),
            )
            .init();
    }

    info!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Main orchestrator
struct Driftwatch {
    config: ServiceConfig,
    manager: Arc<DetectorManager>,
    record_log: Arc<dyn RecordLog>,
    notifier: Arc<dyn Notifier>,
    sled: Option<Arc<SledStore>>,
}

impl Driftwatch {
    /// Build all components from the service configuration
    fn new(config: ServiceConfig, ephemeral: bool) -> Result<Self> {
        let (config_store, state_store, record_log, sled): (
            Arc<dyn ConfigStore>,
            Arc<dyn StateStore>,
            Arc<dyn RecordLog>,
            Option<Arc<SledStore>>,
        ) = if ephemeral {
            info!("Running with in-memory stores");
            (
                Arc::new(MemoryConfigStore::new()),
                Arc::new(MemoryStateStore::new()),
                Arc::new(MemoryRecordLog::new()),
                None,
            )
        } else {
            info!("Opening sled store at {:?}", config.storage.data_dir);
            let sled = Arc::new(
                SledStore::open(&config.storage.data_dir).context("Failed to open sled store")?,
            );
            let json =
                Arc::new(JsonConfigStore::open(&config.storage.config_path)
                    .context("Failed to open config store")?);
            (
                json,
                Arc::clone(&sled) as Arc<dyn StateStore>,
                Arc::clone(&sled) as Arc<dyn RecordLog>,
                Some(sled),
            )
        };

        // Persisted global defaults win over the config file so operator
        // changes survive restarts.
        let defaults = match config_store.get_global() {
            Ok(Some(persisted)) => persisted,
            Ok(None) => config.detector_defaults.clone(),
            Err(e) => {
                warn!(error = %e, "Could not read persisted defaults, using config file");
                config.detector_defaults.clone()
            }
        };

        let manager = Arc::new(DetectorManager::new(
            config_store,
            state_store,
            Arc::clone(&record_log),
            defaults,
        ));

        let notifier: Arc<dyn Notifier> = match &config.alerting.webhook_url {
            Some(url) if !url.is_empty() => {
                let webhook_config = WebhookConfig {
                    url: url.clone(),
                    timeout_secs: config.alerting.webhook_timeout_secs.unwrap_or(10),
                    max_retries: config.alerting.webhook_max_retries.unwrap_or(3),
                    ..Default::default()
                };
                Arc::new(WebhookNotifier::new(webhook_config).context("Bad webhook config")?)
            }
            _ => Arc::new(LogNotifier),
        };

        Ok(Self {
            config,
            manager,
            record_log,
            notifier,
            sled,
        })
    }

    /// Run the service until shutdown
    async fn run(self) -> Result<()> {
        // Restore state and pre-warm detectors before accepting traffic.
        match self.manager.load_all_states() {
            Ok(count) => info!("Startup: loaded {} detector states", count),
            Err(e) => error!("Startup state load failed: {}", e),
        }
        match self.manager.prewarm() {
            Ok(count) => info!("Startup: {} detectors active", count),
            Err(e) => error!("Startup pre-warm failed: {}", e),
        }

        self.spawn_checkpoint_task();
        self.spawn_prune_task();

        let api_config = ApiConfig {
            bind_addr: self
                .config
                .bind_addr()
                .parse()
                .context("Invalid server bind address")?,
            timeout_secs: self.config.server.request_timeout_secs,
            metrics_path: self.config.observability.metrics_path.clone(),
            ..Default::default()
        };

        let sled = self.sled.clone();
        let health_state = Arc::new(HealthState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&self.manager),
            Arc::new(move || match &sled {
                Some(store) => store.flush().map_err(|e| e.to_string()),
                None => Ok(()),
            }),
            Arc::clone(&self.record_log),
        ));
        let engine_state = Arc::new(EngineState::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.notifier),
        ));
        let query_state = Arc::new(QueryState::new(Arc::clone(&self.record_log)));
        let metrics_state = Arc::new(MetricsState::new());

        let server = ApiServer::new(
            api_config,
            health_state,
            engine_state,
            query_state,
            metrics_state,
        );

        let manager = Arc::clone(&self.manager);
        server
            .serve(async {
                shutdown_signal().await;
                info!("Shutdown signal received");
            })
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        // Final checkpoint; running detector steps have completed because
        // the server has stopped accepting requests.
        info!("Shutdown: saving all detector states");
        match manager.save_all_states() {
            Ok(count) => info!("Shutdown: saved {} detector states", count),
            Err(e) => error!("Shutdown checkpoint failed: {}", e),
        }
        if let Some(sled) = &self.sled {
            if let Err(e) = sled.flush() {
                error!("Final flush failed: {}", e);
            }
        }

        Ok(())
    }

    fn spawn_checkpoint_task(&self) {
        let manager = Arc::clone(&self.manager);
        let interval_hours = self.config.storage.checkpoint_interval_hours;
        tokio::spawn(async move {
            let period = Duration::from_secs(interval_hours * 3600);
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // first tick is immediate; skip it
            loop {
                ticker.tick().await;
                match manager.save_all_states() {
                    Ok(count) => info!("Periodic checkpoint: saved {} states", count),
                    Err(e) => error!("Periodic checkpoint failed: {}", e),
                }
            }
        });
    }

    fn spawn_prune_task(&self) {
        let record_log = Arc::clone(&self.record_log);
        let retention_days = self.config.storage.record_retention_days;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(24 * 3600));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days);
                match record_log.prune_before(cutoff) {
                    Ok(removed) => {
                        if removed > 0 {
                            info!("Pruned {} detection records", removed);
                        }
                        metrics::gauge!(
                            driftwatch_core::metric_names::gauges::RECORDS_PRUNED
                        )
                        .set(removed as f64);
                    }
                    Err(e) => error!("Record pruning failed: {}", e),
                }
            }
        });
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
