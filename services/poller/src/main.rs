//! Earthsense Zephyr poller service.
//!
//! Polls the Earthsense API for every Zephyr on the account and publishes
//! canonical observations with:
//! - Per-sensor, per-granularity watermarks persisted in SQLite
//! - Events appended to a Redis stream
//! - Graceful shutdown between sensors
//! - HTTP status API and Prometheus metrics

mod config;
mod scheduler;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use earthsense::EarthsenseClient;
use ingestion::IngestOrchestrator;
use storage::{
    EventPublisher, MemoryPublisher, MemoryWatermarkStore, RedisStreamPublisher,
    SqliteWatermarkStore, WatermarkStore,
};

use config::PollerConfig;
use scheduler::Scheduler;
use server::ServerState;

#[derive(Parser, Debug)]
#[command(name = "zephyr-poller")]
#[command(about = "Earthsense Zephyr air-quality poller")]
struct Args {
    /// Run one cycle and exit (vs continuous polling)
    #[arg(long)]
    once: bool,

    /// Only process this Zephyr (implies --once)
    #[arg(short, long)]
    sensor: Option<u32>,

    /// Keep watermarks and events in memory instead of SQLite and Redis
    #[arg(long)]
    dry_run: bool,

    /// Configuration file
    #[arg(long, env = "POLLER_CONFIG", default_value = "config/poller.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Port for status HTTP server
    #[arg(long, env = "STATUS_PORT", default_value = "8082")]
    status_port: u16,

    /// Disable status HTTP server
    #[arg(long)]
    no_status_server: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!(dry_run = args.dry_run, "Starting Zephyr poller");

    let config = PollerConfig::load(&args.config)?.with_env_credentials();
    let vendor = Arc::new(EarthsenseClient::new(config.earthsense_config()?)?);

    let (store, bus): (Arc<dyn WatermarkStore>, Arc<dyn EventPublisher>) = if args.dry_run {
        (
            Arc::new(MemoryWatermarkStore::new()),
            Arc::new(MemoryPublisher::new()),
        )
    } else {
        let store = SqliteWatermarkStore::open(&config.storage.database_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open watermark store at {}",
                    config.storage.database_path.display()
                )
            })?;
        let mut bus = RedisStreamPublisher::connect(&config.storage.redis_url)
            .await
            .context("Failed to connect to the event bus")?;
        if let Some(max_len) = config.storage.stream_max_len {
            bus = bus.with_max_len(max_len);
        }
        (Arc::new(store), Arc::new(bus))
    };

    let orchestrator = IngestOrchestrator::new(vendor, store.clone(), bus)
        .with_options(config.orchestrator_options());
    let scheduler = Scheduler::new(Arc::new(orchestrator), config.poll_interval());

    let once = args.once || args.sensor.is_some();

    // Start status server (unless disabled or in --once mode)
    if !args.no_status_server && !once {
        let prometheus = match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Failed to install Prometheus recorder");
                None
            }
        };
        let server_state = Arc::new(ServerState {
            status: scheduler.status(),
            store: store.clone(),
            prometheus,
            started_at: Utc::now(),
            dry_run: args.dry_run,
        });
        let status_port = args.status_port;
        tokio::spawn(async move {
            if let Err(e) = server::run_server(server_state, status_port).await {
                error!(error = %e, "Status server failed");
            }
        });
    }

    // Handle Ctrl+C
    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_signal.cancel();
    });

    if once {
        info!(sensor = ?args.sensor, "Running single ingest cycle");

        let summary = scheduler.run_once(args.sensor, &shutdown).await?;
        if !summary.failures.is_empty() {
            for failure in &summary.failures {
                warn!(
                    sensor_id = ?failure.sensor_id,
                    granularity = ?failure.granularity,
                    phase = failure.phase.as_str(),
                    error = %failure.error,
                    "Ingest failure"
                );
            }
            anyhow::bail!("{} ingest failures", summary.failures.len());
        }
    } else {
        scheduler.run_forever(shutdown).await;
    }

    let status = scheduler.status();
    let status = status.read().await;
    info!(
        cycles = status.cycles_completed,
        aborted = status.cycles_aborted,
        observations = status.observations_published,
        "Poller session complete"
    );

    Ok(())
}
