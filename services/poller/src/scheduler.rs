//! Poll loop around the ingest orchestrator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ingestion::{CycleSummary, IngestOrchestrator};
use zephyr_common::{IngestError, IngestResult};

/// What the status API reports about past cycles.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollerStatus {
    pub cycles_completed: u64,
    /// Cycles aborted before any sensor was processed.
    pub cycles_aborted: u64,
    pub observations_published: u64,
    pub last_summary: Option<CycleSummary>,
    pub last_error: Option<LastError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastError {
    pub at: DateTime<Utc>,
    pub error: IngestError,
}

pub struct Scheduler {
    orchestrator: Arc<IngestOrchestrator>,
    poll_interval: Duration,
    status: Arc<RwLock<PollerStatus>>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<IngestOrchestrator>, poll_interval: Duration) -> Self {
        Self {
            orchestrator,
            poll_interval,
            status: Arc::new(RwLock::new(PollerStatus::default())),
        }
    }

    /// Shared handle to the status, for the status server.
    pub fn status(&self) -> Arc<RwLock<PollerStatus>> {
        self.status.clone()
    }

    /// Run a single cycle, for every listed sensor or just `sensor`.
    pub async fn run_once(
        &self,
        sensor: Option<u32>,
        shutdown: &CancellationToken,
    ) -> IngestResult<CycleSummary> {
        let started = Instant::now();
        let result = match sensor {
            Some(sensor_id) => {
                self.orchestrator
                    .run_cycle_for_with_shutdown(sensor_id, shutdown)
                    .await
            }
            None => self.orchestrator.run_cycle_with_shutdown(shutdown).await,
        };
        histogram!("zephyr_cycle_duration_seconds").record(started.elapsed().as_secs_f64());

        let mut status = self.status.write().await;
        match &result {
            Ok(summary) => {
                record_summary(summary);
                status.cycles_completed += 1;
                status.observations_published += summary.observations_published as u64;
                status.last_summary = Some(summary.clone());
            }
            Err(e) => {
                counter!("zephyr_cycles_aborted_total").increment(1);
                status.cycles_aborted += 1;
                status.last_error = Some(LastError {
                    at: Utc::now(),
                    error: e.clone(),
                });
            }
        }

        result
    }

    /// Poll until `shutdown` is cancelled. Aborted cycles are logged and
    /// retried on the next tick.
    pub async fn run_forever(&self, shutdown: CancellationToken) {
        info!(interval_secs = self.poll_interval.as_secs(), "Starting continuous polling");

        loop {
            if let Err(e) = self.run_once(None, &shutdown).await {
                error!(error = %e, detail = ?e.detail, "Ingest cycle aborted");
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutting down scheduler");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

fn record_summary(summary: &CycleSummary) {
    counter!("zephyr_cycles_total").increment(1);
    counter!("zephyr_observations_published_total")
        .increment(summary.observations_published as u64);
    gauge!("zephyr_sensors_listed").set(summary.sensors_listed as f64);
    gauge!("zephyr_sensors_unlisted").set(summary.sensors_unlisted as f64);

    for failure in &summary.failures {
        counter!("zephyr_ingest_failures_total", "phase" => failure.phase.as_str()).increment(1);
    }
    if !summary.failures.is_empty() {
        warn!(failures = summary.failures.len(), "Ingest cycle finished with failures");
    }
}
