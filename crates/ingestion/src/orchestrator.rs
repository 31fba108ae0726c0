//! The ingest cycle: roster, watermarks, fetch, convert, publish, persist.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use earthsense::{reformat_response, VendorApi};
use storage::{EventPublisher, WatermarkStore};
use zephyr_common::{
    ErrorKind, Granularity, IngestError, IngestResult, RosterEntry, WatermarkState,
    OBSERVATION_TOPIC,
};

use crate::convert::ObservationConverter;
use crate::planner::{next_watermark, plan_window, WatermarkUpdate};

/// Source of "now" for window planning.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Step of a sensor's pipeline a failure happened in.
///
/// Roster and unlisted-flagging failures abort the cycle instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    LoadWatermark,
    Fetch,
    Reformat,
    Convert,
    Publish,
    PersistWatermark,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::LoadWatermark => "load_watermark",
            Phase::Fetch => "fetch",
            Phase::Reformat => "reformat",
            Phase::Convert => "convert",
            Phase::Publish => "publish",
            Phase::PersistWatermark => "persist_watermark",
        }
    }
}

/// A failure caught during a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleFailure {
    pub sensor_id: Option<u32>,
    pub granularity: Option<Granularity>,
    pub phase: Phase,
    pub error: IngestError,
}

/// What a cycle did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sensors_listed: usize,
    pub sensors_processed: usize,
    pub sensors_unlisted: u64,
    pub observations_published: usize,
    /// True if a shutdown stopped the cycle before every sensor was processed.
    pub cancelled: bool,
    pub failures: Vec<CycleFailure>,
}

impl CycleSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Tunables for [`IngestOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub topic: String,
    /// Deadline for a single vendor fetch.
    pub fetch_timeout: Duration,
    /// Sensors processed at once. Each sensor is always sequential.
    pub max_concurrent_sensors: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            topic: OBSERVATION_TOPIC.to_string(),
            fetch_timeout: Duration::from_secs(120),
            max_concurrent_sensors: 1,
        }
    }
}

#[derive(Debug, Default)]
struct SensorOutcome {
    processed: bool,
    /// Not started because of a shutdown.
    skipped: bool,
    published: usize,
    failures: Vec<CycleFailure>,
}

#[derive(Debug)]
struct GranularityOutcome {
    published: usize,
    update: WatermarkUpdate,
    failure: Option<CycleFailure>,
}

/// Runs ingest cycles against the vendor, the watermark store and the bus.
pub struct IngestOrchestrator {
    vendor: Arc<dyn VendorApi>,
    store: Arc<dyn WatermarkStore>,
    bus: Arc<dyn EventPublisher>,
    converter: ObservationConverter,
    clock: Clock,
    options: OrchestratorOptions,
}

impl IngestOrchestrator {
    pub fn new(
        vendor: Arc<dyn VendorApi>,
        store: Arc<dyn WatermarkStore>,
        bus: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            vendor,
            store,
            bus,
            converter: ObservationConverter::default(),
            clock: Arc::new(Utc::now),
            options: OrchestratorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_converter(mut self, converter: ObservationConverter) -> Self {
        self.converter = converter;
        self
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Run one cycle over every sensor in the roster.
    ///
    /// Fails only if the roster cannot be fetched or unlisted sensors cannot
    /// be flagged; everything else is recorded in the summary.
    pub async fn run_cycle(&self) -> IngestResult<CycleSummary> {
        self.run_cycle_with_shutdown(&CancellationToken::new()).await
    }

    /// Like [`run_cycle`](Self::run_cycle), but starts no new sensor once
    /// `shutdown` is cancelled.
    pub async fn run_cycle_with_shutdown(
        &self,
        shutdown: &CancellationToken,
    ) -> IngestResult<CycleSummary> {
        let cycle_id = Uuid::new_v4();
        self.cycle(cycle_id, None, shutdown)
            .instrument(info_span!("ingest_cycle", %cycle_id))
            .await
    }

    /// Run the pipeline for a single sensor from the roster.
    ///
    /// Sensors missing from the roster fail with `SensorNotFound`. Other
    /// sensors are not flagged as unlisted.
    pub async fn run_cycle_for(&self, sensor_id: u32) -> IngestResult<CycleSummary> {
        self.run_cycle_for_with_shutdown(sensor_id, &CancellationToken::new())
            .await
    }

    /// Like [`run_cycle_for`](Self::run_cycle_for), but skips the sensor if
    /// `shutdown` is cancelled before it starts.
    pub async fn run_cycle_for_with_shutdown(
        &self,
        sensor_id: u32,
        shutdown: &CancellationToken,
    ) -> IngestResult<CycleSummary> {
        let cycle_id = Uuid::new_v4();
        self.cycle(cycle_id, Some(sensor_id), shutdown)
            .instrument(info_span!("ingest_cycle", %cycle_id, sensor_id))
            .await
    }

    async fn cycle(
        &self,
        cycle_id: Uuid,
        only: Option<u32>,
        shutdown: &CancellationToken,
    ) -> IngestResult<CycleSummary> {
        let started_at = (self.clock)();

        let roster = self.vendor.list_sensors().await.map_err(|e| {
            error!(error = %e, detail = ?e.detail, "Failed to get Zephyr list, aborting cycle");
            e
        })?;
        let listed: Vec<u32> = roster.iter().map(|e| e.id).collect();
        info!(count = listed.len(), "Zephyrs listed by Earthsense");

        let (sensors_unlisted, entries) = match only {
            None => {
                let unlisted = self.store.mark_unlisted(&listed).await.map_err(|e| {
                    error!(error = %e, detail = ?e.detail, "Failed to flag unlisted Zephyrs, aborting cycle");
                    e
                })?;
                if unlisted > 0 {
                    info!(count = unlisted, "Zephyrs no longer listed by Earthsense");
                }
                (unlisted, roster)
            }
            Some(sensor_id) => {
                let entry = roster
                    .into_iter()
                    .find(|e| e.id == sensor_id)
                    .ok_or_else(|| IngestError::sensor_not_found(sensor_id))?;
                (0, vec![entry])
            }
        };
        let sensors_listed = listed.len();

        let outcomes: Vec<SensorOutcome> = stream::iter(entries)
            .map(|entry| async move {
                if shutdown.is_cancelled() {
                    return SensorOutcome {
                        skipped: true,
                        ..SensorOutcome::default()
                    };
                }
                let sensor_id = entry.id;
                self.process_sensor(entry)
                    .instrument(info_span!("sensor", sensor_id))
                    .await
            })
            .buffer_unordered(self.options.max_concurrent_sensors.max(1))
            .collect()
            .await;

        let mut summary = CycleSummary {
            cycle_id,
            started_at,
            finished_at: started_at,
            sensors_listed,
            sensors_processed: 0,
            sensors_unlisted,
            observations_published: 0,
            cancelled: false,
            failures: Vec::new(),
        };
        for outcome in outcomes {
            summary.cancelled |= outcome.skipped;
            summary.sensors_processed += usize::from(outcome.processed);
            summary.observations_published += outcome.published;
            summary.failures.extend(outcome.failures);
        }
        summary.finished_at = (self.clock)();

        info!(
            sensors = summary.sensors_processed,
            observations = summary.observations_published,
            failures = summary.failures.len(),
            cancelled = summary.cancelled,
            "Ingest cycle complete"
        );
        Ok(summary)
    }

    async fn process_sensor(&self, entry: RosterEntry) -> SensorOutcome {
        let sensor_id = entry.id;
        let mut outcome = SensorOutcome::default();

        let mut state = match self.store.load(sensor_id).await {
            Ok(state) => state,
            Err(e) if e.is(ErrorKind::SensorNotFound) => {
                info!("Zephyr not on record, registering");
                WatermarkState::new_sensor(sensor_id)
            }
            Err(e) => {
                error!(error = %e, detail = ?e.detail, "Failed to load watermark, skipping Zephyr");
                outcome.failures.push(CycleFailure {
                    sensor_id: Some(sensor_id),
                    granularity: None,
                    phase: Phase::LoadWatermark,
                    error: e,
                });
                return outcome;
            }
        };
        state.apply_roster(&entry);

        for granularity in state.enabled_granularities() {
            let result = self
                .ingest_granularity(sensor_id, granularity, state.latest(granularity))
                .instrument(info_span!("granularity", %granularity))
                .await;

            outcome.published += result.published;
            result.update.apply(&mut state, granularity);
            outcome.failures.extend(result.failure);
        }

        if let Err(e) = self.store.save(&state).await {
            error!(error = %e, detail = ?e.detail, "Failed to upsert Zephyr");
            outcome.failures.push(CycleFailure {
                sensor_id: Some(sensor_id),
                granularity: None,
                phase: Phase::PersistWatermark,
                error: e,
            });
        }

        outcome.processed = true;
        outcome
    }

    async fn ingest_granularity(
        &self,
        sensor_id: u32,
        granularity: Granularity,
        watermark: Option<DateTime<Utc>>,
    ) -> GranularityOutcome {
        let failed = |phase: Phase, error: IngestError, published: usize| {
            warn!(?phase, error = %error, detail = ?error.detail, "Granularity cycle failed");
            GranularityOutcome {
                published,
                update: WatermarkUpdate::Unchanged,
                failure: Some(CycleFailure {
                    sensor_id: Some(sensor_id),
                    granularity: Some(granularity),
                    phase,
                    error,
                }),
            }
        };

        let window = plan_window(granularity, watermark, (self.clock)());
        if window.start >= window.end {
            debug!("Empty fetch window, nothing to do");
            return GranularityOutcome {
                published: 0,
                update: WatermarkUpdate::Unchanged,
                failure: None,
            };
        }
        debug!(start = %window.start, end = %window.end, "Planned fetch window");

        let fetched = tokio::time::timeout(
            self.options.fetch_timeout,
            self.vendor.fetch(sensor_id, &window, granularity),
        )
        .await;
        let body = match fetched {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => return failed(Phase::Fetch, e, 0),
            Err(_) => {
                let e = IngestError::vendor_fetch(format!(
                    "Zephyr data request timed out after {}s",
                    self.options.fetch_timeout.as_secs()
                ));
                return failed(Phase::Fetch, e, 0);
            }
        };

        let readings = match reformat_response(body, granularity) {
            Ok(readings) => readings,
            Err(e) => return failed(Phase::Reformat, e, 0),
        };
        if let Some(other) = readings.iter().find(|r| r.sensor_id != sensor_id) {
            let e = IngestError::invalid_payload(format!(
                "Requested Zephyr {} but the response is for Zephyr {}",
                sensor_id, other.sensor_id
            ));
            return failed(Phase::Reformat, e, 0);
        }

        let observations = match self.converter.convert(&readings, granularity) {
            Ok(observations) => observations,
            Err(e) => return failed(Phase::Convert, e, 0),
        };

        for (published, observation) in observations.iter().enumerate() {
            if let Err(e) = self.bus.publish(&self.options.topic, observation).await {
                return failed(Phase::Publish, e, published);
            }
        }

        let update = next_watermark(&observations, watermark);
        info!(
            readings = readings.len(),
            observations = observations.len(),
            ?update,
            "Published observations"
        );

        GranularityOutcome {
            published: observations.len(),
            update,
            failure: None,
        }
    }
}
