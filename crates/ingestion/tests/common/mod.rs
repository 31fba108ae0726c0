//! Fake collaborators for orchestrator tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use earthsense::VendorApi;
use ingestion::{Clock, IngestOrchestrator, OrchestratorOptions};
use storage::{EventPublisher, MemoryPublisher, MemoryWatermarkStore, PublishAck, WatermarkStore};
use zephyr_common::{
    CanonicalObservation, FetchWindow, Granularity, IngestError, IngestResult, RosterEntry,
    WatermarkState,
};

pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// Fixed "now" just after the 15-minute fixture's last timestep.
pub fn now() -> DateTime<Utc> {
    ts("2020-08-27T13:05:00Z")
}

pub fn fixed_clock() -> Clock {
    Arc::new(now)
}

pub fn listed(id: u32) -> RosterEntry {
    RosterEntry {
        id,
        last_known_location: None,
    }
}

#[derive(Debug, Clone)]
pub struct FetchCall {
    pub sensor_id: u32,
    pub window: FetchWindow,
    pub granularity: Granularity,
}

/// Scripted vendor API.
#[derive(Default)]
pub struct FakeVendor {
    pub roster: Mutex<Option<IngestResult<Vec<RosterEntry>>>>,
    pub responses: Mutex<HashMap<(u32, Granularity), IngestResult<Value>>>,
    pub calls: Mutex<Vec<FetchCall>>,
    pub delay: Mutex<Option<Duration>>,
    /// Cancelled on the first fetch, to simulate a shutdown mid-cycle.
    pub cancel_on_fetch: Mutex<Option<CancellationToken>>,
}

impl FakeVendor {
    pub fn with_roster(entries: Vec<RosterEntry>) -> Self {
        let vendor = Self::default();
        *vendor.roster.lock().unwrap() = Some(Ok(entries));
        vendor
    }

    pub fn respond(self, sensor_id: u32, granularity: Granularity, response: IngestResult<Value>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((sensor_id, granularity), response);
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VendorApi for FakeVendor {
    async fn list_sensors(&self) -> IngestResult<Vec<RosterEntry>> {
        self.roster
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch(
        &self,
        sensor_id: u32,
        window: &FetchWindow,
        granularity: Granularity,
    ) -> IngestResult<Value> {
        self.calls.lock().unwrap().push(FetchCall {
            sensor_id,
            window: *window,
            granularity,
        });
        if let Some(token) = self.cancel_on_fetch.lock().unwrap().as_ref() {
            token.cancel();
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .lock()
            .unwrap()
            .get(&(sensor_id, granularity))
            .cloned()
            .unwrap_or_else(|| Err(IngestError::vendor_fetch("no scripted response")))
    }
}

/// Memory store whose operations can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryWatermarkStore,
    pub fail_load: AtomicBool,
    pub fail_save: AtomicBool,
    pub fail_mark: AtomicBool,
    pub saves: AtomicUsize,
}

impl FlakyStore {
    pub fn with_states(states: impl IntoIterator<Item = WatermarkState>) -> Self {
        Self {
            inner: MemoryWatermarkStore::with_states(states),
            ..Self::default()
        }
    }
}

#[async_trait]
impl WatermarkStore for FlakyStore {
    async fn load(&self, sensor_id: u32) -> IngestResult<WatermarkState> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(IngestError::watermark_load("Failed to get Zephyr.").with_detail("connection reset"));
        }
        self.inner.load(sensor_id).await
    }

    async fn save(&self, state: &WatermarkState) -> IngestResult<WatermarkState> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(IngestError::watermark_persist("Failed to upsert zephyr"));
        }
        self.inner.save(state).await
    }

    async fn mark_unlisted(&self, listed: &[u32]) -> IngestResult<u64> {
        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(IngestError::watermark_persist(
                "Failed to update the zephyrs that are no longer in the latest list",
            ));
        }
        self.inner.mark_unlisted(listed).await
    }

    async fn list(&self) -> IngestResult<Vec<WatermarkState>> {
        self.inner.list().await
    }
}

/// Publisher that rejects the `fail_at`-th event (0-based) and everything after.
pub struct FlakyPublisher {
    pub inner: MemoryPublisher,
    pub fail_at: usize,
    attempts: AtomicUsize,
}

impl FlakyPublisher {
    pub fn failing_at(fail_at: usize) -> Self {
        Self {
            inner: MemoryPublisher::new(),
            fail_at,
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EventPublisher for FlakyPublisher {
    async fn publish(&self, topic: &str, event: &CanonicalObservation) -> IngestResult<PublishAck> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt >= self.fail_at {
            return Err(IngestError::publish("bus unavailable"));
        }
        self.inner.publish(topic, event).await
    }
}

pub fn orchestrator(
    vendor: Arc<dyn VendorApi>,
    store: Arc<dyn WatermarkStore>,
    bus: Arc<dyn EventPublisher>,
) -> IngestOrchestrator {
    IngestOrchestrator::new(vendor, store, bus)
        .with_clock(fixed_clock())
        .with_options(OrchestratorOptions {
            fetch_timeout: Duration::from_secs(5),
            ..OrchestratorOptions::default()
        })
}
