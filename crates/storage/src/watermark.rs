//! Watermark persistence using SQLite with sqlx.
//!
//! One row per Zephyr in `zephyrs` and one row per Zephyr and granularity in
//! `zephyr_watermarks`, so ingest resumes where it left off after a restart.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use zephyr_common::{
    Granularity, GranularityWatermark, IngestError, IngestResult, LastKnownLocation,
    WatermarkState,
};

/// Persisted per-sensor ingest state.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Load a sensor's state. Fails with `SensorNotFound` if it was never saved.
    async fn load(&self, sensor_id: u32) -> IngestResult<WatermarkState>;

    /// Insert or replace a sensor's state, returning what is now stored.
    async fn save(&self, state: &WatermarkState) -> IngestResult<WatermarkState>;

    /// Flag every listed sensor whose id is not in `listed` as no longer
    /// listed. Returns how many records changed.
    async fn mark_unlisted(&self, listed: &[u32]) -> IngestResult<u64>;

    /// Every stored state, ordered by sensor id.
    async fn list(&self) -> IngestResult<Vec<WatermarkState>>;
}

const CREATE_ZEPHYRS: &str = r#"
    CREATE TABLE IF NOT EXISTS zephyrs (
        z_number INTEGER PRIMARY KEY,
        still_listed BOOLEAN NOT NULL DEFAULT 1,
        location_lat REAL,
        location_lng REAL,
        location_description TEXT,
        location_since TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
"#;

const CREATE_WATERMARKS: &str = r#"
    CREATE TABLE IF NOT EXISTS zephyr_watermarks (
        z_number INTEGER NOT NULL REFERENCES zephyrs(z_number),
        granularity TEXT NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT 0,
        latest TEXT,
        PRIMARY KEY (z_number, granularity)
    )
"#;

type ZephyrRow = (
    i64,
    bool,
    Option<f64>,
    Option<f64>,
    Option<String>,
    Option<String>,
);

/// SQLite-backed [`WatermarkStore`].
pub struct SqliteWatermarkStore {
    pool: SqlitePool,
}

impl SqliteWatermarkStore {
    /// Open or create the state database at the given path.
    pub async fn open(path: &Path) -> IngestResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                IngestError::configuration("Failed to create watermark database directory")
                    .with_detail(e)
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                IngestError::configuration("Failed to open SQLite database").with_detail(e)
            })?;

        let store = Self { pool };
        store.migrate().await?;

        info!(path = %path.display(), "Watermark database ready");
        Ok(store)
    }

    /// In-memory database for tests and dry runs.
    pub async fn open_memory() -> IngestResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        // A second connection would see a different in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                IngestError::configuration("Failed to open SQLite database").with_detail(e)
            })?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> IngestResult<()> {
        for statement in [CREATE_ZEPHYRS, CREATE_WATERMARKS] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    IngestError::configuration("Failed to create watermark tables").with_detail(e)
                })?;
        }
        Ok(())
    }

    async fn load_watermarks(
        &self,
        sensor_id: u32,
    ) -> IngestResult<BTreeMap<Granularity, GranularityWatermark>> {
        let rows: Vec<(String, bool, Option<String>)> = sqlx::query_as(
            "SELECT granularity, enabled, latest FROM zephyr_watermarks WHERE z_number = ?",
        )
        .bind(i64::from(sensor_id))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IngestError::watermark_load("Failed to get Zephyr.").with_detail(e))?;

        let mut granularities: BTreeMap<Granularity, GranularityWatermark> = Granularity::ALL
            .iter()
            .map(|g| (*g, GranularityWatermark::default()))
            .collect();

        for (name, enabled, latest) in rows {
            let Ok(granularity) = name.parse::<Granularity>() else {
                warn!(sensor_id, granularity = %name, "Ignoring unknown granularity row");
                continue;
            };
            let latest = latest.as_deref().map(parse_stored_time).transpose()?;
            granularities.insert(granularity, GranularityWatermark { enabled, latest });
        }

        Ok(granularities)
    }

    fn state_from_row(
        row: ZephyrRow,
        granularities: BTreeMap<Granularity, GranularityWatermark>,
    ) -> IngestResult<WatermarkState> {
        let (z_number, still_listed, lat, lng, description, since) = row;

        let last_known_location = match (lat, lng) {
            (Some(lat), Some(lng)) => Some(LastKnownLocation {
                lat,
                lng,
                description,
                since: since.as_deref().map(parse_stored_time).transpose()?,
            }),
            _ => None,
        };

        Ok(WatermarkState {
            sensor_id: stored_sensor_id(z_number)?,
            still_listed,
            last_known_location,
            granularities,
        })
    }
}

fn stored_sensor_id(z_number: i64) -> IngestResult<u32> {
    u32::try_from(z_number).map_err(|_| {
        IngestError::watermark_load("Failed to get Zephyr.")
            .with_detail(format!("stored z_number {} is out of range", z_number))
    })
}

fn parse_stored_time(s: &str) -> IngestResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            IngestError::watermark_load("Failed to get Zephyr.")
                .with_detail(format!("stored timestamp '{}': {}", s, e))
        })
}

#[async_trait]
impl WatermarkStore for SqliteWatermarkStore {
    async fn load(&self, sensor_id: u32) -> IngestResult<WatermarkState> {
        let row: Option<ZephyrRow> = sqlx::query_as(
            r#"
            SELECT z_number, still_listed, location_lat, location_lng,
                   location_description, location_since
            FROM zephyrs
            WHERE z_number = ?
            "#,
        )
        .bind(i64::from(sensor_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IngestError::watermark_load("Failed to get Zephyr.").with_detail(e))?;

        let row = row.ok_or_else(|| IngestError::sensor_not_found(sensor_id))?;
        let granularities = self.load_watermarks(sensor_id).await?;
        Self::state_from_row(row, granularities)
    }

    async fn save(&self, state: &WatermarkState) -> IngestResult<WatermarkState> {
        let persist_err =
            |e: sqlx::Error| IngestError::watermark_persist("Failed to upsert zephyr").with_detail(e);
        let now = Utc::now().to_rfc3339();
        let location = state.last_known_location.as_ref();

        let mut tx = self.pool.begin().await.map_err(persist_err)?;

        sqlx::query(
            r#"
            INSERT INTO zephyrs (z_number, still_listed, location_lat, location_lng,
                                 location_description, location_since, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(z_number) DO UPDATE SET
                still_listed = excluded.still_listed,
                location_lat = excluded.location_lat,
                location_lng = excluded.location_lng,
                location_description = excluded.location_description,
                location_since = excluded.location_since,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(i64::from(state.sensor_id))
        .bind(state.still_listed)
        .bind(location.map(|l| l.lat))
        .bind(location.map(|l| l.lng))
        .bind(location.and_then(|l| l.description.clone()))
        .bind(location.and_then(|l| l.since).map(|t| t.to_rfc3339()))
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(persist_err)?;

        for (granularity, watermark) in &state.granularities {
            sqlx::query(
                r#"
                INSERT INTO zephyr_watermarks (z_number, granularity, enabled, latest)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(z_number, granularity) DO UPDATE SET
                    enabled = excluded.enabled,
                    latest = excluded.latest
                "#,
            )
            .bind(i64::from(state.sensor_id))
            .bind(granularity.as_str())
            .bind(watermark.enabled)
            .bind(watermark.latest.map(|t| t.to_rfc3339()))
            .execute(&mut *tx)
            .await
            .map_err(persist_err)?;
        }

        tx.commit().await.map_err(persist_err)?;
        debug!(sensor_id = state.sensor_id, "Saved watermark state");

        self.load(state.sensor_id).await.map_err(|e| {
            IngestError::watermark_persist("Failed to upsert zephyr").with_detail(e)
        })
    }

    async fn mark_unlisted(&self, listed: &[u32]) -> IngestResult<u64> {
        let now = Utc::now().to_rfc3339();
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE zephyrs SET still_listed = 0, updated_at = ");
        query.push_bind(now);
        query.push(" WHERE still_listed = 1");

        if !listed.is_empty() {
            query.push(" AND z_number NOT IN (");
            let mut ids = query.separated(", ");
            for id in listed {
                ids.push_bind(i64::from(*id));
            }
            ids.push_unseparated(")");
        }

        let result = query.build().execute(&self.pool).await.map_err(|e| {
            IngestError::watermark_persist(
                "Failed to update the zephyrs that are no longer in the latest list",
            )
            .with_detail(e)
        })?;

        Ok(result.rows_affected())
    }

    async fn list(&self) -> IngestResult<Vec<WatermarkState>> {
        let rows: Vec<ZephyrRow> = sqlx::query_as(
            r#"
            SELECT z_number, still_listed, location_lat, location_lng,
                   location_description, location_since
            FROM zephyrs
            ORDER BY z_number ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IngestError::watermark_load("Failed to list Zephyrs.").with_detail(e))?;

        let mut states = Vec::with_capacity(rows.len());
        for row in rows {
            let sensor_id = stored_sensor_id(row.0)?;
            let granularities = self.load_watermarks(sensor_id).await?;
            states.push(Self::state_from_row(row, granularities)?);
        }
        Ok(states)
    }
}

/// [`WatermarkStore`] held in memory. Used by tests and `--dry-run`.
#[derive(Default)]
pub struct MemoryWatermarkStore {
    states: RwLock<BTreeMap<u32, WatermarkState>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_states(states: impl IntoIterator<Item = WatermarkState>) -> Self {
        Self {
            states: RwLock::new(states.into_iter().map(|s| (s.sensor_id, s)).collect()),
        }
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn load(&self, sensor_id: u32) -> IngestResult<WatermarkState> {
        self.states
            .read()
            .await
            .get(&sensor_id)
            .cloned()
            .ok_or_else(|| IngestError::sensor_not_found(sensor_id))
    }

    async fn save(&self, state: &WatermarkState) -> IngestResult<WatermarkState> {
        self.states
            .write()
            .await
            .insert(state.sensor_id, state.clone());
        Ok(state.clone())
    }

    async fn mark_unlisted(&self, listed: &[u32]) -> IngestResult<u64> {
        let mut states = self.states.write().await;
        let mut changed = 0;
        for state in states.values_mut() {
            if state.still_listed && !listed.contains(&state.sensor_id) {
                state.still_listed = false;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn list(&self) -> IngestResult<Vec<WatermarkState>> {
        Ok(self.states.read().await.values().cloned().collect())
    }
}
