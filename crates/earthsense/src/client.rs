//! HTTP access to the Earthsense API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, instrument};

use zephyr_common::{FetchWindow, Granularity, IngestError, IngestResult, RosterEntry};

use crate::roster::{parse_roster, RosterOptions};

pub const DEFAULT_BASE_URL: &str = "https://data.earthsense.co.uk";

/// Slots requested from every Zephyr.
const SLOTS: &str = "AB";

/// The vendor as the ingest pipeline sees it.
#[async_trait]
pub trait VendorApi: Send + Sync {
    /// List the Zephyrs visible to the configured account.
    async fn list_sensors(&self) -> IngestResult<Vec<RosterEntry>>;

    /// Fetch one sensor's data for a window at a granularity, undecoded.
    async fn fetch(
        &self,
        sensor_id: u32,
        window: &FetchWindow,
        granularity: Granularity,
    ) -> IngestResult<Value>;
}

/// Connection settings for [`EarthsenseClient`].
#[derive(Debug, Clone)]
pub struct EarthsenseConfig {
    pub base_url: String,
    pub username: String,
    pub key: String,
    pub request_timeout: Duration,
    /// Averaging path segment per granularity, overriding the defaults.
    pub averaging_options: BTreeMap<Granularity, String>,
    pub roster: RosterOptions,
}

impl EarthsenseConfig {
    pub fn new(username: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            username: username.into(),
            key: key.into(),
            request_timeout: Duration::from_secs(60),
            averaging_options: BTreeMap::new(),
            roster: RosterOptions::default(),
        }
    }

    pub fn averaging_option(&self, granularity: Granularity) -> &str {
        self.averaging_options
            .get(&granularity)
            .map(String::as_str)
            .unwrap_or_else(|| granularity.default_averaging_option())
    }
}

/// reqwest-backed [`VendorApi`]. Requests are made once; retrying is left to
/// the next poll cycle.
pub struct EarthsenseClient {
    client: Client,
    config: EarthsenseConfig,
}

impl EarthsenseClient {
    pub fn new(config: EarthsenseConfig) -> IngestResult<Self> {
        if config.username.is_empty() || config.key.is_empty() {
            return Err(IngestError::configuration(
                "Earthsense username and key must both be set",
            ));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                IngestError::configuration("Failed to create HTTP client").with_detail(e)
            })?;

        Ok(Self { client, config })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    pub fn roster_url(&self) -> String {
        format!(
            "{}/zephyrsForUser/{}/{}",
            self.base(),
            self.config.username,
            self.config.key
        )
    }

    pub fn data_url(&self, sensor_id: u32, window: &FetchWindow, granularity: Granularity) -> String {
        let (start, end) = window.vendor_dates();
        format!(
            "{}/dataForViewBySlots/{}/{}/{}/{}/{}/{}/{}/JSON/api",
            self.base(),
            self.config.username,
            self.config.key,
            sensor_id,
            start,
            end,
            SLOTS,
            self.config.averaging_option(granularity)
        )
    }

    /// GET a URL and parse the body as JSON. The URL embeds the key so it is
    /// never logged or put into an error.
    async fn get_json(&self, url: &str, what: &str) -> Result<Value, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Failed to get {} from Earthsense API: {}", what, e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!(
                "Failed to get {} from Earthsense API. Status: {}",
                what, status
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| format!("Earthsense {} response is not JSON: {}", what, e.without_url()))
    }
}

#[async_trait]
impl VendorApi for EarthsenseClient {
    #[instrument(skip(self))]
    async fn list_sensors(&self) -> IngestResult<Vec<RosterEntry>> {
        let body = self
            .get_json(&self.roster_url(), "Zephyr list")
            .await
            .map_err(IngestError::roster)?;

        let entries = parse_roster(&body, &self.config.roster)?;
        info!(count = entries.len(), "Fetched Zephyr roster");
        Ok(entries)
    }

    #[instrument(skip(self), fields(start = %window.start, end = %window.end))]
    async fn fetch(
        &self,
        sensor_id: u32,
        window: &FetchWindow,
        granularity: Granularity,
    ) -> IngestResult<Value> {
        debug!(
            averaging = self.config.averaging_option(granularity),
            "Requesting Zephyr data"
        );

        self.get_json(&self.data_url(sensor_id, window, granularity), "Zephyr data")
            .await
            .map_err(IngestError::vendor_fetch)
    }
}
