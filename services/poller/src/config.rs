//! Poller configuration.
//!
//! Loaded from a YAML file (default `config/poller.yaml`). Earthsense
//! credentials can be supplied through `EARTHSENSE_USERNAME` and
//! `EARTHSENSE_KEY` instead of being written to the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use tracing::{debug, warn};

use earthsense::{EarthsenseConfig, RosterOptions, DEFAULT_BASE_URL};
use ingestion::OrchestratorOptions;
use zephyr_common::{Granularity, OBSERVATION_TOPIC};

pub const USERNAME_ENV: &str = "EARTHSENSE_USERNAME";
pub const KEY_ENV: &str = "EARTHSENSE_KEY";

/// Root of `poller.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollerConfig {
    #[serde(default)]
    pub earthsense: VendorSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub ingest: IngestSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VendorSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Overrides for the averaging path segment, e.g. `15Min: 15min`.
    #[serde(default)]
    pub averaging_options: BTreeMap<Granularity, String>,
    /// Offset of the roster's `since` timestamps, in minutes east of UTC.
    #[serde(default)]
    pub since_offset_minutes: i32,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for VendorSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            username: String::new(),
            key: String::new(),
            request_timeout_secs: default_request_timeout(),
            averaging_options: BTreeMap::new(),
            since_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Approximate cap on the observation stream length.
    #[serde(default)]
    pub stream_max_len: Option<usize>,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("/data/zephyr/watermarks.db")
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            redis_url: default_redis_url(),
            stream_max_len: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestSection {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_sensors: usize,
}

fn default_topic() -> String {
    OBSERVATION_TOPIC.to_string()
}

fn default_poll_interval() -> u64 {
    300
}

fn default_fetch_timeout() -> u64 {
    120
}

fn default_max_concurrent() -> usize {
    1
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            poll_interval_secs: default_poll_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            max_concurrent_sensors: default_max_concurrent(),
        }
    }
}

impl PollerConfig {
    /// Load a configuration file. A missing file falls back to defaults so
    /// the poller can run from environment variables alone.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(path = %path.display(), "Loaded poller config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply credential overrides. Empty values are ignored.
    pub fn with_credentials(mut self, username: Option<String>, key: Option<String>) -> Self {
        if let Some(username) = username.filter(|u| !u.is_empty()) {
            self.earthsense.username = username;
        }
        if let Some(key) = key.filter(|k| !k.is_empty()) {
            self.earthsense.key = key;
        }
        self
    }

    /// Apply the `EARTHSENSE_*` environment overrides.
    pub fn with_env_credentials(self) -> Self {
        self.with_credentials(std::env::var(USERNAME_ENV).ok(), std::env::var(KEY_ENV).ok())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.ingest.poll_interval_secs)
    }

    pub fn earthsense_config(&self) -> Result<EarthsenseConfig> {
        let vendor = &self.earthsense;
        if vendor.username.is_empty() || vendor.key.is_empty() {
            bail!(
                "Earthsense credentials are not configured (set {} and {})",
                USERNAME_ENV,
                KEY_ENV
            );
        }

        let since_offset = FixedOffset::east_opt(vendor.since_offset_minutes * 60)
            .with_context(|| {
                format!("Invalid since_offset_minutes: {}", vendor.since_offset_minutes)
            })?;

        Ok(EarthsenseConfig {
            base_url: vendor.base_url.clone(),
            username: vendor.username.clone(),
            key: vendor.key.clone(),
            request_timeout: Duration::from_secs(vendor.request_timeout_secs),
            averaging_options: vendor.averaging_options.clone(),
            roster: RosterOptions { since_offset },
        })
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            topic: self.ingest.topic.clone(),
            fetch_timeout: Duration::from_secs(self.ingest.fetch_timeout_secs),
            max_concurrent_sensors: self.ingest.max_concurrent_sensors.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
earthsense:
  base_url: "http://localhost:9000/"
  username: alice
  key: secret
  request_timeout_secs: 30
  since_offset_minutes: 60
  averaging_options:
    15Min: "15min"
    hourly: "1hr"

storage:
  database_path: /tmp/zephyr.db
  redis_url: redis://redis:6379
  stream_max_len: 10000

ingest:
  topic: observation.test
  poll_interval_secs: 60
  fetch_timeout_secs: 10
  max_concurrent_sensors: 4
"#;

        let config = PollerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.storage.stream_max_len, Some(10000));
        assert_eq!(config.poll_interval(), Duration::from_secs(60));

        let vendor = config.earthsense_config().unwrap();
        assert_eq!(vendor.base_url, "http://localhost:9000/");
        assert_eq!(vendor.request_timeout, Duration::from_secs(30));
        assert_eq!(vendor.averaging_option(Granularity::FifteenMinute), "15min");
        assert_eq!(vendor.averaging_option(Granularity::Daily), "24hr");
        assert_eq!(vendor.roster.since_offset.local_minus_utc(), 3600);

        let options = config.orchestrator_options();
        assert_eq!(options.topic, "observation.test");
        assert_eq!(options.fetch_timeout, Duration::from_secs(10));
        assert_eq!(options.max_concurrent_sensors, 4);
    }

    #[test]
    fn test_defaults() {
        let config = PollerConfig::from_yaml("earthsense:\n  username: bob\n").unwrap();

        assert_eq!(config.earthsense.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.storage.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.ingest.topic, OBSERVATION_TOPIC);
        assert_eq!(config.ingest.poll_interval_secs, 300);
        assert_eq!(config.orchestrator_options().max_concurrent_sensors, 1);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PollerConfig::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.ingest.fetch_timeout_secs, 120);
    }

    #[test]
    fn test_credentials_required() {
        let err = PollerConfig::default().earthsense_config().unwrap_err();
        assert!(err.to_string().contains(USERNAME_ENV));

        let config = PollerConfig::default().with_credentials(Some("alice".into()), Some("secret".into()));
        assert!(config.earthsense_config().is_ok());
    }

    #[test]
    fn test_empty_override_keeps_file_value() {
        let config = PollerConfig::from_yaml("earthsense:\n  username: alice\n  key: k1\n")
            .unwrap()
            .with_credentials(Some(String::new()), Some("k2".into()));

        assert_eq!(config.earthsense.username, "alice");
        assert_eq!(config.earthsense.key, "k2");
    }

    #[test]
    fn test_unknown_granularity_rejected() {
        let yaml = "earthsense:\n  averaging_options:\n    weekly: 7d\n";
        assert!(PollerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_out_of_range_offset_rejected() {
        let config = PollerConfig::from_yaml(
            "earthsense:\n  username: a\n  key: b\n  since_offset_minutes: 100000\n",
        )
        .unwrap();
        assert!(config.earthsense_config().is_err());
    }
}
