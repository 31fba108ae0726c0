//! Per-sensor ingest state and roster entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::granularity::Granularity;

/// Where the vendor last reported a Zephyr to be deployed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastKnownLocation {
    pub lat: f64,
    pub lng: f64,
    pub description: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

/// One Zephyr as listed by the vendor for the configured account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: u32,
    pub last_known_location: Option<LastKnownLocation>,
}

/// Ingest progress for one granularity of one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GranularityWatermark {
    pub enabled: bool,
    /// Result time of the most recent observation published.
    pub latest: Option<DateTime<Utc>>,
}

/// Everything persisted about a sensor between cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkState {
    pub sensor_id: u32,
    pub still_listed: bool,
    pub last_known_location: Option<LastKnownLocation>,
    pub granularities: BTreeMap<Granularity, GranularityWatermark>,
}

impl WatermarkState {
    /// State for a sensor seen for the first time.
    ///
    /// Only the 15-minute average is enabled; other granularities are opted
    /// into by editing the stored record.
    pub fn new_sensor(sensor_id: u32) -> Self {
        let granularities = Granularity::ALL
            .iter()
            .map(|g| {
                (
                    *g,
                    GranularityWatermark {
                        enabled: *g == Granularity::FifteenMinute,
                        latest: None,
                    },
                )
            })
            .collect();

        Self {
            sensor_id,
            still_listed: true,
            last_known_location: None,
            granularities,
        }
    }

    pub fn is_enabled(&self, granularity: Granularity) -> bool {
        self.granularities
            .get(&granularity)
            .map(|w| w.enabled)
            .unwrap_or(false)
    }

    /// Enabled granularities in processing order.
    pub fn enabled_granularities(&self) -> Vec<Granularity> {
        Granularity::ALL
            .iter()
            .copied()
            .filter(|g| self.is_enabled(*g))
            .collect()
    }

    pub fn latest(&self, granularity: Granularity) -> Option<DateTime<Utc>> {
        self.granularities.get(&granularity).and_then(|w| w.latest)
    }

    pub fn set_enabled(&mut self, granularity: Granularity, enabled: bool) {
        self.granularities.entry(granularity).or_default().enabled = enabled;
    }

    /// Move a watermark forward. Older timestamps are ignored.
    pub fn advance(&mut self, granularity: Granularity, to: DateTime<Utc>) {
        let entry = self.granularities.entry(granularity).or_default();
        entry.latest = Some(match entry.latest {
            Some(current) => current.max(to),
            None => to,
        });
    }

    /// Refresh roster-derived fields.
    pub fn apply_roster(&mut self, entry: &RosterEntry) {
        self.still_listed = true;
        if entry.last_known_location.is_some() {
            self.last_known_location = entry.last_known_location.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_new_sensor_enables_only_fifteen_minute() {
        let state = WatermarkState::new_sensor(469);
        assert!(state.still_listed);
        assert_eq!(state.enabled_granularities(), vec![Granularity::FifteenMinute]);
        assert!(Granularity::ALL.iter().all(|g| state.latest(*g).is_none()));
    }

    #[test]
    fn test_advance_never_moves_backwards() {
        let mut state = WatermarkState::new_sensor(469);
        state.advance(Granularity::FifteenMinute, ts("2020-08-27T13:00:00Z"));
        state.advance(Granularity::FifteenMinute, ts("2020-08-27T12:45:00Z"));
        assert_eq!(
            state.latest(Granularity::FifteenMinute),
            Some(ts("2020-08-27T13:00:00Z"))
        );

        state.advance(Granularity::FifteenMinute, ts("2020-08-27T13:15:00Z"));
        assert_eq!(
            state.latest(Granularity::FifteenMinute),
            Some(ts("2020-08-27T13:15:00Z"))
        );
    }

    #[test]
    fn test_apply_roster_relists_and_keeps_location_when_missing() {
        let mut state = WatermarkState::new_sensor(469);
        state.still_listed = false;
        state.last_known_location = Some(LastKnownLocation {
            lat: 52.45,
            lng: -1.93,
            description: Some("Roof".to_string()),
            since: None,
        });

        state.apply_roster(&RosterEntry {
            id: 469,
            last_known_location: None,
        });

        assert!(state.still_listed);
        assert!(state.last_known_location.is_some());
    }
}
