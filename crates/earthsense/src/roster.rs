//! Parsing of the `zephyrsForUser` roster.

use chrono::FixedOffset;
use serde::Deserialize;
use serde_json::{Map, Value};

use zephyr_common::time::{parse_naive_with_offset, utc_offset};
use zephyr_common::{IngestError, IngestResult, LastKnownLocation, RosterEntry};

/// How to interpret roster fields the vendor leaves ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterOptions {
    /// Offset of the naive `since` timestamps. The vendor does not document
    /// it; UTC matches every deployment seen so far.
    pub since_offset: FixedOffset,
}

impl Default for RosterOptions {
    fn default() -> Self {
        Self {
            since_offset: utc_offset(),
        }
    }
}

/// Numbers sometimes arrive as strings, e.g. `"52.652643000"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Loose {
    Number(f64),
    Text(String),
}

impl Loose {
    fn as_f64(&self) -> Option<f64> {
        let value: Option<f64> = match self {
            Loose::Number(n) => Some(*n),
            Loose::Text(s) => s.trim().parse().ok(),
        };
        value.filter(|v| v.is_finite())
    }
}

#[derive(Debug, Deserialize)]
struct ZephyrWire {
    #[serde(rename = "zNumber")]
    z_number: Option<Loose>,
    location: Option<LocationWire>,
}

#[derive(Debug, Deserialize)]
struct LocationWire {
    lat: Option<Loose>,
    lng: Option<Loose>,
    desc: Option<String>,
    since: Option<String>,
}

/// Parse a roster response into entries ordered by sensor id.
pub fn parse_roster(value: &Value, options: &RosterOptions) -> IngestResult<Vec<RosterEntry>> {
    let response = value
        .as_object()
        .filter(|o| !o.is_empty())
        .ok_or_else(|| {
            IngestError::roster("Expected Zephyr list response from Earthsense API to be a non-empty object")
        })?;

    let zephyrs: &Map<String, Value> = response
        .get("usersZephyrs")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            IngestError::roster("Expected Zephyr list response to contain an object called 'usersZephyrs'")
        })?;

    let mut entries = zephyrs
        .iter()
        .map(|(key, raw)| parse_entry(key, raw, options))
        .collect::<IngestResult<Vec<_>>>()?;
    entries.sort_by_key(|e| e.id);
    Ok(entries)
}

fn parse_entry(key: &str, raw: &Value, options: &RosterOptions) -> IngestResult<RosterEntry> {
    let wire: ZephyrWire = serde_json::from_value(raw.clone()).map_err(|e| {
        IngestError::roster(format!("Roster entry '{}' is malformed", key)).with_detail(e)
    })?;

    let id = wire
        .z_number
        .as_ref()
        .and_then(Loose::as_f64)
        .filter(|n| n.fract() == 0.0 && *n >= 0.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32)
        .ok_or_else(|| IngestError::roster(format!("Roster entry '{}' has no valid zNumber", key)))?;

    let last_known_location = wire.location.and_then(|loc| {
        let lat = loc.lat.as_ref().and_then(Loose::as_f64)?;
        let lng = loc.lng.as_ref().and_then(Loose::as_f64)?;
        Some(LastKnownLocation {
            lat,
            lng,
            description: loc.desc,
            since: loc
                .since
                .as_deref()
                .and_then(|s| parse_naive_with_offset(s, options.since_offset)),
        })
    });

    Ok(RosterEntry {
        id,
        last_known_location,
    })
}
