//! Time handling utilities for vendor requests and emitted observations.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Format used by the Earthsense API for dates in request paths.
const VENDOR_URL_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Format of `resultTime` and every other emitted timestamp.
/// Downstream consumers match on this literal shape.
const RESULT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Naive layouts the vendor uses when it omits an offset.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Encode a timestamp for an Earthsense request path, e.g. `20200828125732`.
///
/// Fractional seconds are truncated.
pub fn to_vendor_url_date(dt: &DateTime<Utc>) -> String {
    dt.format(VENDOR_URL_DATE_FORMAT).to_string()
}

/// Format a timestamp as ISO-8601 UTC with millisecond precision,
/// e.g. `2020-08-27T14:39:44.000Z`.
pub fn format_result_time(dt: &DateTime<Utc>) -> String {
    dt.format(RESULT_TIME_FORMAT).to_string()
}

/// Parse a timestamp from a vendor timeseries.
///
/// Accepts RFC 3339 (`2020-08-27T14:39:44+00:00`) and naive date-times, which
/// are taken to be UTC.
pub fn parse_vendor_timestamp(s: &str) -> Option<DateTime<Utc>> {
    parse_naive_with_offset(s, utc_offset())
}

/// Parse a naive vendor date-time (e.g. `2020-08-06 14:41:36`) that is known
/// to be expressed in `offset`.
///
/// A trailing `Z` or an explicit offset in the string takes precedence.
pub fn parse_naive_with_offset(s: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let trimmed = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive_part = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    let explicit_utc = naive_part.len() != trimmed.len();

    NAIVE_FORMATS.iter().find_map(|fmt| {
        let ndt = NaiveDateTime::parse_from_str(naive_part, fmt).ok()?;
        if explicit_utc {
            return Some(Utc.from_utc_datetime(&ndt));
        }
        offset
            .from_local_datetime(&ndt)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// A half-open `[start, end)` window of vendor data to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        dt >= &self.start && dt < &self.end
    }

    /// Start and end encoded for a vendor request path.
    pub fn vendor_dates(&self) -> (String, String) {
        (to_vendor_url_date(&self.start), to_vendor_url_date(&self.end))
    }
}

/// Serde adapter writing timestamps in the emitted `resultTime` shape.
pub mod result_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_result_time(dt))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        DateTime::<Utc>::deserialize(deserializer)
    }
}
