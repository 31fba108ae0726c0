//! Temporal aggregation levels offered by the Earthsense API.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::observation::Aggregation;

/// The aggregation level requested from the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Granularity {
    /// Unaveraged readings, roughly every 10 seconds.
    #[serde(rename = "raw")]
    Raw,
    #[serde(rename = "15Min")]
    FifteenMinute,
    #[serde(rename = "hourly")]
    Hourly,
    #[serde(rename = "daily")]
    Daily,
}

impl Granularity {
    /// Every granularity, in the order a sensor's cycle processes them.
    pub const ALL: [Granularity; 4] = [
        Granularity::Raw,
        Granularity::FifteenMinute,
        Granularity::Hourly,
        Granularity::Daily,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::FifteenMinute => "15Min",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
        }
    }

    pub fn is_averaged(&self) -> bool {
        !matches!(self, Self::Raw)
    }

    pub fn aggregation(&self) -> Aggregation {
        if self.is_averaged() {
            Aggregation::Average
        } else {
            Aggregation::Instant
        }
    }

    /// Key under which the vendor nests the slots of an averaged response.
    pub fn averaging_key(&self) -> Option<&'static str> {
        match self {
            Self::Raw => None,
            Self::FifteenMinute => Some("15 min average on the quarter hours"),
            Self::Hourly => Some("Hourly average on the hour"),
            Self::Daily => Some("Daily average at midnight"),
        }
    }

    /// Length of the averaging period that ends at each averaged timestamp.
    pub fn averaging_duration(&self) -> Option<Duration> {
        match self {
            Self::Raw => None,
            Self::FifteenMinute => Some(Duration::minutes(15)),
            Self::Hourly => Some(Duration::hours(1)),
            Self::Daily => Some(Duration::days(1)),
        }
    }

    /// Procedure id naming how the averaged value was derived.
    pub fn procedure_id(&self) -> Option<&'static str> {
        match self {
            Self::Raw => None,
            Self::FifteenMinute => Some("zephyr-15-min-avg-of-10-sec-samples"),
            Self::Hourly => Some("zephyr-hourly-avg-of-10-sec-samples"),
            Self::Daily => Some("zephyr-daily-avg-of-10-sec-samples"),
        }
    }

    /// Averaging option segment of the vendor data URL.
    pub fn default_averaging_option(&self) -> &'static str {
        match self {
            Self::Raw => "def",
            Self::FifteenMinute => "15min",
            Self::Hourly => "1hr",
            Self::Daily => "24hr",
        }
    }

    /// How far back to look when a sensor has no watermark yet.
    pub fn default_lookback(&self) -> Lookback {
        match self {
            Self::Raw => Lookback::Hours(1),
            Self::FifteenMinute => Lookback::Hours(3),
            Self::Hourly => Lookback::Days(1),
            Self::Daily => Lookback::Weeks(1),
        }
    }

    /// The furthest back a single cycle may reach, however old the watermark.
    pub fn max_lookback(&self) -> Lookback {
        match self {
            Self::Raw => Lookback::Hours(12),
            Self::FifteenMinute => Lookback::Weeks(1),
            Self::Hourly => Lookback::Months(1),
            Self::Daily => Lookback::Months(3),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "raw" | "instant" | "unaveraged" => Ok(Self::Raw),
            "15min" | "15-min" | "quarter-hourly" => Ok(Self::FifteenMinute),
            "hourly" | "1hr" => Ok(Self::Hourly),
            "daily" | "24hr" => Ok(Self::Daily),
            _ => Err(IngestError::invalid_granularity(s)),
        }
    }
}

/// A calendar-aware look-back distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    Hours(i64),
    Days(i64),
    Weeks(i64),
    /// Calendar months, so "one month before 31 March" is the end of February.
    Months(u32),
}

impl Lookback {
    /// The instant this far before `now`.
    pub fn before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Lookback::Hours(h) => now - Duration::hours(h),
            Lookback::Days(d) => now - Duration::days(d),
            Lookback::Weeks(w) => now - Duration::weeks(w),
            Lookback::Months(m) => now
                .checked_sub_months(Months::new(m))
                .unwrap_or_else(|| now - Duration::days(30 * i64::from(m))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("15Min".parse::<Granularity>().unwrap(), Granularity::FifteenMinute);
        assert_eq!("hourly".parse::<Granularity>().unwrap(), Granularity::Hourly);
        assert_eq!("daily".parse::<Granularity>().unwrap(), Granularity::Daily);
        assert_eq!("raw".parse::<Granularity>().unwrap(), Granularity::Raw);

        let err = "5Min".parse::<Granularity>().unwrap_err();
        assert!(err.is(ErrorKind::InvalidGranularity));
    }

    #[test]
    fn test_names_round_trip_through_display() {
        for g in Granularity::ALL {
            assert_eq!(g.to_string().parse::<Granularity>().unwrap(), g);
        }
    }

    #[test]
    fn test_raw_has_no_averaging() {
        assert!(!Granularity::Raw.is_averaged());
        assert_eq!(Granularity::Raw.averaging_key(), None);
        assert_eq!(Granularity::Raw.procedure_id(), None);
        assert_eq!(Granularity::Raw.aggregation(), Aggregation::Instant);
        assert_eq!(Granularity::Daily.aggregation(), Aggregation::Average);
    }

    #[test]
    fn test_month_lookback_is_calendar_aware() {
        let now = ts("2020-03-31T12:00:00Z");
        assert_eq!(Lookback::Months(1).before(now), ts("2020-02-29T12:00:00Z"));
        assert_eq!(Lookback::Months(3).before(now), ts("2019-12-31T12:00:00Z"));
        assert_eq!(Lookback::Weeks(1).before(now), ts("2020-03-24T12:00:00Z"));
    }
}
