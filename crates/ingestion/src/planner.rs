//! Fetch window planning from persisted watermarks.

use chrono::{DateTime, Utc};

use zephyr_common::{CanonicalObservation, FetchWindow, Granularity, WatermarkState};

/// Window of vendor data to request for one granularity.
///
/// Resumes from the watermark unless it is further back than the
/// granularity's ceiling, in which case the window is cut to the ceiling.
/// Without a watermark the default look-back is used. The window always ends
/// at `now`; a watermark in the future yields an empty window.
pub fn plan_window(
    granularity: Granularity,
    watermark: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> FetchWindow {
    let start = match watermark {
        Some(watermark) => {
            let ceiling = granularity.max_lookback().before(now);
            watermark.max(ceiling)
        }
        None => granularity.default_lookback().before(now),
    };

    FetchWindow::new(start.min(now), now)
}

/// What a completed granularity cycle does to its watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkUpdate {
    Advanced(DateTime<Utc>),
    Unchanged,
}

impl WatermarkUpdate {
    pub fn apply(self, state: &mut WatermarkState, granularity: Granularity) {
        if let WatermarkUpdate::Advanced(to) = self {
            state.advance(granularity, to);
        }
    }
}

/// Watermark after publishing `observations`, which must be in emission order.
///
/// Empty batches and batches that end at or before `previous` leave it alone.
pub fn next_watermark(
    observations: &[CanonicalObservation],
    previous: Option<DateTime<Utc>>,
) -> WatermarkUpdate {
    match (observations.last(), previous) {
        (None, _) => WatermarkUpdate::Unchanged,
        (Some(last), Some(previous)) if last.result_time <= previous => WatermarkUpdate::Unchanged,
        (Some(last), _) => WatermarkUpdate::Advanced(last.result_time),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use zephyr_common::{Aggregation, ObservedProperty, Unit};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn observation_at(at: &str) -> CanonicalObservation {
        CanonicalObservation::measurement(
            "zephyr-469-standard-cartridge-slot-b",
            ObservedProperty::OzoneMassConcentration,
            ts(at),
            1.0,
            Unit::MicrogramPerCubicMetre,
            Aggregation::Instant,
        )
    }

    #[test]
    fn test_default_lookbacks() {
        let now = ts("2020-08-28T12:00:00Z");

        assert_eq!(plan_window(Granularity::Raw, None, now).start, ts("2020-08-28T11:00:00Z"));
        assert_eq!(
            plan_window(Granularity::FifteenMinute, None, now).start,
            ts("2020-08-28T09:00:00Z")
        );
        assert_eq!(plan_window(Granularity::Hourly, None, now).start, ts("2020-08-27T12:00:00Z"));
        assert_eq!(plan_window(Granularity::Daily, None, now).start, ts("2020-08-21T12:00:00Z"));
        assert_eq!(plan_window(Granularity::Raw, None, now).end, now);
    }

    #[test]
    fn test_recent_watermark_is_resumed() {
        let now = ts("2020-08-28T12:00:00Z");
        let watermark = ts("2020-08-28T02:00:00Z");

        let window = plan_window(Granularity::Raw, Some(watermark), now);
        assert_eq!(window.start, watermark);
        assert_eq!(window.end, now);
    }

    #[test]
    fn test_watermark_at_ceiling_is_resumed() {
        let now = ts("2020-08-28T12:00:00Z");
        let watermark = now - Duration::hours(12);
        assert_eq!(plan_window(Granularity::Raw, Some(watermark), now).start, watermark);
    }

    #[test]
    fn test_stale_watermark_is_cut_to_ceiling() {
        let now = ts("2020-08-28T12:00:00Z");
        let stale = ts("2020-01-01T00:00:00Z");

        assert_eq!(
            plan_window(Granularity::Raw, Some(stale), now).start,
            ts("2020-08-28T00:00:00Z")
        );
        assert_eq!(
            plan_window(Granularity::FifteenMinute, Some(stale), now).start,
            ts("2020-08-21T12:00:00Z")
        );
        assert_eq!(
            plan_window(Granularity::Hourly, Some(stale), now).start,
            ts("2020-07-28T12:00:00Z")
        );
        assert_eq!(
            plan_window(Granularity::Daily, Some(stale), now).start,
            ts("2020-05-28T12:00:00Z")
        );
    }

    #[test]
    fn test_future_watermark_gives_empty_window() {
        let now = ts("2020-08-28T12:00:00Z");
        let window = plan_window(Granularity::Raw, Some(ts("2020-08-29T00:00:00Z")), now);
        assert_eq!(window.start, now);
        assert_eq!(window.end, now);
    }

    #[test]
    fn test_next_watermark() {
        assert_eq!(next_watermark(&[], None), WatermarkUpdate::Unchanged);
        assert_eq!(
            next_watermark(&[], Some(ts("2020-08-27T13:00:00Z"))),
            WatermarkUpdate::Unchanged
        );

        let observations = vec![
            observation_at("2020-08-27T12:45:00Z"),
            observation_at("2020-08-27T13:00:00Z"),
        ];
        assert_eq!(
            next_watermark(&observations, Some(ts("2020-08-27T12:00:00Z"))),
            WatermarkUpdate::Advanced(ts("2020-08-27T13:00:00Z"))
        );
        assert_eq!(
            next_watermark(&observations, Some(ts("2020-08-27T14:00:00Z"))),
            WatermarkUpdate::Unchanged
        );
    }

    #[test]
    fn test_apply_update() {
        let mut state = WatermarkState::new_sensor(469);
        WatermarkUpdate::Advanced(ts("2020-08-27T13:00:00Z")).apply(&mut state, Granularity::Raw);
        WatermarkUpdate::Unchanged.apply(&mut state, Granularity::Raw);
        assert_eq!(state.latest(Granularity::Raw), Some(ts("2020-08-27T13:00:00Z")));
    }
}
