//! Generators for synthetic Earthsense responses with predictable values.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{json, Value};

/// Value of every series at timestep `idx`: `O3 = idx`, `NO2 = 100 + idx`.
///
/// Position is fixed at the fixture Zephyr's deployment.
fn slot_series(timestamps: &[Option<DateTime<Utc>>]) -> Value {
    let date_times: Vec<Value> = timestamps
        .iter()
        .map(|t| match t {
            Some(t) => json!(t.to_rfc3339_opts(SecondsFormat::Secs, false)),
            None => Value::Null,
        })
        .collect();
    let series = |f: &dyn Fn(usize) -> Value| -> Vec<Value> {
        timestamps
            .iter()
            .enumerate()
            .map(|(idx, t)| if t.is_some() { f(idx) } else { Value::Null })
            .collect()
    };

    json!({
        "dateTime": {"data": date_times},
        "latitude": {"data": series(&|_| json!(52.450895))},
        "longitude": {"data": series(&|_| json!(-1.932965))},
        "O3": {"data": series(&|idx| json!(idx))},
        "NO2": {"data": series(&|idx| json!(100 + idx))},
        "ambPressure": {"data": series(&|_| json!(100000))}
    })
}

/// Raw response for `sensor_id` with `count` timesteps in slot A, starting at
/// `start` and `step` apart.
///
/// # Example
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use test_utils::generate_raw_response;
///
/// let start = Utc.with_ymd_and_hms(2020, 8, 27, 14, 0, 0).unwrap();
/// let response = generate_raw_response(7, start, 3, Duration::seconds(10));
/// assert_eq!(response["slotA"]["O3"]["data"].as_array().unwrap().len(), 3);
/// ```
pub fn generate_raw_response(
    sensor_id: u32,
    start: DateTime<Utc>,
    count: usize,
    step: Duration,
) -> Value {
    let timestamps: Vec<_> = (0..count)
        .map(|i| Some(start + step * i as i32))
        .collect();
    json!({
        "queryInfo": {"zNumber": sensor_id},
        "slotA": slot_series(&timestamps)
    })
}

/// Averaged response nested under `averaging_key`. A null placeholder
/// timestep precedes the `count` real ones.
pub fn generate_averaged_response(
    sensor_id: u32,
    averaging_key: &str,
    start: DateTime<Utc>,
    count: usize,
    step: Duration,
) -> Value {
    let timestamps: Vec<_> = std::iter::once(None)
        .chain((0..count).map(|i| Some(start + step * i as i32)))
        .collect();
    let mut nested = serde_json::Map::new();
    nested.insert("slotA".to_string(), slot_series(&timestamps));

    let mut response = serde_json::Map::new();
    response.insert("queryInfo".to_string(), json!({"zNumber": sensor_id}));
    response.insert(averaging_key.to_string(), Value::Object(nested));
    Value::Object(response)
}
