//! Earthsense responses captured from Zephyr 469 and trimmed for tests.

use serde_json::{json, Value};

/// Zephyr the fixtures were captured from.
pub const SENSOR_ID: u32 = 469;

/// Pressure reported at the first raw timestep, in pascal.
pub const FIRST_RAW_PRESSURE_PA: f64 = 99376.0;

/// Unaveraged `dataForViewBySlots` response. Slot A has no cartridge fitted,
/// slot B reports two timesteps ten seconds apart.
pub fn raw_data_response() -> Value {
    json!({
        "queryInfo": {
            "zNumber": SENSOR_ID,
            "startDate": "20200827143900",
            "endDate": "20200827144000",
            "slots": "AB",
            "averagingOption": "def"
        },
        "slotA": {
            "dateTime": {"header": "Timestamp", "units": "", "data": []},
            "O3": {"header": "O3", "units": "ug/m3", "data": []}
        },
        "slotB": {
            "dateTime": {"header": "Timestamp", "units": "", "data": ["2020-08-27T14:39:44+00:00", "2020-08-27T14:39:54+00:00"]},
            "latitude": {"header": "Latitude", "units": "deg", "data": [52.450895, 52.450895]},
            "longitude": {"header": "Longitude", "units": "deg", "data": [-1.932965, -1.93297]},
            "O3": {"header": "O3", "units": "ug/m3", "data": [2, 2]},
            "NO": {"header": "NO", "units": "ug/m3", "data": [0, 4]},
            "NO2": {"header": "NO2", "units": "ug/m3", "data": [27, 25]},
            "particulatePM1": {"header": "PM1", "units": "ug/m3", "data": [5, 5]},
            "particulatePM25": {"header": "PM2.5", "units": "ug/m3", "data": [6, 6]},
            "particulatePM10": {"header": "PM10", "units": "ug/m3", "data": [14, 14]},
            "tempC": {"header": "Temperature", "units": "C", "data": [14, 14]},
            "ambTempC": {"header": "Ambient Temperature", "units": "C", "data": [14, 14]},
            "humidity": {"header": "Humidity", "units": "%", "data": [87, 86]},
            "ambHumidity": {"header": "Ambient Humidity", "units": "%", "data": [84, 84]},
            "ambPressure": {"header": "Ambient Pressure", "units": "Pa", "data": [99376, 99376]},
            "particulatePM4": {"header": "PM4", "units": "ug/m3", "data": [9, 9]}
        }
    })
}

/// Unaveraged response with both slots reporting. Slot A has a position fix
/// at the first timestep, slot B reports ten seconds later without one.
pub fn two_slot_raw_response() -> Value {
    json!({
        "queryInfo": {"zNumber": SENSOR_ID, "slots": "AB", "averagingOption": "def"},
        "slotA": {
            "dateTime": {"data": ["2020-08-27T14:39:44+00:00"]},
            "latitude": {"data": [52.450895]},
            "longitude": {"data": [-1.932965]},
            "O3": {"data": [2]},
            "NO2": {"data": [27]}
        },
        "slotB": {
            "dateTime": {"data": ["2020-08-27T14:39:54+00:00"]},
            "latitude": {"data": [null]},
            "longitude": {"data": [null]},
            "O3": {"data": [3]}
        }
    })
}

/// 15-minute averaged response. The first timestep of each slot is the
/// vendor's all-null placeholder.
pub fn fifteen_minute_response() -> Value {
    json!({
        "queryInfo": {
            "zNumber": SENSOR_ID,
            "startDate": "20200827123000",
            "endDate": "20200827130500",
            "slots": "AB",
            "averagingOption": "15min"
        },
        "15 min average on the quarter hours": {
            "slotB": {
                "dateTime": {"data": [null, "2020-08-27T12:45:00+00:00", "2020-08-27T13:00:00+00:00"]},
                "latitude": {"data": [null, 52.450763, 52.450833]},
                "longitude": {"data": [null, -1.93294, -1.932934]},
                "O3": {"data": [null, 9, 8]},
                "NO": {"data": [null, 4, 4]},
                "NO2": {"data": [null, 31, 29]},
                "particulatePM1": {"data": [null, 5, 5]},
                "particulatePM25": {"data": [null, 7, 6]},
                "particulatePM10": {"data": [null, 14, 13]},
                "tempC": {"data": [null, 14, 14]},
                "ambTempC": {"data": [null, 14, 14]},
                "humidity": {"data": [null, 83, 83]},
                "ambHumidity": {"data": [null, 81, 81]},
                "ambPressure": {"data": [null, 99597, 99568]}
            }
        }
    })
}

/// Raw response whose slot B arrays disagree in length.
pub fn misaligned_data_response() -> Value {
    json!({
        "queryInfo": {"zNumber": SENSOR_ID},
        "slotB": {
            "dateTime": {"data": ["2020-08-27T14:39:44+00:00", "2020-08-27T14:39:54+00:00"]},
            "O3": {"data": [2, 2]},
            "NO2": {"data": [27]}
        }
    })
}

/// `zephyrsForUser` roster listing two Zephyrs.
pub fn roster_response() -> Value {
    json!({
        "usersZephyrs": {
            "0": {
                "zNumber": 362,
                "name": "Zephyr 362",
                "location": {
                    "lat": "52.652643000",
                    "lng": "-1.133957000",
                    "desc": "OTS or Transit",
                    "since": "2020-03-06 09:00:00"
                }
            },
            "1": {
                "zNumber": SENSOR_ID,
                "name": "Zephyr 469",
                "location": {
                    "lat": "52.450859070",
                    "lng": "-1.932933331",
                    "desc": "Automatic location",
                    "since": "2020-08-06 14:41:36"
                }
            }
        }
    })
}

/// Roster that lists the given Zephyr numbers without locations.
pub fn roster_of(ids: &[u32]) -> Value {
    let zephyrs: serde_json::Map<String, Value> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (i.to_string(), json!({"zNumber": id})))
        .collect();
    json!({ "usersZephyrs": zephyrs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_fixture_is_aligned() {
        let slot = &raw_data_response()["slotB"];
        let lengths: Vec<usize> = slot
            .as_object()
            .unwrap()
            .values()
            .map(|v| v["data"].as_array().unwrap().len())
            .collect();
        assert!(lengths.iter().all(|l| *l == 2));
    }

    #[test]
    fn test_roster_of() {
        let roster = roster_of(&[1, 2]);
        assert_eq!(roster["usersZephyrs"]["1"]["zNumber"], 2);
    }
}
