//! Parsing of a single vendor slot into per-timestep readings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use zephyr_common::time::parse_vendor_timestamp;
use zephyr_common::{
    Cartridge, IngestError, IngestResult, Position, SensorTimestepReading, Slot, Variable,
};

use crate::payload::SlotObject;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    DateTime,
    Latitude,
    Longitude,
    Measure(Variable),
}

/// Vendor variable names and what they map to.
const COLUMNS: [(&str, Column); 14] = [
    ("dateTime", Column::DateTime),
    ("latitude", Column::Latitude),
    ("longitude", Column::Longitude),
    ("O3", Column::Measure(Variable::O3)),
    ("NO", Column::Measure(Variable::No)),
    ("NO2", Column::Measure(Variable::No2)),
    ("particulatePM1", Column::Measure(Variable::Pm1)),
    ("particulatePM25", Column::Measure(Variable::Pm2p5)),
    ("particulatePM10", Column::Measure(Variable::Pm10)),
    ("tempC", Column::Measure(Variable::TempC)),
    ("ambTempC", Column::Measure(Variable::AmbTempC)),
    ("humidity", Column::Measure(Variable::Humidity)),
    ("ambHumidity", Column::Measure(Variable::AmbHumidity)),
    ("ambPressure", Column::Measure(Variable::AmbPressure)),
];

/// A reading before the sensor it belongs to is known.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotTimestep {
    pub cartridge: Cartridge,
    pub timestamp: DateTime<Utc>,
    pub position: Option<Position>,
    pub values: BTreeMap<Variable, f64>,
}

impl SlotTimestep {
    pub fn attach(self, sensor_id: u32) -> SensorTimestepReading {
        SensorTimestepReading {
            sensor_id,
            cartridge: self.cartridge,
            timestamp: self.timestamp,
            position: self.position,
            values: self.values,
        }
    }
}

/// Parse one slot into chronological timesteps.
///
/// Every non-empty variable array must have the same length, otherwise the
/// slot fails as a whole with `MisalignedSlotData`.
pub fn parse_slot(slot: &SlotObject, channel: Slot) -> IngestResult<Vec<SlotTimestep>> {
    parse_slot_from(slot, channel, 0)
}

/// Like [`parse_slot`] but discards the first `skip` timesteps before any
/// value in them is interpreted.
pub(crate) fn parse_slot_from(
    slot: &SlotObject,
    channel: Slot,
    skip: usize,
) -> IngestResult<Vec<SlotTimestep>> {
    let mut columns: Vec<(&str, Column, &Vec<Value>)> = Vec::new();
    for (name, column) in COLUMNS {
        if let Some(data) = column_data(slot, name)? {
            columns.push((name, column, data));
        }
    }

    let Some((_, _, first)) = columns.first() else {
        return Ok(Vec::new());
    };
    let n_timesteps = first.len();
    if columns.iter().any(|(_, _, data)| data.len() != n_timesteps) {
        return Err(IngestError::misaligned_slot(n_timesteps));
    }

    let date_times = columns
        .iter()
        .find(|(_, column, _)| *column == Column::DateTime)
        .map(|(_, _, data)| *data)
        .ok_or_else(|| {
            IngestError::invalid_payload(format!(
                "Slot {} has measurements but no dateTime variable",
                channel.payload_key()
            ))
        })?;

    let cartridge = Cartridge::standard(channel);
    let mut timesteps = Vec::with_capacity(n_timesteps.saturating_sub(skip));

    for idx in skip..n_timesteps {
        let timestamp = date_times[idx]
            .as_str()
            .and_then(parse_vendor_timestamp)
            .ok_or_else(|| {
                IngestError::invalid_payload(format!(
                    "Slot {} has an invalid dateTime at index {}",
                    channel.payload_key(),
                    idx
                ))
            })?;

        let mut longitude = None;
        let mut latitude = None;
        let mut values = BTreeMap::new();

        for (name, column, data) in &columns {
            if *column == Column::DateTime {
                continue;
            }
            match (column, numeric(&data[idx], name, idx)?) {
                (Column::Latitude, value) => latitude = value,
                (Column::Longitude, value) => longitude = value,
                (Column::Measure(variable), Some(value)) => {
                    values.insert(*variable, value);
                }
                _ => {}
            }
        }

        timesteps.push(SlotTimestep {
            cartridge,
            timestamp,
            position: Position::from_parts(longitude, latitude),
            values,
        });
    }

    Ok(timesteps)
}

/// The `data` array of a variable, if it is present and non-empty.
fn column_data<'a>(slot: &'a SlotObject, name: &str) -> IngestResult<Option<&'a Vec<Value>>> {
    let data = match slot.get(name).and_then(|v| v.get("data")) {
        None | Some(Value::Null) => return Ok(None),
        Some(data) => data,
    };

    match data {
        Value::Array(values) if values.is_empty() => Ok(None),
        Value::Array(values) => Ok(Some(values)),
        _ => Err(IngestError::invalid_payload(format!(
            "Variable {} does not hold an array of data",
            name
        ))),
    }
}

/// Null is "not reported". Numeric strings are tolerated.
fn numeric(value: &Value, name: &str, idx: usize) -> IngestResult<Option<f64>> {
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(IngestError::invalid_payload(format!(
            "Variable {} has a non-numeric value at index {}",
            name, idx
        ))),
    }
}
