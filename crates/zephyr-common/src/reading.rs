//! Uniform per-timestep readings decoded from vendor slots.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A measured quantity reported by a Zephyr cartridge.
///
/// Declaration order is the canonical table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Variable {
    O3,
    No,
    No2,
    Pm1,
    Pm2p5,
    Pm10,
    /// Temperature on the board, not surfaced downstream.
    TempC,
    AmbTempC,
    /// Humidity on the board, not surfaced downstream.
    Humidity,
    AmbHumidity,
    /// Station pressure in pascal.
    AmbPressure,
}

impl Variable {
    pub const ALL: [Variable; 11] = [
        Variable::O3,
        Variable::No,
        Variable::No2,
        Variable::Pm1,
        Variable::Pm2p5,
        Variable::Pm10,
        Variable::TempC,
        Variable::AmbTempC,
        Variable::Humidity,
        Variable::AmbHumidity,
        Variable::AmbPressure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::O3 => "o3",
            Self::No => "no",
            Self::No2 => "no2",
            Self::Pm1 => "pm1",
            Self::Pm2p5 => "pm2p5",
            Self::Pm10 => "pm10",
            Self::TempC => "tempC",
            Self::AmbTempC => "ambTempC",
            Self::Humidity => "humidity",
            Self::AmbHumidity => "ambHumidity",
            Self::AmbPressure => "ambPressure",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the (up to two) independent inlets of a Zephyr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::A, Slot::B];

    pub fn letter(&self) -> char {
        match self {
            Self::A => 'a',
            Self::B => 'b',
        }
    }

    /// Field name of this slot in a vendor response.
    pub fn payload_key(&self) -> &'static str {
        match self {
            Self::A => "slotA",
            Self::B => "slotB",
        }
    }
}

/// Capability class of the cartridge fitted in a slot.
///
/// The vendor exposes no signal that distinguishes an enhanced cartridge in any
/// response seen so far, so parsing always yields `Standard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartridgeKind {
    Standard,
}

impl CartridgeKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
        }
    }
}

/// The channel a reading came from, rendered as e.g. `standard-cartridge-slot-b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cartridge {
    pub kind: CartridgeKind,
    pub slot: Slot,
}

impl Cartridge {
    pub fn standard(slot: Slot) -> Self {
        Self {
            kind: CartridgeKind::Standard,
            slot,
        }
    }
}

impl fmt::Display for Cartridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-cartridge-slot-{}", self.kind.label(), self.slot.letter())
    }
}

/// A WGS84 position. Only exists when both coordinates were reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub longitude: f64,
    pub latitude: f64,
}

impl Position {
    /// Build a position only if both coordinates are present and finite.
    pub fn from_parts(longitude: Option<f64>, latitude: Option<f64>) -> Option<Self> {
        match (longitude, latitude) {
            (Some(longitude), Some(latitude)) if longitude.is_finite() && latitude.is_finite() => {
                Some(Self {
                    longitude,
                    latitude,
                })
            }
            _ => None,
        }
    }

    /// GeoJSON coordinate order.
    pub fn coordinates(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// One timestep of one slot of one Zephyr.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorTimestepReading {
    /// Vendor-assigned Zephyr number.
    pub sensor_id: u32,
    pub cartridge: Cartridge,
    pub timestamp: DateTime<Utc>,
    pub position: Option<Position>,
    /// Variables reported at this timestep. Absent means "not reported".
    pub values: BTreeMap<Variable, f64>,
}

impl SensorTimestepReading {
    pub fn value(&self, variable: Variable) -> Option<f64> {
        self.values.get(&variable).copied()
    }

    /// Sensor id of the measurement channel, e.g. `zephyr-469-standard-cartridge-slot-b`.
    pub fn channel_sensor_id(&self) -> String {
        format!("zephyr-{}-{}", self.sensor_id, self.cartridge)
    }

    /// Sensor id of the unit's GPS, e.g. `zephyr-469-gps-sensor`.
    pub fn gps_sensor_id(&self) -> String {
        format!("zephyr-{}-gps-sensor", self.sensor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cartridge_label() {
        assert_eq!(Cartridge::standard(Slot::A).to_string(), "standard-cartridge-slot-a");
        assert_eq!(Cartridge::standard(Slot::B).to_string(), "standard-cartridge-slot-b");
    }

    #[test]
    fn test_position_needs_both_coordinates() {
        assert!(Position::from_parts(Some(-1.93), None).is_none());
        assert!(Position::from_parts(None, Some(52.45)).is_none());
        assert!(Position::from_parts(Some(f64::NAN), Some(52.45)).is_none());

        let position = Position::from_parts(Some(-1.932965), Some(52.450895)).unwrap();
        assert_eq!(position.coordinates(), [-1.932965, 52.450895]);
    }

    #[test]
    fn test_sensor_ids() {
        let reading = SensorTimestepReading {
            sensor_id: 469,
            cartridge: Cartridge::standard(Slot::B),
            timestamp: Utc::now(),
            position: None,
            values: BTreeMap::new(),
        };
        assert_eq!(reading.channel_sensor_id(), "zephyr-469-standard-cartridge-slot-b");
        assert_eq!(reading.gps_sensor_id(), "zephyr-469-gps-sensor");
    }
}
