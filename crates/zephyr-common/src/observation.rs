//! Canonical observation events published to the message bus.
//!
//! The JSON shape is the contract with downstream consumers:
//!
//! ```json
//! {
//!   "resultTime": "2020-08-27T14:45:00.000Z",
//!   "hasResult": {"value": 2.0, "unit": "microgram-per-cubic-metre"},
//!   "madeBySensor": "zephyr-469-standard-cartridge-slot-b",
//!   "observedProperty": "ozone-mass-concentration",
//!   "aggregation": "average",
//!   "location": {"id": "...", "validAt": "...", "geometry": {"type": "Point", "coordinates": [-1.93, 52.45]}},
//!   "phenomenonTime": {"hasBeginning": "2020-08-27T14:30:00.000Z", "hasEnd": "2020-08-27T14:45:00.000Z"},
//!   "usedProcedures": ["zephyr-15-min-avg-of-10-sec-samples"]
//! }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reading::Position;
use crate::time::result_time;

/// Topic every observation is published on.
pub const OBSERVATION_TOPIC: &str = "observation.incoming";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Instant,
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObservedProperty {
    Location,
    OzoneMassConcentration,
    NitrogenMonoxideMassConcentration,
    NitrogenDioxideMassConcentration,
    Pm1MassConcentration,
    Pm2p5MassConcentration,
    Pm10MassConcentration,
    RelativeHumidity,
    AirTemperature,
    /// Station pressure, not reduced to mean sea level.
    AirPressure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Unit {
    MicrogramPerCubicMetre,
    Percent,
    DegreeCelsius,
    Hectopascal,
    GeojsonGeometry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
}

/// A GeoJSON geometry. Only points are produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: GeometryType,
    pub coordinates: [f64; 2],
}

impl Geometry {
    pub fn point(position: &Position) -> Self {
        Self {
            kind: GeometryType::Point,
            coordinates: position.coordinates(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    Number(f64),
    Geometry(Geometry),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationResult {
    pub value: ResultValue,
    pub unit: Unit,
}

/// Where the platform was at a given moment.
///
/// Observations from the same timestep share one `Arc<Location>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    #[serde(with = "result_time")]
    pub valid_at: DateTime<Utc>,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhenomenonTime {
    #[serde(with = "result_time")]
    pub has_beginning: DateTime<Utc>,
    #[serde(with = "result_time")]
    pub has_end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalObservation {
    #[serde(with = "result_time")]
    pub result_time: DateTime<Utc>,
    pub has_result: ObservationResult,
    pub made_by_sensor: String,
    pub observed_property: ObservedProperty,
    pub aggregation: Aggregation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Arc<Location>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phenomenon_time: Option<PhenomenonTime>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub used_procedures: Vec<String>,
}

impl CanonicalObservation {
    /// A scalar measurement.
    pub fn measurement(
        made_by_sensor: impl Into<String>,
        observed_property: ObservedProperty,
        result_time: DateTime<Utc>,
        value: f64,
        unit: Unit,
        aggregation: Aggregation,
    ) -> Self {
        Self {
            result_time,
            has_result: ObservationResult {
                value: ResultValue::Number(value),
                unit,
            },
            made_by_sensor: made_by_sensor.into(),
            observed_property,
            aggregation,
            location: None,
            phenomenon_time: None,
            used_procedures: Vec::new(),
        }
    }

    /// A position fix reported by the unit's GPS.
    pub fn position_fix(
        made_by_sensor: impl Into<String>,
        result_time: DateTime<Utc>,
        position: &Position,
        aggregation: Aggregation,
    ) -> Self {
        Self {
            result_time,
            has_result: ObservationResult {
                value: ResultValue::Geometry(Geometry::point(position)),
                unit: Unit::GeojsonGeometry,
            },
            made_by_sensor: made_by_sensor.into(),
            observed_property: ObservedProperty::Location,
            aggregation,
            location: None,
            phenomenon_time: None,
            used_procedures: Vec::new(),
        }
    }

    pub fn with_location(self, location: Option<Arc<Location>>) -> Self {
        Self { location, ..self }
    }

    pub fn with_averaging(self, phenomenon_time: PhenomenonTime, procedure: &str) -> Self {
        Self {
            phenomenon_time: Some(phenomenon_time),
            used_procedures: vec![procedure.to_string()],
            ..self
        }
    }

    pub fn is_position_fix(&self) -> bool {
        self.observed_property == ObservedProperty::Location
    }

    pub fn scalar_value(&self) -> Option<f64> {
        match self.has_result.value {
            ResultValue::Number(v) => Some(v),
            ResultValue::Geometry(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_measurement_json_shape() {
        let obs = CanonicalObservation::measurement(
            "zephyr-469-standard-cartridge-slot-b",
            ObservedProperty::Pm2p5MassConcentration,
            ts("2020-08-27T14:39:44Z"),
            6.0,
            Unit::MicrogramPerCubicMetre,
            Aggregation::Instant,
        );

        let value = serde_json::to_value(&obs).unwrap();
        assert_eq!(
            value,
            json!({
                "resultTime": "2020-08-27T14:39:44.000Z",
                "hasResult": {"value": 6.0, "unit": "microgram-per-cubic-metre"},
                "madeBySensor": "zephyr-469-standard-cartridge-slot-b",
                "observedProperty": "pm2p5-mass-concentration",
                "aggregation": "instant"
            })
        );
    }

    #[test]
    fn test_averaged_position_fix_json_shape() {
        let position = Position {
            longitude: -1.932965,
            latitude: 52.450895,
        };
        let at = ts("2020-08-27T14:45:00Z");
        let location = Arc::new(Location {
            id: "loc-1".to_string(),
            valid_at: at,
            geometry: Geometry::point(&position),
        });

        let obs = CanonicalObservation::position_fix("zephyr-469-gps-sensor", at, &position, Aggregation::Average)
            .with_location(Some(location))
            .with_averaging(
                PhenomenonTime {
                    has_beginning: ts("2020-08-27T14:30:00Z"),
                    has_end: at,
                },
                "zephyr-15-min-avg-of-10-sec-samples",
            );

        let value = serde_json::to_value(&obs).unwrap();
        assert_eq!(value["hasResult"]["unit"], "geojson-geometry");
        assert_eq!(value["hasResult"]["value"]["type"], "Point");
        assert_eq!(value["hasResult"]["value"]["coordinates"], json!([-1.932965, 52.450895]));
        assert_eq!(value["location"]["validAt"], "2020-08-27T14:45:00.000Z");
        assert_eq!(value["phenomenonTime"]["hasBeginning"], "2020-08-27T14:30:00.000Z");
        assert_eq!(value["usedProcedures"], json!(["zephyr-15-min-avg-of-10-sec-samples"]));

        let back: CanonicalObservation = serde_json::from_value(value).unwrap();
        assert_eq!(back, obs);
    }
}
