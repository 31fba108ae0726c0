//! Expansion of per-timestep readings into canonical observations.

use std::sync::Arc;

use uuid::Uuid;

use zephyr_common::{
    Aggregation, CanonicalObservation, Geometry, Granularity, IngestError, IngestResult,
    Location, ObservedProperty, PhenomenonTime, SensorTimestepReading, Unit, Variable,
};

/// A variable that is published, and how.
struct Surfaced {
    variable: Variable,
    property: ObservedProperty,
    unit: Unit,
    /// Vendor value is divided by this to get `unit`.
    divisor: f64,
}

/// Published variables in emission order. Board temperature and humidity are
/// not surfaced.
const SURFACED: [Surfaced; 9] = [
    Surfaced {
        variable: Variable::O3,
        property: ObservedProperty::OzoneMassConcentration,
        unit: Unit::MicrogramPerCubicMetre,
        divisor: 1.0,
    },
    Surfaced {
        variable: Variable::No,
        property: ObservedProperty::NitrogenMonoxideMassConcentration,
        unit: Unit::MicrogramPerCubicMetre,
        divisor: 1.0,
    },
    Surfaced {
        variable: Variable::No2,
        property: ObservedProperty::NitrogenDioxideMassConcentration,
        unit: Unit::MicrogramPerCubicMetre,
        divisor: 1.0,
    },
    Surfaced {
        variable: Variable::Pm1,
        property: ObservedProperty::Pm1MassConcentration,
        unit: Unit::MicrogramPerCubicMetre,
        divisor: 1.0,
    },
    Surfaced {
        variable: Variable::Pm2p5,
        property: ObservedProperty::Pm2p5MassConcentration,
        unit: Unit::MicrogramPerCubicMetre,
        divisor: 1.0,
    },
    Surfaced {
        variable: Variable::Pm10,
        property: ObservedProperty::Pm10MassConcentration,
        unit: Unit::MicrogramPerCubicMetre,
        divisor: 1.0,
    },
    Surfaced {
        variable: Variable::AmbHumidity,
        property: ObservedProperty::RelativeHumidity,
        unit: Unit::Percent,
        divisor: 1.0,
    },
    Surfaced {
        variable: Variable::AmbTempC,
        property: ObservedProperty::AirTemperature,
        unit: Unit::DegreeCelsius,
        divisor: 1.0,
    },
    // Pa to hPa
    Surfaced {
        variable: Variable::AmbPressure,
        property: ObservedProperty::AirPressure,
        unit: Unit::Hectopascal,
        divisor: 100.0,
    },
];

/// Generates ids for location objects.
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Averaging metadata stamped onto every observation of an averaged reading.
#[derive(Clone, Copy)]
struct Averaging {
    duration: chrono::Duration,
    procedure: &'static str,
}

/// Converts readings into canonical observations.
#[derive(Clone)]
pub struct ObservationConverter {
    new_location_id: IdGenerator,
}

impl Default for ObservationConverter {
    fn default() -> Self {
        Self {
            new_location_id: Arc::new(|| Uuid::new_v4().to_string()),
        }
    }
}

impl ObservationConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the location id source, e.g. with a counter in tests.
    pub fn with_id_generator(generator: IdGenerator) -> Self {
        Self {
            new_location_id: generator,
        }
    }

    /// Convert unaveraged readings.
    pub fn to_instant_observations(
        &self,
        readings: &[SensorTimestepReading],
    ) -> Vec<CanonicalObservation> {
        self.expand_all(readings, Aggregation::Instant, None)
    }

    /// Convert readings averaged at `granularity`.
    pub fn to_averaged_observations(
        &self,
        readings: &[SensorTimestepReading],
        granularity: Granularity,
    ) -> IngestResult<Vec<CanonicalObservation>> {
        let (Some(duration), Some(procedure)) =
            (granularity.averaging_duration(), granularity.procedure_id())
        else {
            return Err(IngestError::invalid_granularity(granularity));
        };

        Ok(self.expand_all(
            readings,
            Aggregation::Average,
            Some(Averaging {
                duration,
                procedure,
            }),
        ))
    }

    /// Convert readings fetched at `granularity`.
    pub fn convert(
        &self,
        readings: &[SensorTimestepReading],
        granularity: Granularity,
    ) -> IngestResult<Vec<CanonicalObservation>> {
        if granularity.is_averaged() {
            self.to_averaged_observations(readings, granularity)
        } else {
            Ok(self.to_instant_observations(readings))
        }
    }

    fn expand_all(
        &self,
        readings: &[SensorTimestepReading],
        aggregation: Aggregation,
        averaging: Option<Averaging>,
    ) -> Vec<CanonicalObservation> {
        let mut ordered: Vec<&SensorTimestepReading> = readings.iter().collect();
        // Stable, so slot order is kept within a timestamp
        ordered.sort_by_key(|r| r.timestamp);

        ordered
            .into_iter()
            .flat_map(|reading| self.expand(reading, aggregation, averaging))
            .collect()
    }

    fn expand(
        &self,
        reading: &SensorTimestepReading,
        aggregation: Aggregation,
        averaging: Option<Averaging>,
    ) -> Vec<CanonicalObservation> {
        let location = reading.position.map(|position| {
            Arc::new(Location {
                id: (self.new_location_id)(),
                valid_at: reading.timestamp,
                geometry: Geometry::point(&position),
            })
        });

        let mut observations = Vec::with_capacity(SURFACED.len() + 1);

        if let Some(position) = &reading.position {
            observations.push(CanonicalObservation::position_fix(
                reading.gps_sensor_id(),
                reading.timestamp,
                position,
                aggregation,
            ));
        }

        let channel = reading.channel_sensor_id();
        for surfaced in &SURFACED {
            if let Some(value) = reading.value(surfaced.variable) {
                observations.push(CanonicalObservation::measurement(
                    channel.as_str(),
                    surfaced.property,
                    reading.timestamp,
                    value / surfaced.divisor,
                    surfaced.unit,
                    aggregation,
                ));
            }
        }

        observations
            .into_iter()
            .map(|observation| {
                let observation = observation.with_location(location.clone());
                match averaging {
                    Some(averaging) => observation.with_averaging(
                        PhenomenonTime {
                            has_beginning: reading.timestamp - averaging.duration,
                            has_end: reading.timestamp,
                        },
                        averaging.procedure,
                    ),
                    None => observation,
                }
            })
            .collect()
    }
}

/// [`ObservationConverter::to_instant_observations`] with random location ids.
pub fn to_instant_observations(readings: &[SensorTimestepReading]) -> Vec<CanonicalObservation> {
    ObservationConverter::default().to_instant_observations(readings)
}

/// [`ObservationConverter::to_averaged_observations`] with random location ids.
pub fn to_averaged_observations(
    readings: &[SensorTimestepReading],
    granularity: Granularity,
) -> IngestResult<Vec<CanonicalObservation>> {
    ObservationConverter::default().to_averaged_observations(readings, granularity)
}
