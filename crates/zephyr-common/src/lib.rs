//! Common types shared across the Zephyr ingest crates and services.

pub mod error;
pub mod granularity;
pub mod observation;
pub mod reading;
pub mod sensor;
pub mod time;

pub use error::{ErrorKind, IngestError, IngestResult};
pub use granularity::{Granularity, Lookback};
pub use observation::{
    Aggregation, CanonicalObservation, Geometry, Location, ObservationResult, ObservedProperty,
    PhenomenonTime, ResultValue, Unit, OBSERVATION_TOPIC,
};
pub use reading::{Cartridge, CartridgeKind, Position, SensorTimestepReading, Slot, Variable};
pub use sensor::{GranularityWatermark, LastKnownLocation, RosterEntry, WatermarkState};
pub use time::FetchWindow;
