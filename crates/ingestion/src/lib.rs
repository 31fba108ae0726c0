//! Zephyr ingestion library.
//!
//! Turns decoded Earthsense readings into canonical observations and drives
//! the incremental poll cycle.
//!
//! # Architecture
//!
//! - [`convert`]: readings to observations, with unit conversion and shared
//!   locations
//! - [`planner`]: fetch windows from watermarks, bounded by per-granularity
//!   look-back ceilings
//! - [`orchestrator`]: roster, fetch, convert, publish and persist per sensor
//!   and granularity

pub mod convert;
pub mod orchestrator;
pub mod planner;

pub use convert::{to_averaged_observations, to_instant_observations, IdGenerator, ObservationConverter};
pub use orchestrator::{
    Clock, CycleFailure, CycleSummary, IngestOrchestrator, OrchestratorOptions, Phase,
};
pub use planner::{next_watermark, plan_window, WatermarkUpdate};
