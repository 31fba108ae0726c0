//! Earthsense Zephyr API: HTTP client, roster parsing and decoding of the
//! slot-based data responses into uniform per-timestep readings.

pub mod client;
pub mod payload;
pub mod reformat;
pub mod roster;
pub mod slot;

pub use client::{EarthsenseClient, EarthsenseConfig, VendorApi, DEFAULT_BASE_URL};
pub use payload::{QueryInfo, SlotObject, SlotPair, VendorPayload};
pub use reformat::{reformat, reformat_averaged, reformat_raw, reformat_response};
pub use roster::{parse_roster, RosterOptions};
pub use slot::{parse_slot, SlotTimestep};
