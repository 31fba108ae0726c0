//! Merging the slots of a vendor response into one list of readings.

use serde_json::Value;
use tracing::debug;

use zephyr_common::{Granularity, IngestError, IngestResult, SensorTimestepReading};

use crate::payload::VendorPayload;
use crate::slot::parse_slot_from;

/// Averaged series start with a placeholder timestep whose values are all null.
const AVERAGED_LEADING_PLACEHOLDERS: usize = 1;

/// Flatten a decoded payload into readings, slot A first, each slot in
/// chronological order.
pub fn reformat(payload: &VendorPayload) -> IngestResult<Vec<SensorTimestepReading>> {
    let skip = match payload {
        VendorPayload::Raw { .. } => 0,
        VendorPayload::Averaged { .. } => AVERAGED_LEADING_PLACEHOLDERS,
    };
    let sensor_id = payload.sensor_id();

    let mut readings = Vec::new();
    for (slot, object) in payload.slots().present() {
        let timesteps = parse_slot_from(object, slot, skip)?;
        debug!(
            sensor_id,
            slot = slot.payload_key(),
            timesteps = timesteps.len(),
            "Parsed slot"
        );
        readings.extend(timesteps.into_iter().map(|t| t.attach(sensor_id)));
    }

    Ok(readings)
}

/// Decode and flatten an unaveraged response.
pub fn reformat_raw(value: Value) -> IngestResult<Vec<SensorTimestepReading>> {
    reformat(&VendorPayload::decode(value, Granularity::Raw)?)
}

/// Decode and flatten a response averaged at `granularity`.
pub fn reformat_averaged(
    value: Value,
    granularity: Granularity,
) -> IngestResult<Vec<SensorTimestepReading>> {
    if !granularity.is_averaged() {
        return Err(IngestError::invalid_granularity(granularity));
    }
    reformat(&VendorPayload::decode(value, granularity)?)
}

/// Decode and flatten a response to a request made at `granularity`.
pub fn reformat_response(
    value: Value,
    granularity: Granularity,
) -> IngestResult<Vec<SensorTimestepReading>> {
    if granularity.is_averaged() {
        reformat_averaged(value, granularity)
    } else {
        reformat_raw(value)
    }
}
