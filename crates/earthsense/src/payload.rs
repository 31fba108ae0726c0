//! Decoding of `dataForViewBySlots` responses.
//!
//! The vendor answers with two incompatible shapes. Unaveraged requests put the
//! slots at the top level:
//!
//! ```json
//! {"queryInfo": {"zNumber": 469}, "slotA": {...}, "slotB": {...}}
//! ```
//!
//! Averaged requests nest them under a human-readable averaging key:
//!
//! ```json
//! {"queryInfo": {"zNumber": 469}, "15 min average on the quarter hours": {"slotA": {...}, "slotB": {...}}}
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

use zephyr_common::{Granularity, IngestError, IngestResult, Slot};

/// One vendor slot: variable name to `{"data": [...]}`.
pub type SlotObject = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum ZNumber {
    Number(u32),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct QueryInfoWire {
    #[serde(rename = "zNumber")]
    z_number: Option<ZNumber>,
}

/// The query echo the vendor includes with every data response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryInfo {
    pub sensor_id: u32,
}

impl QueryInfo {
    fn from_wire(wire: Option<QueryInfoWire>) -> IngestResult<Self> {
        let z_number = wire
            .and_then(|w| w.z_number)
            .ok_or_else(|| IngestError::invalid_payload("Response has no queryInfo.zNumber"))?;

        let sensor_id = match z_number {
            ZNumber::Number(n) => n,
            ZNumber::Text(s) => s.trim().parse().map_err(|_| {
                IngestError::invalid_payload(format!("queryInfo.zNumber '{}' is not a number", s))
            })?,
        };

        Ok(Self { sensor_id })
    }
}

/// The (up to two) slots of one response.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SlotPair {
    #[serde(rename = "slotA", default)]
    pub slot_a: Option<SlotObject>,
    #[serde(rename = "slotB", default)]
    pub slot_b: Option<SlotObject>,
}

impl SlotPair {
    /// Present slots, A before B.
    pub fn present(&self) -> Vec<(Slot, &SlotObject)> {
        let mut slots = Vec::with_capacity(2);
        if let Some(a) = &self.slot_a {
            slots.push((Slot::A, a));
        }
        if let Some(b) = &self.slot_b {
            slots.push((Slot::B, b));
        }
        slots
    }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "queryInfo", default)]
    query_info: Option<QueryInfoWire>,
    #[serde(flatten)]
    slots: SlotPair,
}

#[derive(Debug, Deserialize)]
struct AveragedEnvelope {
    #[serde(rename = "queryInfo", default)]
    query_info: Option<QueryInfoWire>,
    #[serde(flatten)]
    averages: Map<String, Value>,
}

/// A decoded vendor response.
#[derive(Debug, Clone, PartialEq)]
pub enum VendorPayload {
    Raw {
        query: QueryInfo,
        slots: SlotPair,
    },
    Averaged {
        query: QueryInfo,
        granularity: Granularity,
        slots: SlotPair,
    },
}

impl VendorPayload {
    /// Decode a response to a request made at `granularity`.
    pub fn decode(value: Value, granularity: Granularity) -> IngestResult<Self> {
        if !value.is_object() {
            return Err(IngestError::invalid_payload(
                "Expected the Earthsense response to be a JSON object",
            ));
        }

        match granularity.averaging_key() {
            None => {
                let envelope: RawEnvelope = serde_json::from_value(value)?;
                Ok(VendorPayload::Raw {
                    query: QueryInfo::from_wire(envelope.query_info)?,
                    slots: envelope.slots,
                })
            }
            Some(key) => {
                let mut envelope: AveragedEnvelope = serde_json::from_value(value)?;
                let nested = envelope
                    .averages
                    .remove(key)
                    .filter(Value::is_object)
                    .ok_or_else(|| IngestError::unexpected_averaged_shape(key))?;
                Ok(VendorPayload::Averaged {
                    query: QueryInfo::from_wire(envelope.query_info)?,
                    granularity,
                    slots: serde_json::from_value(nested)?,
                })
            }
        }
    }

    pub fn sensor_id(&self) -> u32 {
        match self {
            VendorPayload::Raw { query, .. } | VendorPayload::Averaged { query, .. } => {
                query.sensor_id
            }
        }
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            VendorPayload::Raw { .. } => Granularity::Raw,
            VendorPayload::Averaged { granularity, .. } => *granularity,
        }
    }

    pub fn slots(&self) -> &SlotPair {
        match self {
            VendorPayload::Raw { slots, .. } | VendorPayload::Averaged { slots, .. } => slots,
        }
    }
}
