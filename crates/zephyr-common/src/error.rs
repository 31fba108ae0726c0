//! Error types for the Zephyr ingest services.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type alias using IngestError.
pub type IngestResult<T> = Result<T, IngestError>;

/// The category of an ingest failure.
///
/// Callers decide how far a failure propagates by matching on the kind, never
/// on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    // === Vendor payload errors ===
    /// Variable arrays within one slot disagree in length.
    MisalignedSlotData,
    /// An averaged payload lacks the key for the requested granularity.
    UnexpectedAveragedShape,
    /// The payload is structurally valid JSON but not a usable Earthsense response.
    InvalidPayload,
    /// A granularity name or value that the operation does not support.
    InvalidGranularity,

    // === Collaborator errors ===
    /// The vendor API could not be reached or returned an error status.
    VendorFetchFailure,
    /// The vendor roster (list of Zephyrs) could not be obtained.
    RosterFailure,
    /// The watermark store has no record of the sensor.
    SensorNotFound,
    /// The watermark store failed while reading.
    WatermarkLoadFailure,
    /// The watermark store failed while writing.
    WatermarkPersistFailure,
    /// The event bus rejected or failed to accept an event.
    PublishFailure,

    // === Infrastructure ===
    Configuration,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MisalignedSlotData => "MisalignedSlotData",
            Self::UnexpectedAveragedShape => "UnexpectedAveragedShape",
            Self::InvalidPayload => "InvalidPayload",
            Self::InvalidGranularity => "InvalidGranularity",
            Self::VendorFetchFailure => "VendorFetchFailure",
            Self::RosterFailure => "RosterFailure",
            Self::SensorNotFound => "SensorNotFound",
            Self::WatermarkLoadFailure => "WatermarkLoadFailure",
            Self::WatermarkPersistFailure => "WatermarkPersistFailure",
            Self::PublishFailure => "PublishFailure",
            Self::Configuration => "Configuration",
        }
    }

    /// HTTP-style status code for this kind of failure.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidGranularity => 400,
            Self::SensorNotFound => 404,

            Self::MisalignedSlotData
            | Self::UnexpectedAveragedShape
            | Self::InvalidPayload
            | Self::VendorFetchFailure
            | Self::RosterFailure => 502,

            Self::PublishFailure => 503,

            Self::WatermarkLoadFailure | Self::WatermarkPersistFailure | Self::Configuration => {
                500
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary error type for ingest operations.
///
/// `message` is safe to surface (status API, summaries); `detail` holds the
/// underlying cause and is only meant for logs.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[error("{kind}: {message}")]
pub struct IngestError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip)]
    pub detail: Option<String>,
}

impl IngestError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    /// Attach a private detail (e.g. the underlying driver error).
    pub fn with_detail(mut self, detail: impl fmt::Display) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    pub fn misaligned_slot(expected_len: usize) -> Self {
        Self::new(
            ErrorKind::MisalignedSlotData,
            format!(
                "Not every variable's data is the same length. Expected all variables to have a length of {}",
                expected_len
            ),
        )
    }

    pub fn unexpected_averaged_shape(key: &str) -> Self {
        Self::new(
            ErrorKind::UnexpectedAveragedShape,
            format!("Averaged response does not contain the key '{}'", key),
        )
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidPayload, message)
    }

    pub fn invalid_granularity(name: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::InvalidGranularity,
            format!("Unsupported granularity: {}", name),
        )
    }

    pub fn vendor_fetch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::VendorFetchFailure, message)
    }

    pub fn roster(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RosterFailure, message)
    }

    pub fn sensor_not_found(sensor_id: u32) -> Self {
        Self::new(
            ErrorKind::SensorNotFound,
            format!("A zephyr with zNumber '{}' could not be found", sensor_id),
        )
    }

    pub fn watermark_load(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WatermarkLoadFailure, message)
    }

    pub fn watermark_persist(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WatermarkPersistFailure, message)
    }

    pub fn publish(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PublishFailure, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::invalid_payload("Response is not a valid Earthsense payload").with_detail(err)
    }
}
