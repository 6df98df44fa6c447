//! Error types for inbound validation and wire decoding.
//!
//! Neither error ever reaches a client: the transport logs and drops the
//! offending frame. They exist so the drop reason is structured in logs and
//! metrics.

use thiserror::Error;

/// A decoded payload that fails relay-level validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// The payload has no `vehicleId` field.
    #[error("payload has no vehicleId")]
    MissingVehicleId,
    /// `vehicleId` is present but empty.
    #[error("vehicleId is empty")]
    EmptyVehicleId,
    /// `vehicleId` is present but not a string.
    #[error("vehicleId must be a string, got {0}")]
    InvalidVehicleId(&'static str),
}

impl InputError {
    /// Short label used for the `reason` metric dimension.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingVehicleId => "missing_vehicle_id",
            Self::EmptyVehicleId => "empty_vehicle_id",
            Self::InvalidVehicleId(_) => "invalid_vehicle_id",
        }
    }
}

/// A WebSocket frame that cannot be decoded into an inbound event.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON, or not an object envelope.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The envelope names an event this relay does not handle.
    #[error("unknown event type: {0}")]
    UnknownEvent(String),
    /// The envelope has no `type` field.
    #[error("envelope has no type")]
    MissingType,
    /// The envelope's `data` is absent or not a JSON object.
    #[error("event {0} requires an object payload")]
    InvalidPayload(String),
    /// A binary frame that is not UTF-8.
    #[error("binary frame is not UTF-8")]
    NotUtf8,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
