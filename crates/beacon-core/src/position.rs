//! Opaque position payloads.
//!
//! The relay only looks at `vehicleId`; latitude, longitude, timestamps and
//! anything else the emitter sends pass through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::InputError;
use crate::ids::VehicleId;

/// Field that every position payload must carry.
pub const VEHICLE_ID_FIELD: &str = "vehicleId";

/// A position report as sent by an emitter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionRecord(Map<String, Value>);

impl PositionRecord {
    /// Wrap an already-decoded JSON object.
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build a record from an arbitrary JSON value.
    ///
    /// Returns `None` when the value is not an object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Extract and validate the vehicle identifier.
    pub fn vehicle_id(&self) -> Result<VehicleId, InputError> {
        vehicle_id_field(self.0.get(VEHICLE_ID_FIELD))
    }

    /// Look up a passthrough field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Consume the record and return the JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Validate a raw `vehicleId` field taken from any inbound payload.
pub(crate) fn vehicle_id_field(value: Option<&Value>) -> Result<VehicleId, InputError> {
    match value {
        None | Some(Value::Null) => Err(InputError::MissingVehicleId),
        Some(Value::String(s)) => VehicleId::parse(s),
        Some(other) => Err(InputError::InvalidVehicleId(json_kind(other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
