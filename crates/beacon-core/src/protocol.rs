//! Wire protocol: JSON envelopes carried over WebSocket frames.
//!
//! Every frame is an object `{"type": "<event>", "data": <payload>}`.
//!
//! | Direction | `type` | `data` |
//! |-----------|--------|--------|
//! | in  | `updateLocation` | position record (must carry `vehicleId`) |
//! | in  | `subscribeToVehicle` | `{ "vehicleId": string }` |
//! | in  | `unsubscribeFromVehicle` | `{ "vehicleId": string }` |
//! | out | `locationUpdate` | the cached / published position record |
//! | out | `connection.established` | `{ "connectionId": string }` |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{InputError, ProtocolError};
use crate::ids::{ConnectionId, VehicleId};
use crate::position::{PositionRecord, VEHICLE_ID_FIELD, vehicle_id_field};

/// Inbound: an emitter reports a new position.
pub const UPDATE_LOCATION: &str = "updateLocation";
/// Inbound: a viewer starts following a vehicle.
pub const SUBSCRIBE_TO_VEHICLE: &str = "subscribeToVehicle";
/// Inbound: a viewer stops following a vehicle.
pub const UNSUBSCRIBE_FROM_VEHICLE: &str = "unsubscribeFromVehicle";
/// Outbound: a position record pushed to one or many viewers.
pub const LOCATION_UPDATE: &str = "locationUpdate";
/// Outbound: greeting carrying the server-assigned connection ID.
pub const CONNECTION_ESTABLISHED: &str = "connection.established";

/// Payload of `subscribeToVehicle` / `unsubscribeFromVehicle`.
///
/// The identifier is validated lazily so that a missing or malformed value
/// can be reported as an [`InputError`] instead of a decode failure.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleRequest {
    #[serde(rename = "vehicleId", default, skip_serializing_if = "Option::is_none")]
    vehicle_id: Option<Value>,
}

impl VehicleRequest {
    /// Request for a known vehicle identifier.
    pub fn new(vehicle_id: impl Into<String>) -> Self {
        Self {
            vehicle_id: Some(Value::String(vehicle_id.into())),
        }
    }

    /// Request with no identifier at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate and return the requested vehicle.
    pub fn vehicle_id(&self) -> Result<VehicleId, InputError> {
        vehicle_id_field(self.vehicle_id.as_ref())
    }

    fn from_map(mut map: Map<String, Value>) -> Self {
        Self {
            vehicle_id: map.remove(VEHICLE_ID_FIELD),
        }
    }
}

impl From<&VehicleId> for VehicleRequest {
    fn from(id: &VehicleId) -> Self {
        Self::new(id.as_str())
    }
}

/// A decoded client → server event.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundEvent {
    /// `updateLocation`
    UpdateLocation(PositionRecord),
    /// `subscribeToVehicle`
    SubscribeToVehicle(VehicleRequest),
    /// `unsubscribeFromVehicle`
    UnsubscribeFromVehicle(VehicleRequest),
}

impl InboundEvent {
    /// Wire name of this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::UpdateLocation(_) => UPDATE_LOCATION,
            Self::SubscribeToVehicle(_) => SUBSCRIBE_TO_VEHICLE,
            Self::UnsubscribeFromVehicle(_) => UNSUBSCRIBE_FROM_VEHICLE,
        }
    }

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Decode a binary frame (UTF-8 JSON).
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotUtf8)?;
        Self::decode(text)
    }

    /// Decode an already-parsed envelope.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut envelope) = value else {
            return Err(ProtocolError::MissingType);
        };
        let event_type = match envelope.remove("type") {
            Some(Value::String(t)) => t,
            _ => return Err(ProtocolError::MissingType),
        };
        let data = match envelope.remove("data") {
            Some(Value::Object(map)) => map,
            _ => {
                return if is_known(&event_type) {
                    Err(ProtocolError::InvalidPayload(event_type))
                } else {
                    Err(ProtocolError::UnknownEvent(event_type))
                };
            }
        };
        match event_type.as_str() {
            UPDATE_LOCATION => Ok(Self::UpdateLocation(PositionRecord::new(data))),
            SUBSCRIBE_TO_VEHICLE => Ok(Self::SubscribeToVehicle(VehicleRequest::from_map(data))),
            UNSUBSCRIBE_FROM_VEHICLE => {
                Ok(Self::UnsubscribeFromVehicle(VehicleRequest::from_map(data)))
            }
            _ => Err(ProtocolError::UnknownEvent(event_type)),
        }
    }

    /// Encode as a wire envelope (used by clients and tests).
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let data = match self {
            Self::UpdateLocation(record) => serde_json::to_value(record)?,
            Self::SubscribeToVehicle(req) | Self::UnsubscribeFromVehicle(req) => {
                serde_json::to_value(req)?
            }
        };
        serde_json::to_string(&serde_json::json!({
            "type": self.event_type(),
            "data": data,
        }))
    }
}

fn is_known(event_type: &str) -> bool {
    matches!(
        event_type,
        UPDATE_LOCATION | SUBSCRIBE_TO_VEHICLE | UNSUBSCRIBE_FROM_VEHICLE
    )
}

/// Greeting payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// Server-assigned connection ID.
    pub connection_id: ConnectionId,
}

/// A server → client event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OutboundEvent {
    /// Latest position of a vehicle.
    #[serde(rename = "locationUpdate")]
    LocationUpdate(PositionRecord),
    /// Sent once right after the upgrade.
    #[serde(rename = "connection.established")]
    ConnectionEstablished(ConnectionInfo),
}

impl OutboundEvent {
    /// Wire name of this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LocationUpdate(_) => LOCATION_UPDATE,
            Self::ConnectionEstablished(_) => CONNECTION_ESTABLISHED,
        }
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
