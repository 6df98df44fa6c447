//! WebSocket message dispatch: decodes an inbound frame and routes it to
//! the fanout engine.
//!
//! Nothing is ever sent back in reply. A frame that cannot be decoded is
//! logged and counted, then dropped.

use beacon_core::protocol::InboundEvent;
use beacon_core::{ConnectionId, ProtocolError};
use beacon_fanout::{FanoutEngine, PublishOutcome, SubscribeOutcome, UnsubscribeOutcome};
use metrics::counter;
use tracing::{debug, warn};

use crate::metrics::WS_INVALID_FRAMES_TOTAL;

/// What happened to one inbound frame.
#[derive(Debug)]
pub enum HandleResult {
    /// `updateLocation` was applied.
    Published(PublishOutcome),
    /// `subscribeToVehicle` was applied.
    Subscribed(SubscribeOutcome),
    /// `unsubscribeFromVehicle` was applied.
    Unsubscribed(UnsubscribeOutcome),
    /// The frame was not a valid envelope.
    Dropped(ProtocolError),
}

/// Handle a text frame.
pub fn handle_text(text: &str, connection: &ConnectionId, engine: &FanoutEngine) -> HandleResult {
    match InboundEvent::decode(text) {
        Ok(event) => dispatch(event, connection, engine),
        Err(err) => drop_frame(connection, err),
    }
}

/// Handle a binary frame carrying UTF-8 JSON.
pub fn handle_binary(bytes: &[u8], connection: &ConnectionId, engine: &FanoutEngine) -> HandleResult {
    match InboundEvent::decode_bytes(bytes) {
        Ok(event) => dispatch(event, connection, engine),
        Err(err) => drop_frame(connection, err),
    }
}

fn dispatch(event: InboundEvent, connection: &ConnectionId, engine: &FanoutEngine) -> HandleResult {
    debug!(conn_id = %connection, event_type = event.event_type(), "dispatching event");
    match event {
        InboundEvent::UpdateLocation(record) => HandleResult::Published(engine.publish(record)),
        InboundEvent::SubscribeToVehicle(request) => {
            HandleResult::Subscribed(engine.subscribe(&request, connection))
        }
        InboundEvent::UnsubscribeFromVehicle(request) => {
            HandleResult::Unsubscribed(engine.unsubscribe(&request, connection))
        }
    }
}

fn drop_frame(connection: &ConnectionId, err: ProtocolError) -> HandleResult {
    counter!(WS_INVALID_FRAMES_TOTAL, "reason" => reason(&err)).increment(1);
    warn!(conn_id = %connection, error = %err, "dropping undecodable frame");
    HandleResult::Dropped(err)
}

fn reason(err: &ProtocolError) -> &'static str {
    match err {
        ProtocolError::Json(_) => "invalid_json",
        ProtocolError::UnknownEvent(_) => "unknown_event",
        ProtocolError::MissingType => "missing_type",
        ProtocolError::InvalidPayload(_) => "invalid_payload",
        ProtocolError::NotUtf8 => "not_utf8",
    }
}
