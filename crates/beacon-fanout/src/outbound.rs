//! Delivery seam between the engine and the transport.

use beacon_core::ConnectionId;
use beacon_core::protocol::OutboundEvent;

/// Non-blocking delivery of outbound events to live connections.
///
/// The engine calls these while holding its state lock, so implementations
/// must not block and must not call back into the engine. Delivery is
/// best-effort: a full or vanished connection just counts as not delivered.
pub trait Outbound: Send + Sync {
    /// Queue `event` for one connection. Returns `true` if it was queued.
    fn send_to(&self, connection: &ConnectionId, event: &OutboundEvent) -> bool;

    /// Queue `event` for every live connection. Returns how many accepted it.
    fn broadcast(&self, event: &OutboundEvent) -> usize;

    /// Queue `event` for each of `connections`. Returns how many accepted it.
    fn send_to_many(&self, connections: &[ConnectionId], event: &OutboundEvent) -> usize {
        connections
            .iter()
            .filter(|connection| self.send_to(connection, event))
            .count()
    }
}
