//! Live connection registry and outbound fan-out.
//!
//! The hub is the transport side of [`Outbound`]: the fanout engine hands
//! it typed events, the hub serializes each one once and pushes the shared
//! text into per-connection queues without waiting. Clients that keep
//! overflowing their queue are evicted.

use std::collections::HashMap;
use std::sync::Arc;

use beacon_core::ConnectionId;
use beacon_core::protocol::OutboundEvent;
use beacon_fanout::Outbound;
use metrics::counter;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::metrics::{WS_BROADCAST_DROPS_TOTAL, WS_SLOW_CLIENT_EVICTIONS_TOTAL};

/// Connected clients indexed by connection ID.
pub struct ConnectionHub {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
    /// Lifetime drops after which a client is evicted.
    max_dropped: u64,
}

impl ConnectionHub {
    /// Create an empty hub.
    pub fn new(max_dropped: u64) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_dropped: max_dropped.max(1),
        }
    }

    /// Register a connection.
    pub fn add(&self, connection: Arc<ClientConnection>) {
        let _ = self
            .connections
            .write()
            .insert(connection.id.clone(), connection);
    }

    /// Unregister a connection. Returns it if it was present.
    pub fn remove(&self, connection_id: &str) -> Option<Arc<ClientConnection>> {
        self.connections.write().remove(connection_id)
    }

    /// Look up a live connection.
    pub fn get(&self, connection_id: &str) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(connection_id).cloned()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Push pre-serialized text to `targets`, evicting clients that crossed
    /// the drop limit. Returns how many queues accepted it.
    fn push(&self, targets: &[Arc<ClientConnection>], text: &Arc<String>) -> usize {
        let mut delivered = 0;
        let mut slow = Vec::new();
        for conn in targets {
            if conn.send(Arc::clone(text)) {
                delivered += 1;
                continue;
            }
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
            let drops = conn.drop_count();
            if drops >= self.max_dropped {
                slow.push(Arc::clone(conn));
            } else {
                debug!(conn_id = %conn.id, total_drops = drops, "outbound queue full, message dropped");
            }
        }
        for conn in slow {
            self.evict(&conn);
        }
        delivered
    }

    fn evict(&self, conn: &ClientConnection) {
        if self.remove(&conn.id).is_some() {
            counter!(WS_SLOW_CLIENT_EVICTIONS_TOTAL).increment(1);
            warn!(conn_id = %conn.id, drops = conn.drop_count(), "disconnecting slow client");
        }
        conn.evict();
    }

    fn encode(event: &OutboundEvent) -> Option<Arc<String>> {
        match event.encode() {
            Ok(text) => Some(Arc::new(text)),
            Err(e) => {
                warn!(event_type = event.event_type(), error = %e, "failed to serialize event");
                None
            }
        }
    }
}

impl Outbound for ConnectionHub {
    fn send_to(&self, connection: &ConnectionId, event: &OutboundEvent) -> bool {
        let Some(conn) = self.get(connection) else {
            debug!(conn_id = %connection, "send to unknown connection skipped");
            return false;
        };
        let Some(text) = Self::encode(event) else {
            return false;
        };
        self.push(&[conn], &text) == 1
    }

    fn broadcast(&self, event: &OutboundEvent) -> usize {
        let Some(text) = Self::encode(event) else {
            return 0;
        };
        let targets: Vec<_> = self.connections.read().values().cloned().collect();
        let delivered = self.push(&targets, &text);
        debug!(
            event_type = event.event_type(),
            recipients = targets.len(),
            delivered,
            "broadcast event to all"
        );
        delivered
    }

    fn send_to_many(&self, connections: &[ConnectionId], event: &OutboundEvent) -> usize {
        let Some(text) = Self::encode(event) else {
            return 0;
        };
        let targets: Vec<_> = {
            let conns = self.connections.read();
            connections
                .iter()
                .filter_map(|id| conns.get(id).cloned())
                .collect()
        };
        self.push(&targets, &text)
    }
}
