//! Connection lifecycle tracking.
//!
//! A [`LifecycleGuard`] is created right after the upgrade and lives for the
//! whole session. Closing it (explicitly or by dropping it) unregisters the
//! connection from the hub and releases its subscriptions in the engine.
//! The release happens once, whatever ended the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use beacon_core::ConnectionId;
use beacon_fanout::FanoutEngine;
use metrics::{counter, gauge, histogram};
use tracing::info;

use super::connection::ClientConnection;
use super::hub::ConnectionHub;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Why a connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectCause {
    /// The client sent a close frame.
    ClientClosed,
    /// The socket stream ended without a close frame.
    StreamEnded,
    /// Reading from the socket failed.
    StreamError,
    /// Writing to the socket failed.
    SendFailed,
    /// No pong within the heartbeat timeout.
    HeartbeatTimeout,
    /// The hub evicted a client that could not keep up.
    Evicted,
    /// The server is shutting down.
    ServerShutdown,
    /// The session task ended without closing (panic or abort).
    Aborted,
}

impl DisconnectCause {
    /// Label for logs and the `cause` metric dimension.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::StreamEnded => "stream_ended",
            Self::StreamError => "stream_error",
            Self::SendFailed => "send_failed",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Evicted => "evicted",
            Self::ServerShutdown => "server_shutdown",
            Self::Aborted => "aborted",
        }
    }
}

/// Runs the disconnect sequence for one connection exactly once.
pub struct LifecycleGuard {
    connection: Arc<ClientConnection>,
    hub: Arc<ConnectionHub>,
    engine: Arc<FanoutEngine>,
    closed: AtomicBool,
}

impl LifecycleGuard {
    /// Register `connection` with the hub and start tracking it.
    pub fn register(
        connection: Arc<ClientConnection>,
        hub: Arc<ConnectionHub>,
        engine: Arc<FanoutEngine>,
    ) -> Self {
        hub.add(Arc::clone(&connection));
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(conn_id = %connection.id, "client connected");
        Self {
            connection,
            hub,
            engine,
            closed: AtomicBool::new(false),
        }
    }

    /// The tracked connection's ID.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection.id
    }

    /// Whether the disconnect sequence already ran.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Unregister the connection and release its subscriptions.
    ///
    /// Returns `false` if the guard was already closed.
    pub fn close(&self, cause: DisconnectCause) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let id = &self.connection.id;
        let _ = self.hub.remove(id);
        let outcome = self.engine.disconnect(id);

        counter!(WS_DISCONNECTIONS_TOTAL, "cause" => cause.as_str()).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        let age = self.connection.age();
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(age.as_secs_f64());
        info!(
            conn_id = %id,
            cause = cause.as_str(),
            released = outcome.released.len(),
            duration_ms = age.as_millis() as u64,
            "client disconnected"
        );
        true
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        let _ = self.close(DisconnectCause::Aborted);
    }
}
