//! Heartbeat liveness monitoring.
//!
//! The session's write task sends the pings; this loop only decides when a
//! silent client is dead.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Watch a connection until it goes silent for `timeout`.
///
/// Checks every `interval`. Any inbound frame (pong included) resets the
/// clock through [`ClientConnection::mark_alive`].
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval);
    // Skip the immediate first tick
    let _ = check_interval.tick().await;

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if connection.last_pong_elapsed() >= timeout {
                    return HeartbeatResult::TimedOut;
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
