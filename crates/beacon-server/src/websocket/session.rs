//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use beacon_core::ConnectionId;
use beacon_core::protocol::{ConnectionInfo, OutboundEvent};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::{OwnedSemaphorePermit, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::connection::ClientConnection;
use super::handler::{handle_binary, handle_text};
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::lifecycle::{DisconnectCause, LifecycleGuard};
use crate::server::AppState;

/// How long the write task gets to flush queued frames and the close frame.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Run a WebSocket session for a connected client.
///
/// 1. Queues a `connection.established` greeting with the connection ID
/// 2. Registers the connection with the hub behind a [`LifecycleGuard`]
/// 3. Dispatches inbound frames to the fanout engine
/// 4. Forwards queued outbound frames and sends periodic pings
/// 5. Ends on close, stream failure, heartbeat timeout, eviction or
///    shutdown, then releases the connection exactly once
///
/// `slot` is the connection-cap permit reserved before the upgrade; it is
/// released when the session returns.
#[instrument(skip_all, fields(conn_id = %connection_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    connection_id: ConnectionId,
    state: AppState,
    slot: OwnedSemaphorePermit,
) {
    let _slot = slot;
    let (ws_tx, mut ws_rx) = ws.split();
    let settings = Arc::clone(&state.settings);

    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(settings.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(connection_id, send_tx));

    // Greeting goes in first so no fanout can overtake it.
    greet(&connection);
    let guard = LifecycleGuard::register(
        Arc::clone(&connection),
        Arc::clone(&state.hub),
        Arc::clone(&state.engine),
    );

    let stop = CancellationToken::new();
    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        send_rx,
        settings.heartbeat_interval(),
        stop.clone(),
    ));
    let heartbeat = run_heartbeat(
        Arc::clone(&connection),
        settings.heartbeat_interval(),
        settings.heartbeat_timeout(),
        stop.clone(),
    );
    tokio::pin!(heartbeat);
    let evicted = connection.eviction_token();
    let shutdown = state.shutdown.token();

    let cause = loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let msg = match frame {
                    None => break DisconnectCause::StreamEnded,
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read failed");
                        break DisconnectCause::StreamError;
                    }
                    Some(Ok(msg)) => msg,
                };
                connection.mark_alive();
                match msg {
                    Message::Text(text) => {
                        let _ = handle_text(text.as_str(), &connection.id, &state.engine);
                    }
                    Message::Binary(bytes) => {
                        let _ = handle_binary(&bytes, &connection.id, &state.engine);
                    }
                    Message::Close(_) => break DisconnectCause::ClientClosed,
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            result = &mut heartbeat => {
                if result == HeartbeatResult::TimedOut {
                    warn!(
                        timeout_ms = settings.heartbeat_timeout_ms,
                        "client unresponsive, disconnecting"
                    );
                }
                break DisconnectCause::HeartbeatTimeout;
            }
            _ = &mut writer => break DisconnectCause::SendFailed,
            () = evicted.cancelled() => break DisconnectCause::Evicted,
            () = shutdown.cancelled() => break DisconnectCause::ServerShutdown,
        }
    };

    let _ = guard.close(cause);
    stop.cancel();
    if cause != DisconnectCause::SendFailed
        && tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut writer).await.is_err()
    {
        writer.abort();
    }
}

/// Queue the `connection.established` greeting.
fn greet(connection: &ClientConnection) {
    let event = OutboundEvent::ConnectionEstablished(ConnectionInfo {
        connection_id: connection.id.clone(),
    });
    match event.encode() {
        Ok(json) => {
            let _ = connection.send(Arc::new(json));
        }
        Err(e) => warn!(error = %e, "failed to serialize greeting"),
    }
}

/// Forward queued frames to the socket and ping every `ping_every`.
///
/// Returns early if the socket rejects a write. On `stop`, flushes what is
/// already queued and sends a close frame.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<Arc<String>>,
    ping_every: Duration,
    stop: CancellationToken,
) {
    let mut ping_interval = tokio::time::interval(ping_every);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            msg = queue.recv() => {
                let Some(text) = msg else { break };
                if sink.send(Message::Text(text.as_str().into())).await.is_err() {
                    return;
                }
            }
            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(vec![].into())).await.is_err() {
                    return;
                }
            }
            () = stop.cancelled() => break,
        }
    }

    while let Ok(text) = queue.try_recv() {
        if sink.send(Message::Text(text.as_str().into())).await.is_err() {
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
}
