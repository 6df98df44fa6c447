//! `BeaconServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use beacon_core::ConnectionId;
use beacon_fanout::FanoutEngine;
use beacon_settings::{BeaconSettings, ServerSettings};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REFUSED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::hub::ConnectionHub;
use crate::websocket::session::run_ws_session;

/// Body of `GET /`.
pub const BANNER: &str = "GPS tracking relay online";

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Subscription and fanout engine.
    pub engine: Arc<FanoutEngine>,
    /// Live WebSocket connections.
    pub hub: Arc<ConnectionHub>,
    /// Transport settings.
    pub settings: Arc<ServerSettings>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// One permit per allowed concurrent WebSocket connection.
    pub connection_slots: Arc<Semaphore>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The relay server.
pub struct BeaconServer {
    settings: Arc<ServerSettings>,
    engine: Arc<FanoutEngine>,
    hub: Arc<ConnectionHub>,
    shutdown: Arc<ShutdownCoordinator>,
    connection_slots: Arc<Semaphore>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl BeaconServer {
    /// Create a server with a fresh engine and an empty hub.
    pub fn new(settings: &BeaconSettings, metrics: PrometheusHandle) -> Self {
        let hub = Arc::new(ConnectionHub::new(settings.server.max_dropped_messages));
        let engine = Arc::new(FanoutEngine::new(
            hub.clone(),
            settings.fanout.publish_scope,
        ));
        Self {
            settings: Arc::new(settings.server.clone()),
            engine,
            hub,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            connection_slots: Arc::new(Semaphore::new(settings.server.max_connections)),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            engine: self.engine.clone(),
            hub: self.hub.clone(),
            settings: self.settings.clone(),
            shutdown: self.shutdown.clone(),
            connection_slots: self.connection_slots.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/", get(index_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.settings.host, self.settings.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server terminated with error");
            }
        });

        info!(addr = %local_addr, scope = self.engine.scope().as_str(), "beacon server listening");
        Ok((local_addr, handle))
    }

    /// Get the fanout engine.
    pub fn engine(&self) -> &Arc<FanoutEngine> {
        &self.engine
    }

    /// Get the connection hub.
    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the transport settings.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Connection slots not currently reserved.
    pub fn available_slots(&self) -> usize {
        self.connection_slots.available_permits()
    }
}

/// GET /
async fn index_handler() -> &'static str {
    BANNER
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let resp = health::health_check(
        state.start_time,
        state.hub.connection_count(),
        state.engine.snapshot(),
    );
    Json(resp)
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let slot = match reserve_slot(&state) {
        Ok(slot) => slot,
        Err(refusal) => return refusal,
    };

    let connection_id = ConnectionId::new();
    let max_message_size = state.settings.max_message_size;
    ws.max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, connection_id, state, slot))
}

/// Take a connection slot before upgrading.
///
/// The permit lives as long as the session, so concurrent upgrades can never
/// exceed `max_connections`.
fn reserve_slot(state: &AppState) -> Result<OwnedSemaphorePermit, Response> {
    if state.shutdown.is_shutting_down() {
        return Err((StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response());
    }
    Arc::clone(&state.connection_slots)
        .try_acquire_owned()
        .map_err(|_| {
            counter!(WS_CONNECTIONS_REFUSED_TOTAL).increment(1);
            warn!(
                active = state.hub.connection_count(),
                max = state.settings.max_connections,
                "connection limit reached, refusing upgrade"
            );
            (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response()
        })
}
