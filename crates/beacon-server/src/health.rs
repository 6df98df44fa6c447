//! `/health` endpoint.

use std::time::Instant;

use beacon_fanout::FanoutStats;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
    /// Vehicles with a cached position.
    pub vehicles: usize,
    /// Total (vehicle, connection) subscriptions.
    pub subscriptions: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, stats: FanoutStats) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        vehicles: stats.vehicles_tracked,
        subscriptions: stats.subscriptions,
    }
}
