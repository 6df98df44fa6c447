//! # beacon-server
//!
//! Axum HTTP + `WebSocket` transport for the relay.
//!
//! - HTTP endpoints: banner, health check, Prometheus metrics
//! - `WebSocket` gateway: connection hub, per-connection session loop,
//!   heartbeat, and a lifecycle guard that releases subscriptions exactly once
//! - Inbound frames are decoded and dispatched to the shared
//!   [`beacon_fanout::FanoutEngine`]
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod error;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use error::ServerError;
pub use server::{AppState, BeaconServer};
