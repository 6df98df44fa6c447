//! WebSocket connection management, heartbeat, message dispatch, and fan-out.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod hub;
pub mod lifecycle;
pub mod session;
