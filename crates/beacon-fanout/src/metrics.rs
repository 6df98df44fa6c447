//! Metric names recorded by the fanout engine.
//!
//! The engine only emits through the `metrics` facade; the server installs
//! the Prometheus recorder that renders them.

/// Positions accepted into the cache (counter).
pub const POSITIONS_PUBLISHED_TOTAL: &str = "positions_published_total";
/// Inbound events dropped for a bad `vehicleId` (counter, labels: event, reason).
pub const INBOUND_REJECTED_TOTAL: &str = "inbound_rejected_total";
/// Publishes that triggered a `locationUpdate` fanout (counter, labels: scope).
pub const LOCATION_BROADCASTS_TOTAL: &str = "location_broadcasts_total";
/// Successful subscribe calls (counter).
pub const SUBSCRIPTIONS_TOTAL: &str = "subscriptions_total";
/// Unsubscribe calls that removed a subscription (counter).
pub const UNSUBSCRIPTIONS_TOTAL: &str = "unsubscriptions_total";
