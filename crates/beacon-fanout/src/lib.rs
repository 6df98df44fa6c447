//! # beacon-fanout
//!
//! The subscription and fanout engine:
//!
//! - [`PositionCache`]: last known position per vehicle
//! - [`SubscriptionRegistry`]: which connections follow which vehicles
//! - [`FanoutEngine`]: publish / subscribe / unsubscribe / disconnect, each
//!   applied as one critical section over both stores
//! - [`Outbound`]: the delivery seam implemented by the transport
//!
//! The engine never fails. Malformed input is logged, counted, and reported
//! back as an informational outcome that callers are free to ignore.

#![deny(unsafe_code)]

pub mod cache;
pub mod engine;
pub mod metrics;
pub mod outbound;
pub mod registry;

pub use cache::PositionCache;
pub use engine::{
    DisconnectOutcome, FanoutEngine, FanoutStats, PublishOutcome, SubscribeOutcome,
    UnsubscribeOutcome,
};
pub use outbound::Outbound;
pub use registry::SubscriptionRegistry;
