//! # beacon-core
//!
//! Foundation types shared by every beacon crate:
//!
//! - **Branded IDs**: [`VehicleId`] and [`ConnectionId`] as newtypes for type safety
//! - **Position records**: [`PositionRecord`], an opaque JSON document carrying a `vehicleId`
//! - **Wire protocol**: [`protocol::InboundEvent`] / [`protocol::OutboundEvent`] envelopes
//! - **Errors**: [`InputError`] and [`ProtocolError`] via `thiserror`
//! - **Logging**: `tracing` subscriber bootstrap and test capture helpers

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod position;
pub mod protocol;

pub use errors::{InputError, ProtocolError};
pub use ids::{ConnectionId, VehicleId};
pub use position::PositionRecord;
