//! Branded ID newtypes for type safety.
//!
//! Vehicles and connections are both keyed by strings on the wire. Wrapping
//! them in distinct newtypes prevents passing a connection ID where a
//! vehicle ID is expected (the registry takes both side by side).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::InputError;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifier of a tracked GPS-emitting vehicle.
    ///
    /// Opaque to the relay; the only rule is that it is never empty.
    VehicleId
}

branded_id! {
    /// Identifier of a live transport connection, unique for its lifetime.
    ConnectionId
}

impl VehicleId {
    /// Validate a raw identifier taken from an inbound payload.
    ///
    /// Only the empty string is rejected. The value is kept verbatim
    /// otherwise (no trimming, no case folding).
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        if raw.is_empty() {
            return Err(InputError::EmptyVehicleId);
        }
        Ok(Self(raw.to_owned()))
    }
}

impl ConnectionId {
    /// Mint a fresh connection ID (`conn_` + UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
