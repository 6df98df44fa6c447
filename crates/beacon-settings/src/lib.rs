//! # beacon-settings
//!
//! Configuration for the beacon relay, loaded from layered sources (in
//! priority order, lowest first):
//! 1. **Compiled defaults**: [`BeaconSettings::default()`]
//! 2. **Settings file**: optional JSON file, deep-merged over defaults
//! 3. **Environment variables**: `PORT` and `BEACON_*` overrides
//!
//! CLI flags are applied by the binary on top of the loaded value.
//!
//! # Usage
//!
//! ```no_run
//! use beacon_settings::load_settings;
//!
//! let settings = load_settings(None).unwrap_or_default();
//! println!("listening on port {}", settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, apply_overrides_from, deep_merge, load_settings};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
