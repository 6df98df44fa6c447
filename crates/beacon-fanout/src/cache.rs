//! Last-position cache.

use std::collections::HashMap;

use beacon_core::{PositionRecord, VehicleId};

/// Most recent [`PositionRecord`] per vehicle.
///
/// One entry per vehicle, overwritten on every publish. Entries live for the
/// lifetime of the process.
#[derive(Debug, Default)]
pub struct PositionCache {
    positions: HashMap<VehicleId, PositionRecord>,
}

impl PositionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` as the latest position of `vehicle_id`.
    ///
    /// Returns `true` if an earlier position was replaced.
    pub fn put(&mut self, vehicle_id: VehicleId, record: PositionRecord) -> bool {
        self.positions.insert(vehicle_id, record).is_some()
    }

    /// Latest position, or `None` if the vehicle never published.
    pub fn get(&self, vehicle_id: &str) -> Option<&PositionRecord> {
        self.positions.get(vehicle_id)
    }

    /// Vehicles with a known position, in no particular order.
    pub fn vehicles(&self) -> impl Iterator<Item = &VehicleId> {
        self.positions.keys()
    }

    /// Number of vehicles with a known position.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether no vehicle has published yet.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
