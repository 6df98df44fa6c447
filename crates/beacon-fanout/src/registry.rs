//! Vehicle → subscriber index.
//!
//! Keeps a forward index (vehicle → connections) for fanout and a reverse
//! index (connection → vehicles) so that disconnect cleanup touches only
//! the vehicles a connection actually followed. Both indexes are updated
//! together; empty sets are pruned, so an absent entry and an empty set
//! mean the same thing.

use std::collections::{HashMap, HashSet};

use beacon_core::{ConnectionId, VehicleId};

/// Set of connections interested in each vehicle.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    by_vehicle: HashMap<VehicleId, HashSet<ConnectionId>>,
    by_connection: HashMap<ConnectionId, HashSet<VehicleId>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection` to the subscribers of `vehicle_id`.
    ///
    /// Idempotent. Returns `true` if the pair was not already registered.
    pub fn subscribe(&mut self, vehicle_id: VehicleId, connection: ConnectionId) -> bool {
        let added = self
            .by_vehicle
            .entry(vehicle_id.clone())
            .or_default()
            .insert(connection.clone());
        let _ = self
            .by_connection
            .entry(connection)
            .or_default()
            .insert(vehicle_id);
        added
    }

    /// Remove `connection` from the subscribers of `vehicle_id`.
    ///
    /// Unknown vehicles or connections are a no-op. Returns `true` if a
    /// subscription was removed.
    pub fn unsubscribe(&mut self, vehicle_id: &str, connection: &str) -> bool {
        let removed = remove_member(&mut self.by_vehicle, vehicle_id, connection);
        let _ = remove_member(&mut self.by_connection, connection, vehicle_id);
        removed
    }

    /// Drop every subscription held by `connection`.
    ///
    /// Returns the vehicles it was released from (empty if it had none).
    pub fn remove_connection(&mut self, connection: &str) -> Vec<VehicleId> {
        let Some(vehicles) = self.by_connection.remove(connection) else {
            return Vec::new();
        };
        let mut released: Vec<VehicleId> = vehicles.into_iter().collect();
        for vehicle_id in &released {
            let _ = remove_member(&mut self.by_vehicle, vehicle_id, connection);
        }
        released.sort();
        released
    }

    /// Number of connections following `vehicle_id`.
    pub fn subscriber_count(&self, vehicle_id: &str) -> usize {
        self.by_vehicle.get(vehicle_id).map_or(0, HashSet::len)
    }

    /// Connections following `vehicle_id`, in no particular order.
    pub fn subscribers(&self, vehicle_id: &str) -> Vec<ConnectionId> {
        self.by_vehicle
            .get(vehicle_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `connection` follows `vehicle_id`.
    pub fn is_subscribed(&self, vehicle_id: &str, connection: &str) -> bool {
        self.by_vehicle
            .get(vehicle_id)
            .is_some_and(|set| set.contains(connection))
    }

    /// Vehicles followed by `connection`, sorted.
    pub fn subscriptions_of(&self, connection: &str) -> Vec<VehicleId> {
        let mut vehicles: Vec<VehicleId> = self
            .by_connection
            .get(connection)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        vehicles.sort();
        vehicles
    }

    /// Vehicles with at least one subscriber.
    pub fn vehicle_count(&self) -> usize {
        self.by_vehicle.len()
    }

    /// Connections with at least one subscription.
    pub fn connection_count(&self) -> usize {
        self.by_connection.len()
    }

    /// Total (vehicle, connection) pairs.
    pub fn subscription_count(&self) -> usize {
        self.by_vehicle.values().map(HashSet::len).sum()
    }
}

/// Remove `member` from the set under `key`, pruning the set once empty.
fn remove_member<K, M>(index: &mut HashMap<K, HashSet<M>>, key: &str, member: &str) -> bool
where
    K: std::borrow::Borrow<str> + std::hash::Hash + Eq,
    M: std::borrow::Borrow<str> + std::hash::Hash + Eq,
{
    let Some(set) = index.get_mut(key) else {
        return false;
    };
    let removed = set.remove(member);
    if set.is_empty() {
        let _ = index.remove(key);
    }
    removed
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
