//! The fanout engine.
//!
//! Owns the [`PositionCache`] and [`SubscriptionRegistry`] behind one lock
//! and exposes the four operations the transport triggers: publish,
//! subscribe, unsubscribe and disconnect. Each operation is a single
//! critical section. Outbound delivery is enqueued before the lock is
//! released, so two publishes for the same vehicle reach every queue in the
//! order they were applied to the cache.

use std::sync::Arc;

use beacon_core::protocol::{
    OutboundEvent, SUBSCRIBE_TO_VEHICLE, UNSUBSCRIBE_FROM_VEHICLE, UPDATE_LOCATION, VehicleRequest,
};
use beacon_core::{ConnectionId, InputError, PositionRecord, VehicleId};
use beacon_settings::PublishScope;
use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::PositionCache;
use crate::metrics::{
    INBOUND_REJECTED_TOTAL, LOCATION_BROADCASTS_TOTAL, POSITIONS_PUBLISHED_TOTAL,
    SUBSCRIPTIONS_TOTAL, UNSUBSCRIPTIONS_TOTAL,
};
use crate::outbound::Outbound;
use crate::registry::SubscriptionRegistry;

/// Result of [`FanoutEngine::publish`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The record had no usable `vehicleId`; nothing changed.
    Rejected(InputError),
    /// Cached; the vehicle had no subscribers so nothing was sent.
    Cached {
        /// Vehicle that published.
        vehicle_id: VehicleId,
    },
    /// Cached and fanned out as `locationUpdate`.
    Broadcast {
        /// Vehicle that published.
        vehicle_id: VehicleId,
        /// Subscribers of the vehicle at publish time.
        subscribers: usize,
        /// Connections whose queue accepted the update.
        recipients: usize,
    },
}

/// Result of [`FanoutEngine::subscribe`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// The request had no usable `vehicleId`; nothing changed.
    Rejected(InputError),
    /// The connection now follows the vehicle.
    Subscribed {
        /// Vehicle subscribed to.
        vehicle_id: VehicleId,
        /// `false` if the connection was already subscribed.
        newly_added: bool,
        /// Whether a cached position was pushed to the connection.
        synced: bool,
    },
}

/// Result of [`FanoutEngine::unsubscribe`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    /// The request had no usable `vehicleId`; nothing changed.
    Rejected(InputError),
    /// The pair is no longer registered.
    Unsubscribed {
        /// Vehicle unsubscribed from.
        vehicle_id: VehicleId,
        /// `false` if there was nothing to remove.
        was_subscribed: bool,
    },
}

/// Result of [`FanoutEngine::disconnect`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisconnectOutcome {
    /// Vehicles the connection was released from, sorted.
    pub released: Vec<VehicleId>,
}

/// Point-in-time counters for health reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanoutStats {
    /// Vehicles with a cached position.
    pub vehicles_tracked: usize,
    /// Vehicles with at least one subscriber.
    pub vehicles_with_subscribers: usize,
    /// Total (vehicle, connection) subscriptions.
    pub subscriptions: usize,
}

#[derive(Default)]
struct FanoutState {
    cache: PositionCache,
    registry: SubscriptionRegistry,
}

/// Subscription and fanout engine shared by all connection handlers.
pub struct FanoutEngine {
    state: Mutex<FanoutState>,
    outbound: Arc<dyn Outbound>,
    scope: PublishScope,
}

impl FanoutEngine {
    /// Create an engine with empty stores.
    pub fn new(outbound: Arc<dyn Outbound>, scope: PublishScope) -> Self {
        Self {
            state: Mutex::new(FanoutState::default()),
            outbound,
            scope,
        }
    }

    /// Broadcast target used by [`publish`](Self::publish).
    pub fn scope(&self) -> PublishScope {
        self.scope
    }

    /// Accept a position report.
    ///
    /// The record is cached even when nobody follows the vehicle. If the
    /// vehicle has at least one subscriber the record is fanned out as a
    /// `locationUpdate` according to the configured [`PublishScope`].
    pub fn publish(&self, record: PositionRecord) -> PublishOutcome {
        let vehicle_id = match record.vehicle_id() {
            Ok(id) => id,
            Err(err) => {
                reject(UPDATE_LOCATION, &err);
                return PublishOutcome::Rejected(err);
            }
        };

        let mut state = self.state.lock();
        let subscribers = state.registry.subscriber_count(&vehicle_id);
        let update = (subscribers > 0).then(|| OutboundEvent::LocationUpdate(record.clone()));
        let _ = state.cache.put(vehicle_id.clone(), record);
        counter!(POSITIONS_PUBLISHED_TOTAL).increment(1);

        let Some(update) = update else {
            drop(state);
            debug!(vehicle_id = %vehicle_id, "position cached, no subscribers");
            return PublishOutcome::Cached { vehicle_id };
        };

        let recipients = self.deliver_publish(&state.registry, &vehicle_id, &update);
        drop(state);

        counter!(LOCATION_BROADCASTS_TOTAL, "scope" => self.scope.as_str()).increment(1);
        debug!(
            vehicle_id = %vehicle_id,
            subscribers,
            recipients,
            scope = self.scope.as_str(),
            "position published"
        );
        PublishOutcome::Broadcast {
            vehicle_id,
            subscribers,
            recipients,
        }
    }

    /// Register `connection` as a subscriber and push the cached position.
    ///
    /// Every call re-sends the cached position, including repeat
    /// subscriptions to the same vehicle.
    pub fn subscribe(&self, request: &VehicleRequest, connection: &ConnectionId) -> SubscribeOutcome {
        let vehicle_id = match request.vehicle_id() {
            Ok(id) => id,
            Err(err) => {
                reject(SUBSCRIBE_TO_VEHICLE, &err);
                return SubscribeOutcome::Rejected(err);
            }
        };

        let mut state = self.state.lock();
        let newly_added = state.registry.subscribe(vehicle_id.clone(), connection.clone());
        let synced = match state.cache.get(&vehicle_id) {
            Some(record) => {
                let update = OutboundEvent::LocationUpdate(record.clone());
                let _ = self.outbound.send_to(connection, &update);
                true
            }
            None => false,
        };
        let subscribers = state.registry.subscriber_count(&vehicle_id);
        drop(state);

        counter!(SUBSCRIPTIONS_TOTAL).increment(1);
        info!(
            conn_id = %connection,
            vehicle_id = %vehicle_id,
            newly_added,
            synced,
            subscribers,
            "subscribed to vehicle"
        );
        SubscribeOutcome::Subscribed {
            vehicle_id,
            newly_added,
            synced,
        }
    }

    /// Remove `connection` from the vehicle's subscribers. Unknown pairs are
    /// a no-op.
    pub fn unsubscribe(
        &self,
        request: &VehicleRequest,
        connection: &ConnectionId,
    ) -> UnsubscribeOutcome {
        let vehicle_id = match request.vehicle_id() {
            Ok(id) => id,
            Err(err) => {
                reject(UNSUBSCRIBE_FROM_VEHICLE, &err);
                return UnsubscribeOutcome::Rejected(err);
            }
        };

        let was_subscribed = self.state.lock().registry.unsubscribe(&vehicle_id, connection);
        if was_subscribed {
            counter!(UNSUBSCRIPTIONS_TOTAL).increment(1);
        }
        debug!(
            conn_id = %connection,
            vehicle_id = %vehicle_id,
            was_subscribed,
            "unsubscribed from vehicle"
        );
        UnsubscribeOutcome::Unsubscribed {
            vehicle_id,
            was_subscribed,
        }
    }

    /// Drop every subscription held by `connection`.
    ///
    /// Safe to call for connections that never subscribed, or twice.
    pub fn disconnect(&self, connection: &ConnectionId) -> DisconnectOutcome {
        let released = self.state.lock().registry.remove_connection(connection);
        if released.is_empty() {
            debug!(conn_id = %connection, "connection released, no subscriptions");
        } else {
            info!(conn_id = %connection, released = released.len(), "connection released");
        }
        DisconnectOutcome { released }
    }

    /// Latest cached position of a vehicle.
    pub fn last_position(&self, vehicle_id: &str) -> Option<PositionRecord> {
        self.state.lock().cache.get(vehicle_id).cloned()
    }

    /// Current number of subscribers of a vehicle.
    pub fn subscriber_count(&self, vehicle_id: &str) -> usize {
        self.state.lock().registry.subscriber_count(vehicle_id)
    }

    /// Whether `connection` currently follows `vehicle_id`.
    pub fn is_subscribed(&self, vehicle_id: &str, connection: &str) -> bool {
        self.state.lock().registry.is_subscribed(vehicle_id, connection)
    }

    /// Vehicles followed by `connection`, sorted.
    pub fn subscriptions_of(&self, connection: &str) -> Vec<VehicleId> {
        self.state.lock().registry.subscriptions_of(connection)
    }

    /// Vehicles with a cached position, sorted.
    pub fn tracked_vehicles(&self) -> Vec<VehicleId> {
        let mut vehicles: Vec<VehicleId> = self.state.lock().cache.vehicles().cloned().collect();
        vehicles.sort();
        vehicles
    }

    /// Counters for the health endpoint.
    pub fn snapshot(&self) -> FanoutStats {
        let state = self.state.lock();
        FanoutStats {
            vehicles_tracked: state.cache.len(),
            vehicles_with_subscribers: state.registry.vehicle_count(),
            subscriptions: state.registry.subscription_count(),
        }
    }

    /// Send a published update to the configured audience.
    ///
    /// `AllConnections` reaches every live connection, subscribed or not;
    /// the subscriber count only gates whether this runs at all.
    fn deliver_publish(
        &self,
        registry: &SubscriptionRegistry,
        vehicle_id: &VehicleId,
        update: &OutboundEvent,
    ) -> usize {
        match self.scope {
            PublishScope::AllConnections => self.outbound.broadcast(update),
            PublishScope::Subscribers => {
                self.outbound.send_to_many(&registry.subscribers(vehicle_id), update)
            }
        }
    }
}

fn reject(event: &'static str, err: &InputError) {
    counter!(INBOUND_REJECTED_TOTAL, "event" => event, "reason" => err.reason()).increment(1);
    warn!(event, reason = err.reason(), error = %err, "dropping event with invalid vehicleId");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
