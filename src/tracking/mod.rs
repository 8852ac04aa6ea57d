//! Live position relay. One broadcast room per order, active while the order
//! is in a trackable state. Fan-out is lossy on purpose: a slow subscriber
//! lags past the ring buffer and misses ticks, the publisher never waits, and
//! nothing is replayed. Only the last-known tick is kept, for subscribers who
//! connect mid-trip.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::georoute;
use crate::models::driver::{DriverPosition, GeoPoint};
use crate::models::order::OrderStatus;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionTick {
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub point: GeoPoint,
    pub heading: Option<f64>,
    pub recorded_at: DateTime<Utc>,
    /// Straight-line ETA to the drop-off, when its coordinates are known.
    pub eta_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackingEvent {
    Position(PositionTick),
    Status { status: OrderStatus, terminal: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Relayed,
    /// Timestamp older than the last delivered tick for this order.
    Stale,
    /// Driver has no order, is not this order's driver, or the order is not
    /// in a trackable state. Dropped without error; stray updates after a
    /// hand-off are expected.
    Untracked,
    UnknownDriver,
}

struct Room {
    events: broadcast::Sender<TrackingEvent>,
    last: Mutex<Option<PositionTick>>,
}

pub struct TrackingRooms {
    rooms: DashMap<Uuid, Room>,
    buffer: usize,
}

impl TrackingRooms {
    pub fn new(buffer: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            buffer,
        }
    }

    pub fn open(&self, order_id: Uuid) {
        self.rooms.entry(order_id).or_insert_with(|| Room {
            events: broadcast::channel(self.buffer).0,
            last: Mutex::new(None),
        });
    }

    /// Last-known tick plus the live stream. The room is created lazily so a
    /// customer can open the tracking view before a driver is assigned.
    pub fn subscribe(&self, order_id: Uuid) -> (Option<PositionTick>, broadcast::Receiver<TrackingEvent>) {
        self.open(order_id);
        let room = self.rooms.get(&order_id).expect("room was just opened");
        let last = room.last.lock().expect("room lock poisoned").clone();
        (last, room.events.subscribe())
    }

    pub fn broadcast_status(&self, order_id: Uuid, status: OrderStatus) {
        if let Some(room) = self.rooms.get(&order_id) {
            let _ = room.events.send(TrackingEvent::Status {
                status,
                terminal: status.is_terminal(),
            });
        }
    }

    /// Terminal teardown: pushes the final status so subscribers stop
    /// listening, then drops the room.
    pub fn close(&self, order_id: Uuid, final_status: OrderStatus) {
        if let Some(room) = self.rooms.get(&order_id) {
            let _ = room.events.send(TrackingEvent::Status {
                status: final_status,
                terminal: true,
            });
        }
        self.rooms.remove(&order_id);
    }

    fn relay(&self, order_id: Uuid, tick: PositionTick) -> PublishOutcome {
        let Some(room) = self.rooms.get(&order_id) else {
            return PublishOutcome::Untracked;
        };

        let mut last = room.last.lock().expect("room lock poisoned");
        if let Some(prev) = last.as_ref() {
            if tick.recorded_at < prev.recorded_at {
                return PublishOutcome::Stale;
            }
        }
        *last = Some(tick.clone());
        drop(last);

        // Err just means nobody is listening right now; the tick is lost by
        // design.
        let _ = room.events.send(TrackingEvent::Position(tick));
        PublishOutcome::Relayed
    }
}

/// Ingest one position report from a driver's device. Always refreshes the
/// driver's last-known position (dispatch ranking needs it even off-trip);
/// relays to the order room only when this driver is the order's assigned
/// driver and the order is still trackable.
pub fn publish(
    state: &AppState,
    driver_id: Uuid,
    order_id: Option<Uuid>,
    point: GeoPoint,
    heading: Option<f64>,
    recorded_at: DateTime<Utc>,
) -> PublishOutcome {
    let active_order = {
        let Some(mut driver) = state.drivers.get_mut(&driver_id) else {
            return PublishOutcome::UnknownDriver;
        };
        let regressed = driver
            .position
            .is_some_and(|prev| recorded_at < prev.recorded_at);
        if !regressed {
            driver.position = Some(DriverPosition {
                point,
                heading,
                recorded_at,
            });
        }
        driver.active_order
    };

    let Some(target) = order_id.or(active_order) else {
        return PublishOutcome::Untracked;
    };

    let eta_seconds = {
        let Some(order) = state.orders.get(&target) else {
            return PublishOutcome::Untracked;
        };
        if order.assigned_driver != Some(driver_id) || !order.status.is_trackable() {
            return PublishOutcome::Untracked;
        }
        order.destination.location.map(|dropoff| {
            georoute::straight_line_estimate(point, dropoff, state.config.avg_speed_kmh)
                .duration_seconds
        })
    };

    state.rooms.relay(target, PositionTick {
        order_id: target,
        driver_id,
        point,
        heading,
        recorded_at,
        eta_seconds,
    })
}
