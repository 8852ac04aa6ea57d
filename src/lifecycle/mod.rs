//! Canonical order lifecycle. `transition` is the pure state machine;
//! `apply` runs it against shared state and triggers the side effects a
//! status change owes the rest of the system (dispatch hand-off, tracking
//! room open/teardown, driver slot release, push signals).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatch::offers;
use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::notify::PushEvent;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Confirm,
    StartPreparing,
    MarkReady,
    Assign { driver_id: Uuid },
    Arrive,
    PickUp,
    StartDelivery,
    Deliver,
    Cancel { reason: Option<String> },
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::Confirm => "confirm",
            OrderEvent::StartPreparing => "start_preparing",
            OrderEvent::MarkReady => "mark_ready",
            OrderEvent::Assign { .. } => "assign",
            OrderEvent::Arrive => "arrive",
            OrderEvent::PickUp => "pick_up",
            OrderEvent::StartDelivery => "start_delivery",
            OrderEvent::Deliver => "deliver",
            OrderEvent::Cancel { .. } => "cancel",
        }
    }

    fn target(&self) -> OrderStatus {
        match self {
            OrderEvent::Confirm => OrderStatus::Confirmed,
            OrderEvent::StartPreparing => OrderStatus::Preparing,
            OrderEvent::MarkReady => OrderStatus::Ready,
            OrderEvent::Assign { .. } => OrderStatus::DriverAssigned,
            OrderEvent::Arrive => OrderStatus::DriverArrived,
            OrderEvent::PickUp => OrderStatus::PickedUp,
            OrderEvent::StartDelivery => OrderStatus::InDelivery,
            OrderEvent::Deliver => OrderStatus::Delivered,
            OrderEvent::Cancel { .. } => OrderStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Actor {
    Merchant,
    Admin,
    Driver { id: Uuid },
    System,
}

#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("illegal transition: {event} is not valid from {from:?}")]
    Illegal { from: OrderStatus, event: &'static str },

    #[error("actor not authorized for {event}")]
    NotAuthorized { event: &'static str },
}

/// What a successful transition did. Re-delivered events land on
/// `AlreadyApplied` so retries from flaky driver connections are harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Transitioned { from: OrderStatus, to: OrderStatus },
    AlreadyApplied,
}

pub fn transition(
    order: &mut Order,
    event: &OrderEvent,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Applied, TransitionError> {
    authorize(order, event, actor)?;

    // Idempotent re-delivery: already in the target state means the earlier
    // attempt won; succeed without touching timestamps again.
    if order.status == event.target() {
        if let OrderEvent::Assign { driver_id } = event {
            if order.assigned_driver != Some(*driver_id) {
                return Err(TransitionError::Illegal {
                    from: order.status,
                    event: event.name(),
                });
            }
        }
        return Ok(Applied::AlreadyApplied);
    }

    let legal = match (order.status, event) {
        (OrderStatus::Pending, OrderEvent::Confirm) => true,
        (OrderStatus::Confirmed, OrderEvent::StartPreparing) => true,
        (OrderStatus::Preparing, OrderEvent::MarkReady) => true,
        (OrderStatus::Ready, OrderEvent::Assign { .. }) => true,
        (OrderStatus::DriverAssigned, OrderEvent::Arrive) => true,
        (OrderStatus::DriverAssigned | OrderStatus::DriverArrived, OrderEvent::PickUp) => true,
        (OrderStatus::PickedUp, OrderEvent::StartDelivery) => true,
        (OrderStatus::InDelivery, OrderEvent::Deliver) => true,
        (status, OrderEvent::Cancel { .. }) => !status.is_terminal(),
        _ => false,
    };

    if !legal {
        return Err(TransitionError::Illegal {
            from: order.status,
            event: event.name(),
        });
    }

    let from = order.status;
    let to = event.target();
    order.status = to;

    match event {
        OrderEvent::Confirm => order.confirmed_at = Some(now),
        OrderEvent::StartPreparing => {}
        OrderEvent::MarkReady => order.ready_at = Some(now),
        OrderEvent::Assign { driver_id } => {
            order.assigned_driver = Some(*driver_id);
            order.assigned_at = Some(now);
        }
        OrderEvent::Arrive => order.arrived_at = Some(now),
        OrderEvent::PickUp => order.picked_up_at = Some(now),
        OrderEvent::StartDelivery => order.in_delivery_at = Some(now),
        OrderEvent::Deliver => order.delivered_at = Some(now),
        OrderEvent::Cancel { reason } => {
            order.cancel_reason = reason.clone();
            order.cancelled_at = Some(now);
        }
    }

    Ok(Applied::Transitioned { from, to })
}

fn authorize(order: &Order, event: &OrderEvent, actor: &Actor) -> Result<(), TransitionError> {
    let allowed = match event {
        OrderEvent::Confirm | OrderEvent::StartPreparing | OrderEvent::MarkReady => {
            matches!(actor, Actor::Merchant | Actor::Admin)
        }
        OrderEvent::Assign { .. } => matches!(actor, Actor::System | Actor::Admin),
        OrderEvent::Arrive | OrderEvent::PickUp | OrderEvent::StartDelivery | OrderEvent::Deliver => {
            match actor {
                Actor::Driver { id } => order.assigned_driver == Some(*id),
                Actor::Admin => true,
                _ => false,
            }
        }
        // Staff-side cancellation only; driver and customer surfaces go
        // through support.
        OrderEvent::Cancel { .. } => matches!(actor, Actor::Merchant | Actor::Admin),
    };

    if allowed {
        Ok(())
    } else {
        Err(TransitionError::NotAuthorized { event: event.name() })
    }
}

/// Transition an order held in shared state and fan out the side effects.
/// Returns the post-transition snapshot.
pub async fn apply(
    state: &AppState,
    order_id: Uuid,
    event: &OrderEvent,
    actor: &Actor,
) -> Result<Order, AppError> {
    let (outcome, snapshot) = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        let outcome = transition(&mut order, event, actor, Utc::now())?;
        (outcome, order.clone())
    };

    if let Applied::Transitioned { from, to } = outcome {
        info!(order_id = %order_id, from = ?from, to = ?to, "order transitioned");
        run_side_effects(state, &snapshot).await;
    }

    Ok(snapshot)
}

/// Side effects owed after a status change; callers invoke this once per
/// actual transition, never on idempotent re-delivery.
pub(crate) async fn run_side_effects(state: &AppState, order: &Order) {
    match order.status {
        OrderStatus::Ready => {
            state.metrics.orders_in_dispatch.inc();
            if let Err(err) = state.dispatch_tx.send(order.id).await {
                state.metrics.orders_in_dispatch.dec();
                warn!(order_id = %order.id, error = %err, "dispatch queue unavailable");
            }
        }
        OrderStatus::DriverAssigned => {
            state.rooms.open(order.id);
            state.rooms.broadcast_status(order.id, order.status);
            state
                .notifier
                .notify_customer(order.id, PushEvent::StatusChanged {
                    order_id: order.id,
                    status: order.status,
                })
                .await;
        }
        OrderStatus::DriverArrived | OrderStatus::PickedUp | OrderStatus::InDelivery => {
            state.rooms.broadcast_status(order.id, order.status);
        }
        OrderStatus::Delivered => {
            if let Some(driver_id) = order.assigned_driver {
                release_driver_slot(state, driver_id, order.id);
            }
            state.rooms.close(order.id, order.status);
            state
                .notifier
                .notify_customer(order.id, PushEvent::StatusChanged {
                    order_id: order.id,
                    status: order.status,
                })
                .await;
        }
        OrderStatus::Cancelled => {
            let invalidated = offers::invalidate_open_offers(state, order.id);
            if invalidated > 0 {
                info!(order_id = %order.id, count = invalidated, "offers invalidated by cancellation");
            }
            if let Some(waker) = state.dispatch_wakers.get(&order.id) {
                waker.notify_one();
            }
            if let Some(driver_id) = order.assigned_driver {
                release_driver_slot(state, driver_id, order.id);
                state
                    .notifier
                    .notify_driver(driver_id, PushEvent::StatusChanged {
                        order_id: order.id,
                        status: order.status,
                    })
                    .await;
            }
            state.rooms.close(order.id, order.status);
            state
                .notifier
                .notify_customer(order.id, PushEvent::StatusChanged {
                    order_id: order.id,
                    status: order.status,
                })
                .await;
        }
        _ => {}
    }
}

/// Frees the driver for new offers, but only if the slot still points at
/// this order.
fn release_driver_slot(state: &AppState, driver_id: Uuid, order_id: Uuid) {
    if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
        if driver.active_order == Some(order_id) {
            driver.active_order = None;
        }
    }
}
