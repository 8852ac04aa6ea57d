//! Offer records and the races around them. Everything here funnels through
//! two CAS points: the offer outcome (leaves `Pending` once) and the
//! assignment itself (order still READY, driver slot still empty, checked and
//! written under the entry locks). Lock order is always offer, then order,
//! then driver; no path acquires them in any other order.

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::lifecycle::{self, Actor, OrderEvent};
use crate::models::offer::{Offer, OfferOutcome};
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

pub fn create_offer(state: &AppState, order_id: Uuid, driver_id: Uuid, round: u32) -> Offer {
    let offer = Offer::new(
        order_id,
        driver_id,
        round,
        Duration::seconds(state.config.offer_ttl_secs as i64),
        Utc::now(),
    );
    state.offers.insert(offer.id, offer.clone());
    state.metrics.offers_created_total.inc();
    offer
}

/// First-accept-wins resolution. On success the order is DRIVER_ASSIGNED,
/// the driver's slot is taken, and every sibling offer is invalidated.
/// Losers get a typed outcome the driver UI can distinguish from a network
/// failure: `OfferAlreadyClaimed` when someone else won, `OfferExpired` when
/// the offer or order is gone. Retrying a win returns success again.
pub async fn accept_offer(
    state: &AppState,
    offer_id: Uuid,
    driver_id: Uuid,
) -> Result<Order, AppError> {
    let now = Utc::now();

    // The offer's entry lock is held across the whole resolution so that a
    // concurrent expiry sweep serializes against us: whichever side flips
    // the outcome first wins, the other sees a resolved offer and backs off.
    // Lock order everywhere is offer, then order, then driver.
    let order_snapshot = {
        let mut offer = state
            .offers
            .get_mut(&offer_id)
            .ok_or_else(|| AppError::NotFound(format!("offer {offer_id} not found")))?;
        // Offers are addressed to one driver; anyone else sees nothing.
        if offer.driver_id != driver_id {
            return Err(AppError::NotFound(format!("offer {offer_id} not found")));
        }
        let order_id = offer.order_id;

        match offer.outcome {
            OfferOutcome::Pending => {}
            OfferOutcome::Accepted => {
                let order = state
                    .orders
                    .get(&order_id)
                    .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
                return if order.assigned_driver == Some(driver_id) {
                    Ok(order.clone())
                } else {
                    Err(AppError::OfferAlreadyClaimed)
                };
            }
            OfferOutcome::Invalidated => return Err(AppError::OfferAlreadyClaimed),
            OfferOutcome::Expired | OfferOutcome::Rejected => return Err(AppError::OfferExpired),
        }

        // Lazy expiry: an accept that arrives after the TTL resolves the
        // offer itself rather than waiting for the sweep.
        if offer.expires_at <= now {
            offer.resolve(OfferOutcome::Expired);
            drop(offer);
            state
                .metrics
                .offers_resolved_total
                .with_label_values(&["expired"])
                .inc();
            return Err(AppError::OfferExpired);
        }

        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        match order.status {
            OrderStatus::Ready => {}
            OrderStatus::DriverAssigned if order.assigned_driver == Some(driver_id) => {
                return Ok(order.clone());
            }
            OrderStatus::DriverAssigned => return Err(AppError::OfferAlreadyClaimed),
            _ => return Err(AppError::OfferExpired),
        }

        let mut driver = state
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
        if driver.active_order.is_some_and(|active| active != order_id) {
            return Err(AppError::DriverUnavailable(
                "driver already carries an order".to_string(),
            ));
        }

        lifecycle::transition(&mut order, &OrderEvent::Assign { driver_id }, &Actor::System, now)?;
        driver.active_order = Some(order_id);
        offer.resolve(OfferOutcome::Accepted);
        order.clone()
    };

    let order_id = order_snapshot.id;
    state
        .metrics
        .offers_resolved_total
        .with_label_values(&["accepted"])
        .inc();
    invalidate_open_offers(state, order_id);
    if let Some(waker) = state.dispatch_wakers.get(&order_id) {
        waker.notify_one();
    }

    info!(order_id = %order_id, driver_id = %driver_id, offer_id = %offer_id, "offer accepted");
    lifecycle::run_side_effects(state, &order_snapshot).await;

    Ok(order_snapshot)
}

/// Driver declines. Safe to repeat; resolving an offer that is already gone
/// is not an error the driver can act on.
pub fn reject_offer(state: &AppState, offer_id: Uuid, driver_id: Uuid) -> Result<(), AppError> {
    let order_id = {
        let offer = state
            .offers
            .get(&offer_id)
            .ok_or_else(|| AppError::NotFound(format!("offer {offer_id} not found")))?;
        if offer.driver_id != driver_id {
            return Err(AppError::NotFound(format!("offer {offer_id} not found")));
        }
        offer.order_id
    };

    if resolve_offer(state, offer_id, OfferOutcome::Rejected) {
        if let Some(waker) = state.dispatch_wakers.get(&order_id) {
            waker.notify_one();
        }
    }
    Ok(())
}

/// Single-shot outcome transition; increments the resolution metric on the
/// winning call only.
pub(crate) fn resolve_offer(state: &AppState, offer_id: Uuid, outcome: OfferOutcome) -> bool {
    let Some(mut offer) = state.offers.get_mut(&offer_id) else {
        return false;
    };
    if !offer.resolve(outcome) {
        return false;
    }
    drop(offer);

    let label = match outcome {
        OfferOutcome::Accepted => "accepted",
        OfferOutcome::Rejected => "rejected",
        OfferOutcome::Expired => "expired",
        OfferOutcome::Invalidated => "invalidated",
        OfferOutcome::Pending => unreachable!("resolve never targets pending"),
    };
    state
        .metrics
        .offers_resolved_total
        .with_label_values(&[label])
        .inc();
    true
}

/// Invalidate whatever is still pending for this order (sibling offers after
/// a win, open offers on cancellation).
pub fn invalidate_open_offers(state: &AppState, order_id: Uuid) -> usize {
    let ids: Vec<Uuid> = state
        .offers
        .iter()
        .filter(|entry| entry.order_id == order_id && entry.outcome == OfferOutcome::Pending)
        .map(|entry| entry.id)
        .collect();

    ids.into_iter()
        .filter(|id| resolve_offer(state, *id, OfferOutcome::Invalidated))
        .count()
}

pub(crate) fn expire_batch(state: &AppState, batch: &[Uuid]) -> usize {
    batch
        .iter()
        .filter(|id| resolve_offer(state, **id, OfferOutcome::Expired))
        .count()
}

pub(crate) fn any_pending(state: &AppState, batch: &[Uuid]) -> bool {
    batch.iter().any(|id| {
        state
            .offers
            .get(id)
            .is_some_and(|offer| offer.outcome == OfferOutcome::Pending)
    })
}

pub fn open_offers_for_driver(state: &AppState, driver_id: Uuid) -> Vec<Offer> {
    let now = Utc::now();
    state
        .offers
        .iter()
        .filter(|entry| entry.driver_id == driver_id && entry.is_open(now))
        .map(|entry| entry.value().clone())
        .collect()
}
