//! Background engine turning READY orders into assignments. One task per
//! order works through escalation rounds: offer a ranked batch, wait out the
//! TTL (woken early by accept, reject, or cancellation), widen the radius and
//! re-batch, and after the last round flag the order for ops. A stalled
//! dispatch never corrupts order state; the order simply stays READY.

pub mod offers;
pub mod ranking;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use tokio::sync::{mpsc, Notify};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::driver::GeoPoint;
use crate::models::order::OrderStatus;
use crate::notify::PushEvent;
use crate::state::AppState;

/// Pause before re-scanning when a round found nobody to ask.
const EMPTY_ROUND_BACKOFF: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResolution {
    Assigned,
    /// Order left READY through another path, normally cancellation.
    Abandoned,
    /// Ran out of rounds; order flagged NoDriversAvailable for ops.
    Exhausted,
    /// Another dispatch task already owns this order.
    Skipped,
}

impl DispatchResolution {
    fn label(&self) -> &'static str {
        match self {
            DispatchResolution::Assigned => "assigned",
            DispatchResolution::Abandoned => "abandoned",
            DispatchResolution::Exhausted => "exhausted",
            DispatchResolution::Skipped => "skipped",
        }
    }
}

pub async fn run_dispatch_engine(state: Arc<AppState>, mut ready_rx: mpsc::Receiver<Uuid>) {
    info!("dispatch engine started");

    while let Some(order_id) = ready_rx.recv().await {
        let state = state.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let resolution = dispatch_order(&state, order_id).await;

            state.metrics.orders_in_dispatch.dec();
            let elapsed = started.elapsed().as_secs_f64();
            state
                .metrics
                .dispatch_latency_seconds
                .with_label_values(&[resolution.label()])
                .observe(elapsed);
            state
                .metrics
                .dispatches_total
                .with_label_values(&[resolution.label()])
                .inc();
        });
    }

    warn!("dispatch engine stopped: ready queue closed");
}

/// Run dispatch for one order. Re-entrant by design: a second call while a
/// task is already working the same order is a no-op, which makes queue
/// duplicates and ops re-entry harmless.
pub async fn dispatch_order(state: &AppState, order_id: Uuid) -> DispatchResolution {
    let waker = match state.dispatch_wakers.entry(order_id) {
        Entry::Occupied(_) => return DispatchResolution::Skipped,
        Entry::Vacant(slot) => slot.insert(Arc::new(Notify::new())).clone(),
    };

    let resolution = run_rounds(state, order_id, &waker).await;
    state.dispatch_wakers.remove(&order_id);

    match resolution {
        DispatchResolution::Assigned => {
            info!(order_id = %order_id, "dispatch resolved with an assignment");
        }
        DispatchResolution::Abandoned => {
            debug!(order_id = %order_id, "dispatch abandoned, order left READY elsewhere");
        }
        DispatchResolution::Exhausted => {
            warn!(order_id = %order_id, "no drivers available, order flagged for ops");
        }
        DispatchResolution::Skipped => {}
    }

    resolution
}

enum Progress {
    StillReady,
    Assigned,
    Gone,
}

fn order_progress(state: &AppState, order_id: Uuid) -> Progress {
    match state.orders.get(&order_id) {
        Some(order) => match order.status {
            OrderStatus::Ready => Progress::StillReady,
            OrderStatus::DriverAssigned => Progress::Assigned,
            // Any later status implies an assignment happened on our watch.
            status if status.is_trackable() || status == OrderStatus::Delivered => {
                Progress::Assigned
            }
            _ => Progress::Gone,
        },
        None => Progress::Gone,
    }
}

async fn run_rounds(state: &AppState, order_id: Uuid, waker: &Notify) -> DispatchResolution {
    let origin: GeoPoint = {
        let Some(order) = state.orders.get(&order_id) else {
            return DispatchResolution::Abandoned;
        };
        let Some(merchant) = state.merchants.get(&order.merchant_id) else {
            warn!(order_id = %order_id, merchant_id = %order.merchant_id, "merchant unknown, cannot dispatch");
            return DispatchResolution::Abandoned;
        };
        merchant.origin
    };

    let ttl = Duration::from_secs(state.config.offer_ttl_secs);
    let mut offered: HashSet<Uuid> = HashSet::new();

    for round in 1..=state.config.max_dispatch_rounds {
        match order_progress(state, order_id) {
            Progress::StillReady => {}
            Progress::Assigned => return DispatchResolution::Assigned,
            Progress::Gone => return DispatchResolution::Abandoned,
        }

        let radius_km =
            state.config.search_radius_km + state.config.radius_step_km * (round as f64 - 1.0);
        let candidates = ranking::rank_candidates(state, origin, radius_km, &offered).await;

        if candidates.is_empty() {
            debug!(order_id = %order_id, round, radius_km, "no candidates in radius");
            tokio::select! {
                _ = waker.notified() => {}
                _ = sleep(EMPTY_ROUND_BACKOFF) => {}
            }
            continue;
        }

        let mut batch: Vec<Uuid> = Vec::new();
        for candidate in candidates.iter().take(state.config.offer_batch_size) {
            let offer = offers::create_offer(state, order_id, candidate.driver_id, round);
            offered.insert(candidate.driver_id);
            state
                .notifier
                .notify_driver(candidate.driver_id, PushEvent::OfferCreated {
                    offer_id: offer.id,
                    order_id,
                    expires_at: offer.expires_at,
                })
                .await;
            batch.push(offer.id);
        }
        info!(order_id = %order_id, round, radius_km, batch = batch.len(), "offer batch extended");

        let deadline = Instant::now() + ttl;
        loop {
            tokio::select! {
                _ = waker.notified() => {}
                _ = sleep_until(deadline) => {}
            }

            match order_progress(state, order_id) {
                Progress::StillReady => {}
                Progress::Assigned => return DispatchResolution::Assigned,
                Progress::Gone => {
                    offers::expire_batch(state, &batch);
                    return DispatchResolution::Abandoned;
                }
            }

            if Instant::now() >= deadline {
                break;
            }
            // Whole batch rejected: no point sitting out the rest of the TTL.
            if !offers::any_pending(state, &batch) {
                break;
            }
        }

        let expired = offers::expire_batch(state, &batch);
        if expired > 0 {
            debug!(order_id = %order_id, round, expired, "offer batch expired");
        }
    }

    if let Some(mut order) = state.orders.get_mut(&order_id) {
        if order.status == OrderStatus::Ready {
            order.dispatch_exhausted = true;
        }
    }

    DispatchResolution::Exhausted
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};

    use super::{dispatch_order, offers, DispatchResolution};
    use crate::models::offer::OfferOutcome;
    use crate::models::order::OrderStatus;
    use crate::state::tests::{seeded_state, test_driver, test_order};

    #[tokio::test]
    async fn dispatch_assigns_when_a_driver_accepts() {
        let (state, _rx) = seeded_state();
        let order = test_order(&state, OrderStatus::Ready, None);
        let driver = test_driver(&state, true);

        let engine_state = state.clone();
        let engine = tokio::spawn(async move { dispatch_order(&engine_state, order).await });

        // wait for the batch to appear, then accept like a driver client would
        let offer = loop {
            if let Some(offer) = offers::open_offers_for_driver(&state, driver).pop() {
                break offer;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        };
        offers::accept_offer(&state, offer.id, driver).await.unwrap();

        assert_eq!(engine.await.unwrap(), DispatchResolution::Assigned);
        let stored = state.orders.get(&order).unwrap();
        assert_eq!(stored.status, OrderStatus::DriverAssigned);
        assert_eq!(stored.assigned_driver, Some(driver));
        assert!(!state.dispatch_wakers.contains_key(&order));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_rounds_exhaust_and_flag_the_order() {
        let (state, _rx) = seeded_state();
        let order = test_order(&state, OrderStatus::Ready, None);
        let driver = test_driver(&state, true);

        let resolution = dispatch_order(&state, order).await;

        assert_eq!(resolution, DispatchResolution::Exhausted);
        let stored = state.orders.get(&order).unwrap();
        assert_eq!(stored.status, OrderStatus::Ready);
        assert!(stored.dispatch_exhausted);

        // the driver was asked once, then never re-offered
        let driver_offers: Vec<_> = state
            .offers
            .iter()
            .filter(|o| o.driver_id == driver)
            .map(|o| o.value().clone())
            .collect();
        assert_eq!(driver_offers.len(), 1);
        assert_eq!(driver_offers[0].outcome, OfferOutcome::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wakes_and_abandons_dispatch() {
        let (state, _rx) = seeded_state();
        let order = test_order(&state, OrderStatus::Ready, None);
        let driver = test_driver(&state, true);
        let _ = driver;

        let engine_state = state.clone();
        let engine = tokio::spawn(async move { dispatch_order(&engine_state, order).await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        crate::lifecycle::apply(
            &state,
            order,
            &crate::lifecycle::OrderEvent::Cancel { reason: None },
            &crate::lifecycle::Actor::Admin,
        )
        .await
        .unwrap();

        assert_eq!(engine.await.unwrap(), DispatchResolution::Abandoned);
        for offer in state.offers.iter() {
            assert_ne!(offer.outcome, OfferOutcome::Pending);
        }
    }

    #[tokio::test]
    async fn second_dispatch_for_same_order_is_skipped() {
        let (state, _rx) = seeded_state();
        let order = test_order(&state, OrderStatus::Ready, None);

        let engine_state = state.clone();
        let engine = tokio::spawn(async move { dispatch_order(&engine_state, order).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(
            dispatch_order(&state, order).await,
            DispatchResolution::Skipped
        );

        crate::lifecycle::apply(
            &state,
            order,
            &crate::lifecycle::OrderEvent::Cancel { reason: None },
            &crate::lifecycle::Actor::Admin,
        )
        .await
        .unwrap();
        let _ = engine.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stale_positions_never_receive_offers() {
        let (state, _rx) = seeded_state();
        let order = test_order(&state, OrderStatus::Ready, None);
        let driver = test_driver(&state, true);
        if let Some(pos) = state.drivers.get_mut(&driver).unwrap().position.as_mut() {
            pos.recorded_at = Utc::now() - ChronoDuration::seconds(600);
        }

        let resolution = dispatch_order(&state, order).await;

        assert_eq!(resolution, DispatchResolution::Exhausted);
        assert!(state.offers.is_empty());
    }
}
