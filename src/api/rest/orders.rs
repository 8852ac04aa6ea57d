use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::lifecycle::{self, Actor, OrderEvent};
use crate::models::driver::{DriverPosition, GeoPoint};
use crate::models::order::{Destination, Order, OrderStatus};
use crate::pricing::{self, FeeQuote};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/transition", post(transition_order))
        .route("/orders/:id/dispatch", post(redispatch_order))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub merchant_id: Uuid,
    pub destination: Destination,
    pub subtotal: f64,
}

/// Entry point for the (out-of-scope) checkout flow: quotes the fee, pins
/// the geocoded drop-off on the order and stores it as PENDING. An address
/// outside the service range is a rejected checkout, not a stored order.
async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    let (origin, pricing) = {
        let merchant = state
            .merchants
            .get(&payload.merchant_id)
            .ok_or_else(|| AppError::NotFound(format!("merchant {} not found", payload.merchant_id)))?;
        (merchant.origin, merchant.pricing.clone())
    };

    let quoted = pricing::quote_fee(
        state.geo.as_ref(),
        origin,
        &payload.destination,
        payload.subtotal,
        &pricing,
    )
    .await?;

    if !quoted.quote.is_within_range {
        let reason = quoted
            .quote
            .reason
            .unwrap_or_else(|| "destination out of delivery range".to_string());
        return Err(AppError::BadRequest(reason));
    }

    let destination = Destination {
        address: payload.destination.address,
        location: Some(quoted.destination),
    };
    let order = Order::new(
        payload.merchant_id,
        destination,
        payload.subtotal,
        quoted.quote,
        Utc::now(),
    );

    state.orders.insert(order.id, order.clone());
    Ok(Json(order))
}

#[derive(Serialize)]
struct AssignedDriverView {
    id: Uuid,
    name: String,
    last_position: Option<DriverPosition>,
}

#[derive(Serialize)]
struct OrderStatusView {
    id: Uuid,
    status: OrderStatus,
    dispatch_exhausted: bool,
    assigned_driver: Option<AssignedDriverView>,
    merchant_location: Option<GeoPoint>,
    destination: Destination,
    fee: FeeQuote,
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderStatusView>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?
        .clone();

    let assigned_driver = order.assigned_driver.and_then(|driver_id| {
        state.drivers.get(&driver_id).map(|driver| AssignedDriverView {
            id: driver.id,
            name: driver.name.clone(),
            last_position: driver.position,
        })
    });

    let merchant_location = state
        .merchants
        .get(&order.merchant_id)
        .map(|merchant| merchant.origin);

    Ok(Json(OrderStatusView {
        id: order.id,
        status: order.status,
        dispatch_exhausted: order.dispatch_exhausted,
        assigned_driver,
        merchant_location,
        destination: order.destination,
        fee: order.fee,
    }))
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub event: OrderEvent,
    pub actor: Actor,
}

async fn transition_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<Order>, AppError> {
    // Assignment must go through offer acceptance; it is the only path that
    // also claims the driver's slot atomically.
    if matches!(payload.event, OrderEvent::Assign { .. }) {
        return Err(AppError::BadRequest(
            "assignment happens through offer acceptance".to_string(),
        ));
    }

    let order = lifecycle::apply(&state, id, &payload.event, &payload.actor).await?;
    Ok(Json(order))
}

/// Ops re-entry for an order dispatch gave up on. Harmless to repeat: the
/// engine skips orders it is already working.
async fn redispatch_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    {
        let mut order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
        if order.status != OrderStatus::Ready {
            return Err(AppError::BadRequest(format!(
                "only READY orders can re-enter dispatch, order is {:?}",
                order.status
            )));
        }
        order.dispatch_exhausted = false;
    }

    state.metrics.orders_in_dispatch.inc();
    if state.dispatch_tx.send(id).await.is_err() {
        state.metrics.orders_in_dispatch.dec();
        return Err(AppError::Internal("dispatch queue unavailable".to_string()));
    }

    Ok(StatusCode::ACCEPTED)
}
