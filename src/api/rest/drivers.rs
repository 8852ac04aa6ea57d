use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::offers;
use crate::error::AppError;
use crate::georoute::{self, TravelEstimate};
use crate::models::driver::{Driver, DriverPosition, GeoPoint};
use crate::models::offer::Offer;
use crate::models::order::Order;
use crate::state::AppState;
use crate::tracking::{self, PublishOutcome};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver))
        .route("/drivers/:id/status", patch(update_status))
        .route("/drivers/:id/position", patch(report_position))
        .route("/drivers/:id/dashboard", get(dashboard))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    pub position: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub online: bool,
}

#[derive(Deserialize)]
pub struct ReportPositionRequest {
    pub lat: f64,
    pub lng: f64,
    pub heading: Option<f64>,
    /// Device clock; defaults to server time for clients that do not send it.
    pub recorded_at: Option<DateTime<Utc>>,
    /// Explicit stream target; defaults to the driver's active order.
    pub order_id: Option<Uuid>,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let now = Utc::now();
    let driver = Driver {
        id: Uuid::new_v4(),
        name: payload.name,
        online: false,
        went_online_at: None,
        position: payload.position.map(|point| DriverPosition {
            point,
            heading: None,
            recorded_at: now,
        }),
        active_order: None,
        registered_at: now,
    };

    state.drivers.insert(driver.id, driver.clone());
    Ok(Json(driver))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    if payload.online && !driver.online {
        driver.went_online_at = Some(Utc::now());
    }
    driver.online = payload.online;

    Ok(Json(driver.clone()))
}

/// Position ingestion doubles as the publish edge of the position stream.
/// Whatever happens to the relay (stale tick, stray update after hand-off),
/// the driver client gets an accepted response; only an unknown driver is an
/// error.
async fn report_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportPositionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = tracking::publish(
        &state,
        id,
        payload.order_id,
        GeoPoint {
            lat: payload.lat,
            lng: payload.lng,
        },
        payload.heading,
        payload.recorded_at.unwrap_or_else(Utc::now),
    );

    let label = match outcome {
        PublishOutcome::Relayed => "relayed",
        PublishOutcome::Stale => "stale",
        PublishOutcome::Untracked => "untracked",
        PublishOutcome::UnknownDriver => {
            return Err(AppError::NotFound(format!("driver {id} not found")));
        }
    };
    state
        .metrics
        .positions_total
        .with_label_values(&[label])
        .inc();

    Ok(StatusCode::ACCEPTED)
}

#[derive(Serialize)]
struct OpenOfferView {
    offer: Offer,
    time_to_merchant: Option<TravelEstimate>,
    time_to_customer: Option<TravelEstimate>,
    expires_in_secs: i64,
}

#[derive(Serialize)]
struct DashboardResponse {
    driver_id: Uuid,
    active_order: Option<Order>,
    offers: Vec<OpenOfferView>,
}

/// Driver-side poll target: the active order plus every open offer with
/// travel estimates and an expiry countdown. Read-only, so polling it every
/// few seconds cannot create duplicate offers or dispatch attempts.
async fn dashboard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DashboardResponse>, AppError> {
    let (position, active_order_id) = {
        let driver = state
            .drivers
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;
        (driver.position, driver.active_order)
    };

    let active_order =
        active_order_id.and_then(|order_id| state.orders.get(&order_id).map(|o| o.clone()));

    let now = Utc::now();
    let mut views = Vec::new();
    for offer in offers::open_offers_for_driver(&state, id) {
        let Some((origin, dropoff)) = state.orders.get(&offer.order_id).and_then(|order| {
            let merchant = state.merchants.get(&order.merchant_id)?;
            Some((merchant.origin, order.destination.location))
        }) else {
            continue;
        };

        let time_to_merchant = match position {
            Some(pos) => Some(
                georoute::travel_estimate(
                    state.geo.as_ref(),
                    pos.point,
                    origin,
                    state.config.avg_speed_kmh,
                )
                .await,
            ),
            None => None,
        };

        let time_to_customer = match dropoff {
            Some(target) => Some(
                georoute::travel_estimate(
                    state.geo.as_ref(),
                    origin,
                    target,
                    state.config.avg_speed_kmh,
                )
                .await,
            ),
            None => None,
        };

        views.push(OpenOfferView {
            expires_in_secs: (offer.expires_at - now).num_seconds().max(0),
            offer,
            time_to_merchant,
            time_to_customer,
        });
    }

    Ok(Json(DashboardResponse {
        driver_id: id,
        active_order,
        offers: views,
    }))
}
