use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::dispatch::offers;
use crate::error::AppError;
use crate::models::order::Order;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/offers/:id/accept", post(accept))
        .route("/offers/:id/reject", post(reject))
}

#[derive(Deserialize)]
pub struct OfferActionRequest {
    pub driver_id: Uuid,
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OfferActionRequest>,
) -> Result<Json<Order>, AppError> {
    let order = offers::accept_offer(&state, id, payload.driver_id).await?;
    Ok(Json(order))
}

async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OfferActionRequest>,
) -> Result<StatusCode, AppError> {
    offers::reject_offer(&state, id, payload.driver_id)?;
    Ok(StatusCode::NO_CONTENT)
}
