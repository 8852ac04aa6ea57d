use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::GeoPoint;
use crate::models::merchant::{Merchant, PricingParams};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/merchants", post(create_merchant))
        .route("/merchants/:id", get(get_merchant))
}

#[derive(Deserialize)]
pub struct CreateMerchantRequest {
    pub name: String,
    pub origin: GeoPoint,
    pub pricing: PricingParams,
}

async fn create_merchant(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateMerchantRequest>,
) -> Result<Json<Merchant>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if payload.pricing.max_delivery_distance_km <= 0.0 {
        return Err(AppError::BadRequest(
            "max_delivery_distance_km must be > 0".to_string(),
        ));
    }

    let merchant = Merchant {
        id: Uuid::new_v4(),
        name: payload.name,
        origin: payload.origin,
        pricing: payload.pricing,
    };

    state.merchants.insert(merchant.id, merchant.clone());
    Ok(Json(merchant))
}

async fn get_merchant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Merchant>, AppError> {
    let merchant = state
        .merchants
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("merchant {id} not found")))?;

    Ok(Json(merchant.value().clone()))
}
