use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::Destination;
use crate::pricing::{self, FeeQuote};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/fees/quote", post(quote))
}

#[derive(Deserialize)]
pub struct QuoteRequest {
    pub merchant_id: Uuid,
    pub destination: Destination,
    pub subtotal: f64,
}

/// Checkout-time fee preview. Out-of-range destinations come back as a
/// regular quote with `is_within_range: false`; only an address that cannot
/// be resolved at all is an error.
async fn quote(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QuoteRequest>,
) -> Result<Json<FeeQuote>, AppError> {
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

    Ok(Json(quoted.quote))
}
