use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

/// Merchant-configured knobs for the delivery fee formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingParams {
    pub fuel_price_per_liter: f64,
    pub fuel_consumption_per_km: f64,
    pub base_fee: f64,
    pub maintenance_multiplier: f64,
    pub max_delivery_distance_km: f64,
    /// Orders at or above this subtotal ship for free. None disables the rule.
    pub free_delivery_threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    pub id: Uuid,
    pub name: String,
    pub origin: GeoPoint,
    pub pricing: PricingParams,
}
