use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;
use crate::pricing::FeeQuote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    DriverAssigned,
    DriverArrived,
    PickedUp,
    InDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Position streaming is active from assignment until the hand-off ends.
    pub fn is_trackable(&self) -> bool {
        matches!(
            self,
            OrderStatus::DriverAssigned
                | OrderStatus::DriverArrived
                | OrderStatus::PickedUp
                | OrderStatus::InDelivery
        )
    }
}

/// Customer drop-off point. `location` starts as whatever the checkout flow
/// knew; order creation fills it in from geocoding when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub address: String,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub destination: Destination,
    pub subtotal: f64,
    pub status: OrderStatus,
    pub assigned_driver: Option<Uuid>,
    /// Fee decision taken at creation time, kept verbatim for transparency.
    pub fee: FeeQuote,
    pub cancel_reason: Option<String>,
    /// Set when dispatch ran out of rounds without an acceptance; the order
    /// stays Ready and waits for ops to re-enter it.
    pub dispatch_exhausted: bool,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub in_delivery_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(
        merchant_id: Uuid,
        destination: Destination,
        subtotal: f64,
        fee: FeeQuote,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            merchant_id,
            destination,
            subtotal,
            status: OrderStatus::Pending,
            assigned_driver: None,
            fee,
            cancel_reason: None,
            dispatch_exhausted: false,
            created_at: now,
            confirmed_at: None,
            ready_at: None,
            assigned_at: None,
            arrived_at: None,
            picked_up_at: None,
            in_delivery_at: None,
            delivered_at: None,
            cancelled_at: None,
        }
    }
}
