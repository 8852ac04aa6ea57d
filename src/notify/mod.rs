//! Push-notification dispatcher. Fire-and-forget by contract: delivery is
//! best-effort and never required for correctness, so implementations must
//! not return errors to callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PushEvent {
    OfferCreated {
        offer_id: Uuid,
        order_id: Uuid,
        expires_at: DateTime<Utc>,
    },
    StatusChanged {
        order_id: Uuid,
        status: OrderStatus,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_driver(&self, driver_id: Uuid, event: PushEvent);
    async fn notify_customer(&self, order_id: Uuid, event: PushEvent);
}

/// Stand-in for the real push gateway; logs the signal and moves on.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_driver(&self, driver_id: Uuid, event: PushEvent) {
        debug!(driver_id = %driver_id, event = ?event, "push to driver");
    }

    async fn notify_customer(&self, order_id: Uuid, event: PushEvent) {
        debug!(order_id = %order_id, event = ?event, "push to customer");
    }
}
