use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Last report from the driver's device. Overwritten in place; position
/// history is never kept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DriverPosition {
    pub point: GeoPoint,
    pub heading: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub online: bool,
    /// Stamped each time the driver comes online; dispatch fairness tie-break.
    pub went_online_at: Option<DateTime<Utc>>,
    pub position: Option<DriverPosition>,
    /// A driver carries at most one in-flight order.
    pub active_order: Option<Uuid>,
    pub registered_at: DateTime<Utc>,
}

impl Driver {
    pub fn is_dispatchable(&self) -> bool {
        self.online && self.active_order.is_none()
    }

    /// Position usable for dispatch ranking: present and not older than `max_age`.
    pub fn fresh_position(&self, max_age: Duration, now: DateTime<Utc>) -> Option<DriverPosition> {
        self.position
            .filter(|pos| now.signed_duration_since(pos.recorded_at) <= max_age)
    }
}
