use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferOutcome {
    Pending,
    Accepted,
    Rejected,
    Expired,
    Invalidated,
}

/// Time-boxed proposal of one order to one driver. Outcome leaves `Pending`
/// exactly once; whoever resolves first (accept, reject, expiry, cancel) wins
/// and every later resolution attempt is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub round: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub outcome: OfferOutcome,
}

impl Offer {
    pub fn new(
        order_id: Uuid,
        driver_id: Uuid,
        round: u32,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            driver_id,
            round,
            created_at: now,
            expires_at: now + ttl,
            outcome: OfferOutcome::Pending,
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.outcome == OfferOutcome::Pending && self.expires_at > now
    }

    /// Single-shot outcome CAS. Returns false if the offer was already
    /// resolved; must be called under the offer's map entry lock.
    pub fn resolve(&mut self, outcome: OfferOutcome) -> bool {
        if self.outcome == OfferOutcome::Pending {
            self.outcome = outcome;
            true
        } else {
            false
        }
    }
}
