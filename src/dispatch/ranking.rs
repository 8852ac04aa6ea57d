//! Candidate selection for one dispatch round: online drivers with a free
//! slot and a fresh position inside the current search radius, ordered by
//! estimated time to the merchant, earliest-online first on ties.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::geo;
use crate::georoute::{self, TravelEstimate};
use crate::models::driver::GeoPoint;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub driver_id: Uuid,
    pub position: GeoPoint,
    pub went_online_at: DateTime<Utc>,
    pub eta_to_merchant: TravelEstimate,
}

pub async fn rank_candidates(
    state: &AppState,
    origin: GeoPoint,
    radius_km: f64,
    excluded: &HashSet<Uuid>,
) -> Vec<Candidate> {
    let now = Utc::now();
    let max_age = Duration::seconds(state.config.position_max_age_secs);

    let shortlist: Vec<(Uuid, GeoPoint, DateTime<Utc>)> = state
        .drivers
        .iter()
        .filter_map(|entry| {
            let driver = entry.value();
            if !driver.is_dispatchable() || excluded.contains(&driver.id) {
                return None;
            }
            let position = driver.fresh_position(max_age, now)?;
            if !geo::within_radius_km(&position.point, &origin, radius_km) {
                return None;
            }
            Some((
                driver.id,
                position.point,
                driver.went_online_at.unwrap_or(DateTime::<Utc>::MAX_UTC),
            ))
        })
        .collect();

    let mut candidates = Vec::with_capacity(shortlist.len());
    for (driver_id, position, went_online_at) in shortlist {
        let eta_to_merchant =
            georoute::travel_estimate(state.geo.as_ref(), position, origin, state.config.avg_speed_kmh)
                .await;
        candidates.push(Candidate {
            driver_id,
            position,
            went_online_at,
            eta_to_merchant,
        });
    }

    sort_candidates(&mut candidates);
    candidates
}

fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        a.eta_to_merchant
            .duration_seconds
            .total_cmp(&b.eta_to_merchant.duration_seconds)
            .then_with(|| a.went_online_at.cmp(&b.went_online_at))
    });
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{Duration, Utc};

    use super::{rank_candidates, sort_candidates, Candidate};
    use crate::georoute::{EstimateKind, TravelEstimate};
    use crate::models::driver::GeoPoint;
    use crate::state::tests::{seeded_state, test_driver};

    fn origin() -> GeoPoint {
        GeoPoint { lat: 52.52, lng: 13.405 }
    }

    fn candidate(seconds: f64, online_secs_ago: i64) -> Candidate {
        Candidate {
            driver_id: uuid::Uuid::new_v4(),
            position: origin(),
            went_online_at: Utc::now() - Duration::seconds(online_secs_ago),
            eta_to_merchant: TravelEstimate {
                distance_km: seconds / 3600.0 * 25.0,
                duration_seconds: seconds,
                kind: EstimateKind::Exact,
            },
        }
    }

    #[test]
    fn fastest_eta_ranks_first() {
        let far = candidate(900.0, 10);
        let near = candidate(120.0, 10);
        let mut ranked = vec![far.clone(), near.clone()];

        sort_candidates(&mut ranked);

        assert_eq!(ranked[0].driver_id, near.driver_id);
    }

    #[test]
    fn tie_breaks_toward_longest_online() {
        let latecomer = candidate(300.0, 5);
        let veteran = candidate(300.0, 3600);
        let mut ranked = vec![latecomer.clone(), veteran.clone()];

        sort_candidates(&mut ranked);

        assert_eq!(ranked[0].driver_id, veteran.driver_id);
    }

    #[tokio::test]
    async fn offline_busy_stale_and_distant_drivers_are_skipped() {
        let (state, _rx) = seeded_state();

        let eligible = test_driver(&state, true);
        let offline = test_driver(&state, false);

        let busy = test_driver(&state, true);
        state.drivers.get_mut(&busy).unwrap().active_order = Some(uuid::Uuid::new_v4());

        let stale = test_driver(&state, true);
        if let Some(pos) = state.drivers.get_mut(&stale).unwrap().position.as_mut() {
            pos.recorded_at = Utc::now() - Duration::seconds(600);
        }

        let distant = test_driver(&state, true);
        if let Some(pos) = state.drivers.get_mut(&distant).unwrap().position.as_mut() {
            pos.point = GeoPoint { lat: 53.55, lng: 9.99 };
        }

        let ranked = rank_candidates(&state, origin(), 5.0, &HashSet::new()).await;

        let ids: Vec<_> = ranked.iter().map(|c| c.driver_id).collect();
        assert_eq!(ids, vec![eligible]);
        let _ = offline;
    }

    #[tokio::test]
    async fn excluded_drivers_are_not_reoffered() {
        let (state, _rx) = seeded_state();
        let driver = test_driver(&state, true);

        let mut excluded = HashSet::new();
        excluded.insert(driver);

        let ranked = rank_candidates(&state, origin(), 5.0, &excluded).await;
        assert!(ranked.is_empty());
    }
}
