use crate::models::driver::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Straight-line distance inflated to approximate actual road distance.
pub const ROAD_CORRECTION_FACTOR: f64 = 1.3;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    let central_angle = 2.0 * h.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// One-way road-distance estimate when the routing provider is unreachable.
pub fn road_estimate_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    haversine_km(a, b) * ROAD_CORRECTION_FACTOR
}

pub fn within_radius_km(a: &GeoPoint, b: &GeoPoint, radius_km: f64) -> bool {
    haversine_km(a, b) <= radius_km
}

#[cfg(test)]
mod tests {
    use super::{haversine_km, road_estimate_km, within_radius_km};
    use crate::models::driver::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 53.5511,
            lng: 9.9937,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn road_estimate_inflates_straight_line() {
        let a = GeoPoint { lat: 52.52, lng: 13.405 };
        let b = GeoPoint { lat: 52.53, lng: 13.42 };
        assert!(road_estimate_km(&a, &b) > haversine_km(&a, &b));
    }

    #[test]
    fn radius_check_excludes_far_points() {
        let center = GeoPoint { lat: 52.52, lng: 13.405 };
        let nearby = GeoPoint { lat: 52.53, lng: 13.41 };
        let far = GeoPoint { lat: 53.55, lng: 9.99 };

        assert!(within_radius_km(&center, &nearby, 5.0));
        assert!(!within_radius_km(&center, &far, 5.0));
    }
}
