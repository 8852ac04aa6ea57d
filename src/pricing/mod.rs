//! Delivery fee calculator. Pure given its inputs apart from the two provider
//! calls (geocode, route); identical inputs yield identical fee decisions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo;
use crate::georoute::GeoRouter;
use crate::models::driver::GeoPoint;
use crate::models::merchant::PricingParams;
use crate::models::order::Destination;

#[derive(Debug, Error)]
pub enum FeeError {
    #[error("could not resolve delivery address: {0}")]
    UnresolvableAddress(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeQuote {
    pub is_within_range: bool,
    pub reason: Option<String>,
    /// Final amount charged, rounded up to the nearest currency unit.
    pub fee: f64,
    /// Cost before the free-delivery override, kept for transparency.
    pub raw_cost: f64,
    /// Round-trip distance the fee was computed from (merchant -> customer
    /// -> merchant, since the driver returns).
    pub distance_km: f64,
    pub is_real_road_distance: bool,
    pub is_free_delivery: bool,
}

#[derive(Debug, Clone)]
pub struct QuotedFee {
    pub quote: FeeQuote,
    /// Destination coordinates, geocoded here when the caller only had text.
    pub destination: GeoPoint,
}

pub async fn quote_fee(
    router: &dyn GeoRouter,
    origin: GeoPoint,
    destination: &Destination,
    subtotal: f64,
    pricing: &PricingParams,
) -> Result<QuotedFee, FeeError> {
    let target = match destination.location {
        Some(point) => point,
        None => router
            .geocode(&destination.address)
            .await
            .map_err(|_| FeeError::UnresolvableAddress(destination.address.clone()))?,
    };

    let (distance_km, is_real_road_distance) =
        match router.route(origin, origin, &[target]).await {
            Ok(leg) => (leg.distance_meters / 1000.0, true),
            Err(err) => {
                tracing::debug!(error = %err, "routing unavailable, estimating round trip");
                (geo::road_estimate_km(&origin, &target) * 2.0, false)
            }
        };

    if distance_km > pricing.max_delivery_distance_km {
        return Ok(QuotedFee {
            quote: FeeQuote {
                is_within_range: false,
                reason: Some(format!(
                    "destination is {distance_km:.1} km round trip, beyond the {:.1} km service limit",
                    pricing.max_delivery_distance_km
                )),
                fee: 0.0,
                raw_cost: 0.0,
                distance_km,
                is_real_road_distance,
                is_free_delivery: false,
            },
            destination: target,
        });
    }

    let raw_cost = (distance_km * pricing.fuel_consumption_per_km * pricing.fuel_price_per_liter
        + pricing.base_fee)
        * pricing.maintenance_multiplier;

    let is_free_delivery = pricing
        .free_delivery_threshold
        .is_some_and(|threshold| subtotal >= threshold);

    let fee = if is_free_delivery { 0.0 } else { raw_cost.ceil() };

    Ok(QuotedFee {
        quote: FeeQuote {
            is_within_range: true,
            reason: None,
            fee,
            raw_cost,
            distance_km,
            is_real_road_distance,
            is_free_delivery,
        },
        destination: target,
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::{quote_fee, FeeError};
    use crate::georoute::{GeoRouteError, GeoRouter, RouteLeg};
    use crate::models::driver::GeoPoint;
    use crate::models::merchant::PricingParams;
    use crate::models::order::Destination;

    struct StubRouter {
        geocode_hit: Option<GeoPoint>,
        route_km: Option<f64>,
    }

    #[async_trait]
    impl GeoRouter for StubRouter {
        async fn geocode(&self, address: &str) -> Result<GeoPoint, GeoRouteError> {
            self.geocode_hit
                .ok_or_else(|| GeoRouteError::AddressNotFound(address.to_string()))
        }

        async fn route(
            &self,
            _origin: GeoPoint,
            _destination: GeoPoint,
            _waypoints: &[GeoPoint],
        ) -> Result<RouteLeg, GeoRouteError> {
            match self.route_km {
                Some(km) => Ok(RouteLeg {
                    distance_meters: km * 1000.0,
                    duration_seconds: km / 25.0 * 3600.0,
                    polyline: String::new(),
                }),
                None => Err(GeoRouteError::Transport("stubbed outage".to_string())),
            }
        }
    }

    fn pricing() -> PricingParams {
        PricingParams {
            fuel_price_per_liter: 2.0,
            fuel_consumption_per_km: 0.1,
            base_fee: 3.0,
            maintenance_multiplier: 1.2,
            max_delivery_distance_km: 30.0,
            free_delivery_threshold: Some(100.0),
        }
    }

    fn origin() -> GeoPoint {
        GeoPoint { lat: 52.52, lng: 13.405 }
    }

    fn dest_with_coords() -> Destination {
        Destination {
            address: "Karl-Marx-Allee 1, Berlin".to_string(),
            location: Some(GeoPoint { lat: 52.519, lng: 13.425 }),
        }
    }

    #[tokio::test]
    async fn charges_formula_below_threshold() {
        let router = StubRouter {
            geocode_hit: None,
            route_km: Some(5.0),
        };

        let quoted = quote_fee(&router, origin(), &dest_with_coords(), 40.0, &pricing())
            .await
            .unwrap();

        let quote = quoted.quote;
        assert!(quote.is_within_range);
        assert!(!quote.is_free_delivery);
        assert!(quote.is_real_road_distance);
        assert_eq!(quote.distance_km, 5.0);
        // (5 km * 0.1 L/km * 2.0/L + 3.0) * 1.2 = 4.8, rounded up
        assert_eq!(quote.fee, 5.0);
        assert!((quote.raw_cost - 4.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn free_delivery_at_threshold_keeps_raw_figures() {
        let router = StubRouter {
            geocode_hit: None,
            route_km: Some(5.0),
        };

        let quoted = quote_fee(&router, origin(), &dest_with_coords(), 100.0, &pricing())
            .await
            .unwrap();

        let quote = quoted.quote;
        assert!(quote.is_free_delivery);
        assert_eq!(quote.fee, 0.0);
        assert_eq!(quote.distance_km, 5.0);
        assert!((quote.raw_cost - 4.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn out_of_range_regardless_of_subtotal() {
        let router = StubRouter {
            geocode_hit: None,
            route_km: Some(80.0),
        };

        let quoted = quote_fee(&router, origin(), &dest_with_coords(), 500.0, &pricing())
            .await
            .unwrap();

        let quote = quoted.quote;
        assert!(!quote.is_within_range);
        assert!(!quote.is_free_delivery);
        assert_eq!(quote.fee, 0.0);
        assert!(quote.reason.unwrap().contains("service limit"));
    }

    #[tokio::test]
    async fn routing_outage_degrades_to_tagged_estimate() {
        let router = StubRouter {
            geocode_hit: None,
            route_km: None,
        };

        let quoted = quote_fee(&router, origin(), &dest_with_coords(), 40.0, &pricing())
            .await
            .unwrap();

        let quote = quoted.quote;
        assert!(!quote.is_real_road_distance);
        assert!(quote.distance_km > 0.0);
        assert!(quote.fee > 0.0);
    }

    #[tokio::test]
    async fn unresolvable_address_is_surfaced_not_zeroed() {
        let router = StubRouter {
            geocode_hit: None,
            route_km: Some(5.0),
        };
        let destination = Destination {
            address: "nowhere in particular".to_string(),
            location: None,
        };

        let result = quote_fee(&router, origin(), &destination, 40.0, &pricing()).await;

        assert!(matches!(result, Err(FeeError::UnresolvableAddress(_))));
    }

    #[tokio::test]
    async fn geocodes_when_coordinates_missing() {
        let router = StubRouter {
            geocode_hit: Some(GeoPoint { lat: 52.5, lng: 13.4 }),
            route_km: Some(4.0),
        };
        let destination = Destination {
            address: "Alexanderplatz, Berlin".to_string(),
            location: None,
        };

        let quoted = quote_fee(&router, origin(), &destination, 40.0, &pricing())
            .await
            .unwrap();

        assert_eq!(quoted.destination.lat, 52.5);
        assert!(quoted.quote.is_within_range);
    }
}
