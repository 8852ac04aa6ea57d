//! Client for the external geocoding + driving-directions provider, plus the
//! straight-line fallback used whenever the provider is unreachable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo;
use crate::models::driver::GeoPoint;

#[derive(Debug, Error)]
pub enum GeoRouteError {
    #[error("no match for address: {0}")]
    AddressNotFound(String),

    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider returned unusable payload: {0}")]
    Payload(String),
}

#[derive(Debug, Clone)]
pub struct RouteLeg {
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub polyline: String,
}

#[async_trait]
pub trait GeoRouter: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<GeoPoint, GeoRouteError>;

    /// Driving route origin -> waypoints... -> destination.
    async fn route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        waypoints: &[GeoPoint],
    ) -> Result<RouteLeg, GeoRouteError>;
}

/// Whether a figure came from the provider or from the haversine fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimateKind {
    Exact,
    Estimated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TravelEstimate {
    pub distance_km: f64,
    pub duration_seconds: f64,
    pub kind: EstimateKind,
}

/// Route the provider if possible, otherwise degrade to a tagged estimate.
/// The caller always gets a figure; `kind` says how much to trust it.
pub async fn travel_estimate(
    router: &dyn GeoRouter,
    from: GeoPoint,
    to: GeoPoint,
    avg_speed_kmh: f64,
) -> TravelEstimate {
    match router.route(from, to, &[]).await {
        Ok(leg) => TravelEstimate {
            distance_km: leg.distance_meters / 1000.0,
            duration_seconds: leg.duration_seconds,
            kind: EstimateKind::Exact,
        },
        Err(err) => {
            tracing::debug!(error = %err, "routing unavailable, falling back to straight-line");
            straight_line_estimate(from, to, avg_speed_kmh)
        }
    }
}

pub fn straight_line_estimate(from: GeoPoint, to: GeoPoint, avg_speed_kmh: f64) -> TravelEstimate {
    let distance_km = geo::road_estimate_km(&from, &to);
    TravelEstimate {
        distance_km,
        duration_seconds: distance_km / avg_speed_kmh * 3600.0,
        kind: EstimateKind::Estimated,
    }
}

/// HTTP implementation over a Nominatim-style geocoder and an OSRM-style
/// directions service.
pub struct HttpGeoRouter {
    http: reqwest::Client,
    geocode_base: String,
    route_base: String,
}

impl HttpGeoRouter {
    pub fn new(geocode_base: String, route_base: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            geocode_base: geocode_base.trim_end_matches('/').to_string(),
            route_base: route_base.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct GeocodeHit {
    lat: String,
    lon: String,
}

#[derive(Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: String,
}

#[derive(Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[async_trait]
impl GeoRouter for HttpGeoRouter {
    async fn geocode(&self, address: &str) -> Result<GeoPoint, GeoRouteError> {
        let url = format!("{}/search", self.geocode_base);
        let hits: Vec<GeocodeHit> = self
            .http
            .get(&url)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|err| GeoRouteError::Transport(err.to_string()))?
            .error_for_status()
            .map_err(|err| GeoRouteError::Transport(err.to_string()))?
            .json()
            .await
            .map_err(|err| GeoRouteError::Payload(err.to_string()))?;

        let hit = hits
            .into_iter()
            .next()
            .ok_or_else(|| GeoRouteError::AddressNotFound(address.to_string()))?;

        let lat = hit
            .lat
            .parse::<f64>()
            .map_err(|err| GeoRouteError::Payload(format!("bad latitude: {err}")))?;
        let lng = hit
            .lon
            .parse::<f64>()
            .map_err(|err| GeoRouteError::Payload(format!("bad longitude: {err}")))?;

        Ok(GeoPoint { lat, lng })
    }

    async fn route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        waypoints: &[GeoPoint],
    ) -> Result<RouteLeg, GeoRouteError> {
        let mut coords = Vec::with_capacity(waypoints.len() + 2);
        coords.push(origin);
        coords.extend_from_slice(waypoints);
        coords.push(destination);

        let path = coords
            .iter()
            .map(|p| format!("{},{}", p.lng, p.lat))
            .collect::<Vec<_>>()
            .join(";");

        let url = format!("{}/route/v1/driving/{}", self.route_base, path);
        let response: OsrmResponse = self
            .http
            .get(&url)
            .query(&[("overview", "full"), ("geometries", "polyline")])
            .send()
            .await
            .map_err(|err| GeoRouteError::Transport(err.to_string()))?
            .error_for_status()
            .map_err(|err| GeoRouteError::Transport(err.to_string()))?
            .json()
            .await
            .map_err(|err| GeoRouteError::Payload(err.to_string()))?;

        if response.code != "Ok" {
            return Err(GeoRouteError::Payload(format!(
                "provider answered with code {}",
                response.code
            )));
        }

        let route = response
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| GeoRouteError::Payload("no route in response".to_string()))?;

        Ok(RouteLeg {
            distance_meters: route.distance,
            duration_seconds: route.duration,
            polyline: route.geometry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{straight_line_estimate, EstimateKind};
    use crate::models::driver::GeoPoint;

    #[test]
    fn straight_line_estimate_is_tagged() {
        let a = GeoPoint { lat: 52.52, lng: 13.405 };
        let b = GeoPoint { lat: 52.55, lng: 13.45 };

        let estimate = straight_line_estimate(a, b, 25.0);

        assert_eq!(estimate.kind, EstimateKind::Estimated);
        assert!(estimate.distance_km > 0.0);
        assert!(estimate.duration_seconds > 0.0);
    }
}
