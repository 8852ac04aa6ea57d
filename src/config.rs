use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub dispatch_queue_size: usize,
    /// Broadcast buffer per tracking room; slow subscribers lag past it and
    /// simply miss ticks.
    pub room_buffer_size: usize,
    pub offer_ttl_secs: u64,
    /// Simultaneous offers per round, first accept wins.
    pub offer_batch_size: usize,
    pub max_dispatch_rounds: u32,
    pub search_radius_km: f64,
    pub radius_step_km: f64,
    /// Driver positions older than this are unusable for dispatch ranking.
    pub position_max_age_secs: i64,
    pub avg_speed_kmh: f64,
    pub geocode_base_url: String,
    pub route_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            dispatch_queue_size: parse_or_default("DISPATCH_QUEUE_SIZE", 1024)?,
            room_buffer_size: parse_or_default("ROOM_BUFFER_SIZE", 64)?,
            offer_ttl_secs: parse_or_default("OFFER_TTL_SECS", 45)?,
            offer_batch_size: parse_or_default("OFFER_BATCH_SIZE", 3)?,
            max_dispatch_rounds: parse_or_default("MAX_DISPATCH_ROUNDS", 3)?,
            search_radius_km: parse_or_default("SEARCH_RADIUS_KM", 5.0)?,
            radius_step_km: parse_or_default("RADIUS_STEP_KM", 5.0)?,
            position_max_age_secs: parse_or_default("POSITION_MAX_AGE_SECS", 120)?,
            avg_speed_kmh: parse_or_default("AVG_SPEED_KMH", 25.0)?,
            geocode_base_url: env::var("GEOCODE_BASE_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string()),
            route_base_url: env::var("ROUTE_BASE_URL")
                .unwrap_or_else(|_| "https://router.project-osrm.org".to_string()),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
