use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::lifecycle::TransitionError;
use crate::pricing::FeeError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("offer no longer available")]
    OfferExpired,

    #[error("order already claimed by another driver")]
    OfferAlreadyClaimed,

    #[error("driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("could not resolve delivery address: {0}")]
    UnresolvableAddress(String),

    #[error("no drivers available")]
    NoDriversAvailable,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<FeeError> for AppError {
    fn from(err: FeeError) -> Self {
        match err {
            FeeError::UnresolvableAddress(address) => AppError::UnresolvableAddress(address),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Transition(TransitionError::Illegal { .. }) => StatusCode::CONFLICT,
            AppError::Transition(TransitionError::NotAuthorized { .. }) => StatusCode::FORBIDDEN,
            AppError::OfferExpired => StatusCode::GONE,
            AppError::OfferAlreadyClaimed => StatusCode::CONFLICT,
            AppError::DriverUnavailable(_) => StatusCode::CONFLICT,
            AppError::UnresolvableAddress(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NoDriversAvailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
