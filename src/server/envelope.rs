//! JSON response envelope.
//!
//! Success: `{"success": true, "data": ...}`.
//! Failure: `{"success": false, "data": {"message": ...}}` with the status
//! code of the error kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::error_handling::ServiceError;

pub struct Envelope<T>(pub T);

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            Json(json!({ "success": true, "data": self.0 })),
        )
            .into_response()
    }
}

/// Error half of the envelope.
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            Json(json!({ "success": false, "data": { "message": self.0.message() } })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<Envelope<T>, ApiError>;
