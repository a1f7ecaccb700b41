//! Domain error to HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dandan::DandanError;
use serde_json::json;

pub struct ApiError(pub DandanError);

impl From<DandanError> for ApiError {
    fn from(error: DandanError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DandanError::UnknownIdentifier(_) | DandanError::NoAdapter(_) => {
                StatusCode::BAD_REQUEST
            }
            DandanError::Validation(_) => StatusCode::BAD_REQUEST,
            DandanError::Adapter(_) | DandanError::Persistence(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "message": self.0.to_string() }))).into_response()
    }
}
