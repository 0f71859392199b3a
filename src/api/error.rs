use crate::error::WatchError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
}

impl IntoResponse for WatchError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            WatchError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
            WatchError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            WatchError::UpstreamUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable")
            }
            WatchError::DeliveryFailed { .. } => (StatusCode::BAD_GATEWAY, "delivery_failed"),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            kind,
        });

        (status, body).into_response()
    }
}
