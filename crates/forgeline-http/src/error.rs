use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use forgeline_core::ForgeError;
use serde_json::json;

/// Maps a domain error onto an HTTP response. `InvalidInput` is the only
/// variant a caller can trigger directly (a malformed specification at
/// submit time); everything else reaching this layer is an operational
/// failure the orchestrator already recorded on the run, surfaced here
/// only for the handlers that read artifacts directly off disk.
pub struct ApiError(pub ForgeError);

impl From<ForgeError> for ApiError {
    fn from(err: ForgeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ForgeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ForgeError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            ForgeError::DependencyMissing(_) => StatusCode::NOT_FOUND,
            ForgeError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ForgeError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ForgeError::IoFailure(_) => StatusCode::NOT_FOUND,
            ForgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn not_found(message: impl Into<String>) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message.into() }))).into_response()
}
