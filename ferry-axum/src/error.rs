use axum::{
    extract::multipart::MultipartError,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ferry_bundle::BundleError;
use serde_json::json;
use tracing::error;

/// Error returned by every Ferry handler
#[derive(Debug)]
pub struct FerryAxumError(pub BundleError);

impl FerryAxumError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(BundleError::invalid(message))
    }

    /// Status, error name and class name for the JSON error body
    fn kind(&self) -> (StatusCode, &'static str, &'static str) {
        match &self.0 {
            BundleError::NotFound { .. } => (StatusCode::NOT_FOUND, "NotFound", "not-found"),
            BundleError::IncompleteUpload { .. } => (StatusCode::CONFLICT, "Conflict", "conflict"),
            BundleError::Invalid { .. } => (StatusCode::BAD_REQUEST, "BadRequest", "bad-request"),
            BundleError::Storage { .. } | BundleError::Streaming { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "GeneralError",
                "general-error",
            ),
        }
    }
}

impl From<BundleError> for FerryAxumError {
    fn from(e: BundleError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for FerryAxumError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Failed to parse the request body as JSON: {}", rejection.body_text()))
    }
}

impl From<MultipartError> for FerryAxumError {
    fn from(e: MultipartError) -> Self {
        Self::bad_request(format!("Malformed multipart body: {}", e.body_text()))
    }
}

impl IntoResponse for FerryAxumError {
    fn into_response(self) -> Response {
        let (status, name, class_name) = self.kind();

        // Server-side failures keep their details in the log, not the response
        let message = if status.is_server_error() {
            error!(error = %self.0, "Request failed");
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };

        let body = json!({
            "name": name,
            "message": message,
            "code": status.as_u16(),
            "className": class_name,
        });
        (status, Json(body)).into_response()
    }
}
