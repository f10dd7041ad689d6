use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use duet_shared::MessagingError;

/// HTTP-facing wrapper over the core error taxonomy.
#[derive(Debug)]
pub struct ServerError(pub MessagingError);

impl From<MessagingError> for ServerError {
    fn from(err: MessagingError) -> Self {
        Self(err)
    }
}

impl From<duet_store::StoreError> for ServerError {
    fn from(err: duet_store::StoreError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            MessagingError::Validation(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            MessagingError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            MessagingError::Unauthorized(_) => (StatusCode::FORBIDDEN, self.0.to_string()),
            MessagingError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
