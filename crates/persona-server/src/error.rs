use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use persona_core::domain::PersonaError;
use serde_json::json;

/// `PersonaError` as an HTTP response: `{error, message}`.
#[derive(Debug)]
pub struct ApiError(pub PersonaError);

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self(PersonaError::Validation(message.into()))
    }

    fn status(&self) -> StatusCode {
        match &self.0 {
            PersonaError::Validation(_) => StatusCode::BAD_REQUEST,
            PersonaError::NotFound(_) => StatusCode::NOT_FOUND,
            PersonaError::DependencyUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PersonaError::TransientCollector { .. }
            | PersonaError::PermanentCollector { .. }
            | PersonaError::InvalidTransition { .. }
            | PersonaError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PersonaError> for ApiError {
    fn from(err: PersonaError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = json!({
            "error": self.0.kind_name(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
