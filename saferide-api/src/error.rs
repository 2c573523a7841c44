use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use saferide_core::EngineError;

#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    Internal(anyhow::Error),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Engine(err) => {
                let status = match &err {
                    EngineError::Validation(_) => StatusCode::BAD_REQUEST,
                    EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                    EngineError::Authorization(_) => StatusCode::FORBIDDEN,
                    EngineError::Conflict(_) => StatusCode::CONFLICT,
                    EngineError::AmountMismatch { .. } => StatusCode::CONFLICT,
                    EngineError::ExternalDependency(_) => StatusCode::BAD_GATEWAY,
                };
                if status == StatusCode::BAD_GATEWAY {
                    tracing::error!(error = %err, "external dependency failure");
                }
                (status, err.to_string())
            }
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
