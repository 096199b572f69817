// src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Raised at construction when required configuration fields are absent
    /// from both the explicit options and the environment.
    #[error("missing required configuration: {}", .0.join(", "))]
    Configuration(Vec<String>),

    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A Daraja endpoint rejected the request. `message` carries the
    /// gateway's `errorMessage` field when the error body parses, otherwise
    /// the raw response body.
    #[error("{operation} failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl GatewayError {
    pub fn operation(operation: &'static str, message: impl Into<String>) -> Self {
        GatewayError::Operation {
            operation,
            message: message.into(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            GatewayError::Configuration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error")
            }
            GatewayError::Authentication(_) => (StatusCode::BAD_GATEWAY, "Authentication failed"),
            GatewayError::Operation { .. } => (StatusCode::BAD_GATEWAY, "M-Pesa error"),
            GatewayError::Transport(_) => (StatusCode::BAD_GATEWAY, "Upstream unreachable"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
            "success": false,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
