//! Broker error responses: `{"status":1,"message":...}` with an HTTP status.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use skiff_client::ClientError;
use skiff_rollout::RolloutError;
use tracing::warn;

/// Body shared by successful mutations and errors.
#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub status: u8,
    pub message: String,
}

impl StatusBody {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: 0,
            message: message.into(),
        })
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<ClientError> for ApiError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::NotFound { .. } => Self::not_found(e.to_string()),
            ClientError::Conflict { .. } => Self::new(StatusCode::CONFLICT, e.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<RolloutError> for ApiError {
    fn from(e: RolloutError) -> Self {
        match e {
            RolloutError::NameCollision { .. } => Self::new(StatusCode::CONFLICT, e.to_string()),
            RolloutError::Client(inner) => inner.into(),
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = self.status.as_u16(), message = %self.message, "request failed");
        let body = StatusBody {
            status: 1,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
