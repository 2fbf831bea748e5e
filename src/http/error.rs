use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::app::error::PushError;
use crate::domain::dispatch::DispatchHistoryEntry;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    body: Option<Value>,
}

#[derive(Serialize)]
struct PartialDispatchResponse {
    entry: DispatchHistoryEntry,
    failed: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            body: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            body: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            body: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
            body: None,
        }
    }

    /// Some jobs of a broadcast were queued: 207 with `{entry, failed}`.
    pub fn partial_dispatch(entry: DispatchHistoryEntry, failed: usize) -> Self {
        tracing::warn!(broadcast_id = %entry.id, failed, "broadcast partially queued");
        let body = serde_json::to_value(PartialDispatchResponse { entry, failed }).ok();
        Self {
            status: StatusCode::MULTI_STATUS,
            message: format!("{} dispatch jobs could not be queued", failed),
            body,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
            body: None,
        }
    }
}

impl From<PushError> for AppError {
    fn from(err: PushError) -> Self {
        match err {
            PushError::NoContent | PushError::EmptyAudience => Self::bad_request(err.to_string()),
            PushError::CapabilityUnsupported { .. } | PushError::PermissionDenied => {
                Self::forbidden(err.to_string())
            }
            PushError::AgentUnavailable(_)
            | PushError::AgentTimeout(_)
            | PushError::TokenRequestFailed(_)
            | PushError::PermissionRequestFailed(_) => Self::unavailable(err.to_string()),
            PushError::PartialDispatchFailure { failed, entry } => {
                Self::partial_dispatch(entry, failed)
            }
            PushError::Store(_) => {
                tracing::error!(error = %err, "push operation failed");
                Self::internal("push operation failed")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(body) = self.body {
            return (self.status, Json(body)).into_response();
        }
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
