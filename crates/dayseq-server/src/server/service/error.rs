//! Error type for the HTTP service.
//!
//! [`ServiceError`] wraps allocation failures and request validation errors,
//! and implements [`IntoResponse`] so handlers can return it directly. A
//! failed allocation is always a 5xx: no fallback serial is ever fabricated.
//!
//! ## Status mapping
//! - `StorageUnavailable` -> 503, the caller may retry.
//! - `CorruptState`, `CounterExhausted` -> 500, needs an operator.
//! - Malformed input -> 400.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Allocating or reading a counter failed.
    #[error(transparent)]
    Allocation(#[from] dayseq::Error),

    /// The client request was malformed.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The blocking allocation task panicked or was cancelled.
    #[error("Allocation task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ServiceError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        use dayseq::Error;
        match self {
            Self::Allocation(Error::StorageUnavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Allocation(Error::InvalidDateKey { .. } | Error::InvalidSerial { .. }) => {
                StatusCode::BAD_REQUEST
            }
            Self::Allocation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::TaskFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        use dayseq::Error;
        match self {
            Self::Allocation(Error::StorageUnavailable { .. }) => "storage_unavailable",
            Self::Allocation(Error::CorruptState { .. }) => "corrupt_state",
            Self::Allocation(Error::CounterExhausted { .. }) => "counter_exhausted",
            Self::Allocation(_) | Self::InvalidRequest { .. } => "invalid",
            Self::TaskFailed(_) => "task_failed",
        }
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
