use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, gateway::GatewayError, state::intent::InvalidTransition};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing or malformed input, rejected before any side effect.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The allocator spent its whole attempt budget without finding a free ticket number.
    #[error("sold out")]
    SoldOut,
    /// The payment gateway call failed.
    #[error("payment gateway error")]
    Upstream(#[source] GatewayError),
    /// Caller lacks the required role.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable error-kind string consumed by callers to pick a status and message.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => "invalid-argument",
            ServiceError::SoldOut => "resource-exhausted",
            ServiceError::PermissionDenied(_) => "permission-denied",
            ServiceError::NotFound(_) => "not-found",
            ServiceError::Upstream(_) | ServiceError::Unavailable(_) | ServiceError::Degraded => {
                "unavailable"
            }
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        ServiceError::Upstream(err)
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Input failed validation.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Missing or wrong admin token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Every ticket number is taken.
    #[error("sold out: {0}")]
    SoldOut(String),
    /// The payment gateway call failed.
    #[error("bad gateway: {0}")]
    BadGateway(String),
    /// Storage is unreachable or the service is degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Unexpected server-side failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable error-kind string carried in the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "invalid-argument",
            AppError::Unauthorized(_) => "permission-denied",
            AppError::NotFound(_) => "not-found",
            AppError::SoldOut(_) => "resource-exhausted",
            AppError::BadGateway(_) | AppError::ServiceUnavailable(_) => "unavailable",
            AppError::Internal(_) => "internal",
        }
    }

    /// Map a webhook processing failure so the gateway redelivers.
    ///
    /// Authentication and payload errors stay client errors; everything else becomes a 500.
    pub fn from_webhook_failure(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::SoldOut => AppError::SoldOut("no ticket number is available".into()),
            ServiceError::Upstream(source) => AppError::BadGateway(source.to_string()),
            ServiceError::PermissionDenied(message) => AppError::Unauthorized(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Internal(message) => AppError::Internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SoldOut(_) => StatusCode::CONFLICT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_kinds_are_stable() {
        assert_eq!(ServiceError::SoldOut.kind(), "resource-exhausted");
        assert_eq!(
            ServiceError::InvalidInput("x".into()).kind(),
            "invalid-argument"
        );
        assert_eq!(ServiceError::Degraded.kind(), "unavailable");
        assert_eq!(
            AppError::from(ServiceError::PermissionDenied("x".into())).kind(),
            "permission-denied"
        );
    }

    #[test]
    fn webhook_failures_become_server_errors() {
        let response = AppError::from_webhook_failure(ServiceError::Degraded).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let response =
            AppError::from_webhook_failure(ServiceError::InvalidInput("bad signature".into()))
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
