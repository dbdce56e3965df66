//! Error types for the SAGE daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sage_types::{ErrorBody, ErrorCode};
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Action catalog failed to load
    #[error("Catalog error: {0}")]
    Catalog(#[from] sage_registry::RegistryError),

    /// Seed fixture could not be applied
    #[error("Seed error: {0}")]
    Seed(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API errors, carrying the execution error taxonomy.
#[derive(Debug)]
pub struct ApiError(pub ErrorBody);

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.0.code, self.0.message)
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self(ErrorBody {
            code,
            message: message.into(),
            details: None,
        })
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        let message: String = message.into();
        tracing::error!(error = %message, "Request failed");
        Self::new(ErrorCode::InternalError, "Internal error")
    }
}

impl From<sage_situation::SituationError> for ApiError {
    fn from(err: sage_situation::SituationError) -> Self {
        use sage_situation::SituationError;
        match &err {
            SituationError::InvalidTransition { .. } | SituationError::UnreachableState { .. } => {
                Self::new(ErrorCode::StateGuard, err.to_string())
            }
            SituationError::NotFound(_) => Self::not_found(err.to_string()),
            SituationError::LockError => Self::internal(err.to_string()),
        }
    }
}

impl From<sage_dispatcher::StoreError> for ApiError {
    fn from(err: sage_dispatcher::StoreError) -> Self {
        match &err {
            sage_dispatcher::StoreError::NotFound(_) => Self::not_found(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

/// HTTP status for an error code.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationError | ErrorCode::SignatureRequired | ErrorCode::AlreadyResolved => {
            StatusCode::BAD_REQUEST
        }
        ErrorCode::SignatureInvalid => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::StateGuard | ErrorCode::TokenExpired | ErrorCode::TokenStale => {
            StatusCode::CONFLICT
        }
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error response body, shaped like a failed execution response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.code);
        let body = ErrorResponse {
            success: false,
            error: self.0,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
