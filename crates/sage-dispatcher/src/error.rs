use crate::signature::SignatureError;
use crate::store::StoreError;
use crate::token::TokenError;
use sage_types::{ActionId, BlockReason, BlockedBy, ErrorBody, ErrorCode};
use serde_json::json;
use thiserror::Error;

/// Every way an execution request can be rejected.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Action not reachable in current situation: {0}")]
    StateGuard(String),

    #[error("{key} already {status}")]
    AlreadyResolved { key: String, status: String },

    #[error("Signature required for {0}")]
    SignatureRequired(ActionId),

    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Confirmation token expired")]
    TokenExpired,

    #[error("Confirmation no longer valid: {0}")]
    TokenStale(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DispatchError::Validation(_) => ErrorCode::ValidationError,
            DispatchError::NotFound(_) => ErrorCode::NotFound,
            DispatchError::Forbidden(_) => ErrorCode::Forbidden,
            DispatchError::StateGuard(_) => ErrorCode::StateGuard,
            DispatchError::AlreadyResolved { .. } => ErrorCode::AlreadyResolved,
            DispatchError::SignatureRequired(_) => ErrorCode::SignatureRequired,
            DispatchError::SignatureInvalid(_) => ErrorCode::SignatureInvalid,
            DispatchError::TokenExpired => ErrorCode::TokenExpired,
            DispatchError::TokenStale(_) => ErrorCode::TokenStale,
            DispatchError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let details = match self {
            DispatchError::AlreadyResolved { status, .. } => Some(json!({
                "status": status,
                "reason": format!("ALREADY_{}", status.to_ascii_uppercase()),
            })),
            DispatchError::Forbidden(reason) => Some(json!({ "reason": reason })),
            // Internal detail stays in the logs.
            DispatchError::Internal(_) => {
                return ErrorBody {
                    code: self.code(),
                    message: "Internal error".to_string(),
                    details: None,
                }
            }
            _ => None,
        };
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
            details,
        }
    }

    /// Map a revalidated block onto the execution error taxonomy.
    pub(crate) fn from_block(blocked: &BlockedBy) -> Self {
        match blocked.kind {
            BlockReason::StateGuard => DispatchError::StateGuard(blocked.detail.clone()),
            BlockReason::Permission | BlockReason::Forbidden => {
                DispatchError::Forbidden(blocked.detail.clone())
            }
            BlockReason::MissingTrigger | BlockReason::Threshold => {
                DispatchError::Validation(blocked.detail.clone())
            }
        }
    }
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => DispatchError::NotFound(key),
            StoreError::VersionConflict { .. } => DispatchError::TokenStale(err.to_string()),
            StoreError::Audit(_) | StoreError::Internal(_) => DispatchError::Internal(err.to_string()),
        }
    }
}

impl From<TokenError> for DispatchError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => DispatchError::TokenExpired,
            TokenError::Unknown | TokenError::Mismatch(_) => DispatchError::TokenStale(err.to_string()),
            TokenError::Encoding(_) | TokenError::LockError => DispatchError::Internal(err.to_string()),
        }
    }
}

impl From<SignatureError> for DispatchError {
    fn from(err: SignatureError) -> Self {
        DispatchError::SignatureInvalid(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_resolved_carries_specific_reason() {
        let body = DispatchError::AlreadyResolved {
            key: "receiving/RCV-1".to_string(),
            status: "accepted".to_string(),
        }
        .to_body();
        assert_eq!(body.code, ErrorCode::AlreadyResolved);
        assert_eq!(body.details.unwrap()["reason"], "ALREADY_ACCEPTED");
    }

    #[test]
    fn internal_errors_do_not_leak() {
        let body = DispatchError::Internal("journal offline at 10.0.0.7".to_string()).to_body();
        assert_eq!(body.message, "Internal error");
    }

    #[test]
    fn threshold_blocks_are_validation_errors() {
        let err = DispatchError::from_block(&BlockedBy {
            kind: BlockReason::Threshold,
            detail: "stock_quantity > 0 (actual 0)".to_string(),
        });
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }
}
