use crate::tracker::{ActionRecordId, ActionStatus};
use sage_types::{ErrorBody, ErrorCode};
use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Client errors
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The request never produced an HTTP response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("API error ({status}): {}", .error.as_ref().map(|e| e.message.as_str()).unwrap_or("no error body"))]
    Api {
        status: u16,
        error: Option<ErrorBody>,
    },

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unknown action record: {0}")]
    UnknownRecord(ActionRecordId),

    #[error("Action record {id} is {status}, expected pending")]
    NotPending {
        id: ActionRecordId,
        status: ActionStatus,
    },

    #[error("Action record {0} has no confirmation outstanding")]
    NoConfirmation(ActionRecordId),

    /// A request for the record is still awaiting the server's answer.
    #[error("Action record {0} has a request in flight")]
    InFlight(ActionRecordId),

    #[error("Confirmation for action record {0} has expired")]
    ConfirmationExpired(ActionRecordId),

    #[error("Lock error")]
    LockError,
}

impl ClientError {
    /// Network-class failures worth retrying unchanged.
    ///
    /// A server-side `INTERNAL_ERROR` is not one of them: the mutation may
    /// already have committed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Api { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// Server error code, when the server supplied one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Api {
                error: Some(body), ..
            } => Some(body.code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}
