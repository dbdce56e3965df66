//! Execution request/response envelopes and the dispatcher phase vocabulary.

use crate::entity::{EntityId, EntityType};
use crate::error::{ErrorBody, ErrorCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Direct,
    Prepare,
    Execute,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Direct => "direct",
            ExecutionMode::Prepare => "prepare",
            ExecutionMode::Execute => "execute",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller identity and provenance attached to an execution request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub entity_id: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub lens: Option<String>,
}

/// PIN plus time-based one-time code.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInput {
    pub pin: String,
    #[serde(alias = "totp")]
    pub one_time_code: String,
}

impl std::fmt::Debug for SignatureInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureInput")
            .field("pin", &"<redacted>")
            .field("one_time_code", &"<redacted>")
            .finish()
    }
}

/// `POST /actions/execute` request body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub action: String,
    pub context: ExecutionContext,
    #[serde(default)]
    pub payload: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureInput>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub from: serde_json::Value,
    pub to: serde_json::Value,
}

/// Diff a mutation would apply, computed without mutating anything.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedChanges {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    /// Entity version the diff was computed against.
    pub base_version: u64,
    pub changes: Vec<FieldChange>,
    /// Whether committing drives the entity's situation to RESOLVED.
    #[serde(default)]
    pub resolves: bool,
}

impl ProposedChanges {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// `POST /actions/execute` response body, for all three outcomes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub success: bool,
    #[serde(default)]
    pub confirmation_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_changes: Option<ProposedChanges>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ExecuteResponse {
    pub fn completed(data: serde_json::Value) -> Self {
        Self {
            success: true,
            confirmation_required: false,
            data: Some(data),
            confirmation_token: None,
            proposed_changes: None,
            expires_at: None,
            error: None,
        }
    }

    pub fn confirmation(
        token: String,
        proposed_changes: ProposedChanges,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            success: true,
            confirmation_required: true,
            data: None,
            confirmation_token: Some(token),
            proposed_changes: Some(proposed_changes),
            expires_at: Some(expires_at),
            error: None,
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::failure_with(ErrorBody {
            code,
            message: message.into(),
            details: None,
        })
    }

    pub fn failure_with(error: ErrorBody) -> Self {
        Self {
            success: false,
            confirmation_required: false,
            data: None,
            confirmation_token: None,
            proposed_changes: None,
            expires_at: None,
            error: Some(error),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// Phases an execution request passes through in the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionPhase {
    Received,
    DecisionRevalidated,
    Authorized,
    DirectExecute,
    Prepared,
    Executed,
    Audited,
    Complete,
    Rejected,
}

impl ExecutionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionPhase::Complete | ExecutionPhase::Prepared | ExecutionPhase::Rejected
        )
    }
}
