//! Decision evaluator inputs and outputs, plus the `/decisions` wire envelope.

use crate::action::ActionId;
use crate::entity::{EntityId, EntitySnapshot, EntityType};
use crate::identity::{Department, Role};
use crate::situation::SituationState;
use serde::{Deserialize, Serialize};

/// Who is asking. `None` means the authority datum was unavailable or not
/// recognised, which makes evaluation fail closed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub role: Option<Role>,
    pub department: Option<Department>,
    #[serde(default)]
    pub detected_intents: Vec<String>,
}

impl UserContext {
    pub fn new(role: Role, department: Department) -> Self {
        Self {
            role: Some(role),
            department: Some(department),
            detected_intents: Vec::new(),
        }
    }

    /// Parse raw session claims leniently: unknown values become `None`.
    pub fn from_claims(role: Option<&str>, department: Option<&str>, intents: Vec<String>) -> Self {
        Self {
            role: role.and_then(|r| r.parse().ok()),
            department: department.and_then(|d| d.parse().ok()),
            detected_intents: intents,
        }
    }

    pub fn with_intents(mut self, intents: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.detected_intents = intents.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_complete(&self) -> bool {
        self.role.is_some() && self.department.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    Conditional,
    Rare,
}

/// Three independent scores in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub intent: f64,
    pub entity: f64,
    pub situation: f64,
}

impl ConfidenceBreakdown {
    pub fn zero() -> Self {
        Self {
            intent: 0.0,
            entity: 0.0,
            situation: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    StateGuard,
    MissingTrigger,
    Threshold,
    Permission,
    Forbidden,
}

impl BlockReason {
    /// Threshold and missing-trigger blocks are actionable by the user and may be
    /// shown disabled with their reason. The others are hidden outright.
    pub fn is_disclosed(&self) -> bool {
        matches!(self, BlockReason::MissingTrigger | BlockReason::Threshold)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockedBy {
    #[serde(rename = "type")]
    pub kind: BlockReason,
    pub detail: String,
}

/// Per-action verdict. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDecision {
    pub action: ActionId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub allowed: bool,
    pub tier: Tier,
    pub confidence: f64,
    pub breakdown: ConfidenceBreakdown,
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<BlockedBy>,
    pub signature_required: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_run: bool,
}

/// Client-observed situation state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SituationHint {
    pub state: SituationState,
}

/// One entity in a decision request, optionally carrying its own situation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityContext {
    #[serde(flatten)]
    pub snapshot: EntitySnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub situation: Option<SituationHint>,
}

/// `POST /decisions` request body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub detected_intents: Vec<String>,
    #[serde(default)]
    pub entities: Vec<EntityContext>,
    /// Fallback situation for entities that carry none.
    #[serde(default)]
    pub situation: Option<SituationHint>,
    #[serde(default)]
    pub include_blocked: bool,
}

impl DecisionRequest {
    pub fn user_context(&self) -> UserContext {
        UserContext::from_claims(
            self.role.as_deref(),
            self.department.as_deref(),
            self.detected_intents.clone(),
        )
    }
}

/// `POST /decisions` response body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    pub execution_id: String,
    pub decisions: Vec<ActionDecision>,
    pub allowed_count: usize,
    pub blocked_count: usize,
    pub timing_ms: u64,
}
