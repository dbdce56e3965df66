use crate::action::ActionId;
use crate::entity::{EntityId, EntityKey, EntityType};
use crate::execution::FieldChange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditRecordId(pub String);

impl AuditRecordId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for AuditRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who performed the mutation, as resolved at admission time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub role: String,
    pub department: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditMetadata {
    pub source: String,
    #[serde(default)]
    pub lens: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// Evidence that a signed action was confirmed by its signer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSignature {
    pub signer: String,
    pub method: String,
    /// Digest binding the signature to the redeemed confirmation token.
    pub binding: String,
    pub signed_at: DateTime<Utc>,
}

/// What a caller hands the recorder. The recorder assigns identity and time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub action: ActionId,
    pub actor: Actor,
    #[serde(default)]
    pub signature: Option<AuditSignature>,
    #[serde(default)]
    pub changes: Vec<FieldChange>,
    pub metadata: AuditMetadata,
}

/// Immutable, append-only audit row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub record_id: AuditRecordId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub action: ActionId,
    pub actor: Actor,
    pub signature: Option<AuditSignature>,
    pub changes: Vec<FieldChange>,
    pub metadata: AuditMetadata,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn key(&self) -> EntityKey {
        EntityKey {
            entity_type: self.entity_type,
            entity_id: self.entity_id.clone(),
        }
    }
}
