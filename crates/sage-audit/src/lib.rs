//! SAGE Audit - immutable record of every committed mutation
//!
//! The recorder is the last gate before a record reaches the journal. It looks
//! up the originating action itself and refuses an unsigned record for any
//! action whose bracket demands a signature, regardless of what the caller
//! claims.

#![deny(unsafe_code)]

mod journal;

pub use journal::{AuditJournal, InMemoryJournal, JournalResult};

use sage_registry::ActionRegistry;
use sage_types::{ActionId, AuditEntry, AuditRecord, AuditRecordId};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Validates entries and stamps them into records.
#[derive(Clone, Debug)]
pub struct AuditRecorder {
    registry: Arc<ActionRegistry>,
}

impl AuditRecorder {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self { registry }
    }

    /// Check an entry against the audit invariants and assign its identity.
    ///
    /// Nothing is written; callers that need the record and their mutation to
    /// land together append the sealed record inside their own atomic unit.
    pub fn seal(&self, entry: AuditEntry) -> Result<AuditRecord, AuditError> {
        let definition = self
            .registry
            .lookup(entry.action)
            .ok_or(AuditError::UnknownAction(entry.action))?;

        match &entry.signature {
            None if definition.signature_required() => {
                warn!(
                    action = %entry.action,
                    entity_type = %entry.entity_type,
                    entity_id = %entry.entity_id,
                    "Refusing unsigned audit record for signed action"
                );
                return Err(AuditError::SignatureMissing(entry.action));
            }
            Some(signature) if signature.signer.trim().is_empty() => {
                return Err(AuditError::InvalidSignature("empty signer".to_string()));
            }
            Some(signature) if signature.binding.trim().is_empty() => {
                return Err(AuditError::InvalidSignature("empty binding".to_string()));
            }
            _ => {}
        }

        if entry.metadata.source.trim().is_empty() {
            return Err(AuditError::MissingMetadata("source"));
        }

        Ok(AuditRecord {
            record_id: AuditRecordId::generate(),
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            action: entry.action,
            actor: entry.actor,
            signature: entry.signature,
            changes: entry.changes,
            metadata: entry.metadata,
            created_at: chrono::Utc::now(),
        })
    }

    /// Seal an entry and append it to `journal`.
    pub async fn record(
        &self,
        journal: &dyn AuditJournal,
        entry: AuditEntry,
    ) -> Result<AuditRecord, AuditError> {
        let record = self.seal(entry)?;
        journal.append(record.clone()).await?;
        info!(
            record_id = %record.record_id,
            action = %record.action,
            entity = %record.key(),
            signed = record.signature.is_some(),
            "Audit record written"
        );
        Ok(record)
    }
}

/// Audit errors
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Signature required for audit record of {0}")]
    SignatureMissing(ActionId),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Missing audit metadata: {0}")]
    MissingMetadata(&'static str),

    #[error("Action not in catalog: {0}")]
    UnknownAction(ActionId),

    #[error("Journal error: {0}")]
    Journal(String),
}
