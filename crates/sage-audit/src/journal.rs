//! Append-only journal storage.

use crate::AuditError;
use async_trait::async_trait;
use sage_types::{AuditRecord, EntityKey};
use tokio::sync::RwLock;

/// Result type for journal operations
pub type JournalResult<T> = Result<T, AuditError>;

/// Durable home of audit records. Implementations must never update or
/// delete a record once appended.
#[async_trait]
pub trait AuditJournal: Send + Sync {
    /// Append one sealed record
    async fn append(&self, record: AuditRecord) -> JournalResult<()>;

    /// All records for one entity, oldest first
    async fn by_entity(&self, key: &EntityKey) -> JournalResult<Vec<AuditRecord>>;

    /// Total number of records
    async fn count(&self) -> JournalResult<usize>;
}

/// In-memory journal
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditJournal for InMemoryJournal {
    async fn append(&self, record: AuditRecord) -> JournalResult<()> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn by_entity(&self, key: &EntityKey) -> JournalResult<Vec<AuditRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.entity_type == key.entity_type && r.entity_id == key.entity_id)
            .cloned()
            .collect())
    }

    async fn count(&self) -> JournalResult<usize> {
        Ok(self.records.read().await.len())
    }
}
