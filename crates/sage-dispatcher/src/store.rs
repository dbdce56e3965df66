//! Entity storage and the atomic mutation + audit commit.

use async_trait::async_trait;
use sage_audit::{AuditError, AuditJournal, AuditRecorder, InMemoryJournal};
use sage_types::{AuditEntry, AuditRecord, EntityKey, EntitySnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// One mutation and its audit entry, to be applied together or not at all.
#[derive(Clone, Debug)]
pub struct Commit {
    /// Full post-mutation snapshot. Its version is assigned by the store.
    pub snapshot: EntitySnapshot,
    /// Version the mutation was computed against.
    pub expected_version: u64,
    pub audit: AuditEntry,
}

#[derive(Clone, Debug)]
pub struct CommitReceipt {
    pub snapshot: EntitySnapshot,
    pub record: AuditRecord,
}

/// Entity storage collaborator.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Get an entity snapshot
    async fn get(&self, key: &EntityKey) -> StoreResult<Option<EntitySnapshot>>;

    /// Insert or replace an entity outside the governed path (seeding, sync)
    async fn put(&self, snapshot: EntitySnapshot) -> StoreResult<()>;

    /// List all entities
    async fn list(&self) -> StoreResult<Vec<EntitySnapshot>>;

    /// Apply a mutation and write its audit record as one unit.
    ///
    /// Fails with [`StoreError::VersionConflict`] if the entity moved since
    /// `expected_version`, and leaves the entity untouched if the audit write
    /// fails.
    async fn commit(&self, commit: Commit) -> StoreResult<CommitReceipt>;

    /// Audit history for one entity
    async fn history(&self, key: &EntityKey) -> StoreResult<Vec<AuditRecord>>;
}

/// In-memory entity store backed by an audit journal.
pub struct InMemoryStore {
    entities: RwLock<HashMap<EntityKey, EntitySnapshot>>,
    journal: Arc<dyn AuditJournal>,
    recorder: AuditRecorder,
}

impl InMemoryStore {
    pub fn new(recorder: AuditRecorder) -> Self {
        Self::with_journal(recorder, Arc::new(InMemoryJournal::new()))
    }

    pub fn with_journal(recorder: AuditRecorder, journal: Arc<dyn AuditJournal>) -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            journal,
            recorder,
        }
    }

    pub fn journal(&self) -> &Arc<dyn AuditJournal> {
        &self.journal
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn get(&self, key: &EntityKey) -> StoreResult<Option<EntitySnapshot>> {
        Ok(self.entities.read().await.get(key).cloned())
    }

    async fn put(&self, snapshot: EntitySnapshot) -> StoreResult<()> {
        self.entities.write().await.insert(snapshot.key(), snapshot);
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<EntitySnapshot>> {
        let mut all: Vec<_> = self.entities.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(all)
    }

    async fn commit(&self, commit: Commit) -> StoreResult<CommitReceipt> {
        let key = commit.snapshot.key();
        // Held across the audit write so no reader sees the record without the mutation.
        let mut entities = self.entities.write().await;

        let current = entities
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if current.version != commit.expected_version {
            return Err(StoreError::VersionConflict {
                key: key.to_string(),
                expected: commit.expected_version,
                actual: current.version,
            });
        }

        let record = self
            .recorder
            .record(self.journal.as_ref(), commit.audit)
            .await?;

        let mut snapshot = commit.snapshot;
        snapshot.version = commit.expected_version + 1;
        entities.insert(key, snapshot.clone());

        Ok(CommitReceipt { snapshot, record })
    }

    async fn history(&self, key: &EntityKey) -> StoreResult<Vec<AuditRecord>> {
        Ok(self.journal.by_entity(key).await?)
    }
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("{key} changed: expected version {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("Audit write failed: {0}")]
    Audit(#[from] AuditError),

    #[error("Storage error: {0}")]
    Internal(String),
}
