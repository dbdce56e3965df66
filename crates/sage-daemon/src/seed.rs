//! Entity fixture loading

use crate::error::{DaemonError, DaemonResult};
use sage_dispatcher::EntityStore;
use sage_situation::SituationTracker;
use sage_types::EntityContext;
use std::path::Path;

/// Read a JSON array of entity snapshots, each with an optional situation hint.
pub async fn load_fixture(path: &Path) -> DaemonResult<Vec<EntityContext>> {
    let raw = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&raw)
        .map_err(|e| DaemonError::Seed(format!("{}: {}", path.display(), e)))
}

/// Put every entry into the store and restore its situation.
///
/// Entries without a hint leave the situation to be created lazily in IDLE.
pub async fn apply_fixture(
    entries: Vec<EntityContext>,
    store: &dyn EntityStore,
    situations: &SituationTracker,
) -> DaemonResult<usize> {
    let count = entries.len();
    for entry in entries {
        let key = entry.snapshot.key();
        if let Some(hint) = entry.situation {
            situations
                .restore(&key, hint.state)
                .map_err(|e| DaemonError::Seed(format!("{}: {}", key, e)))?;
        }
        store
            .put(entry.snapshot)
            .await
            .map_err(|e| DaemonError::Seed(format!("{}: {}", key, e)))?;
        tracing::debug!(entity = %key, "Seeded entity");
    }
    Ok(count)
}
