//! API request handlers

mod actions;
mod audit;
mod decisions;
mod health;
mod situations;

pub use actions::*;
pub use audit::*;
pub use decisions::*;
pub use health::*;
pub use situations::*;

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use sage_types::{EntityKey, EntityType};

/// Key from `/:entity_type/:entity_id` path segments.
pub(crate) fn entity_key(entity_type: &str, entity_id: &str) -> ApiResult<EntityKey> {
    let entity_type: EntityType = entity_type
        .parse()
        .map_err(|e: sage_types::UnknownVariant| ApiError::validation(e.to_string()))?;
    if entity_id.trim().is_empty() {
        return Err(ApiError::validation("entity id must not be empty"));
    }
    Ok(EntityKey::new(entity_type, entity_id))
}

/// Key of an entity the store holds; `NOT_FOUND` otherwise.
pub(crate) async fn stored_entity_key(
    state: &AppState,
    entity_type: &str,
    entity_id: &str,
) -> ApiResult<EntityKey> {
    let key = entity_key(entity_type, entity_id)?;
    if state.store().get(&key).await?.is_none() {
        return Err(ApiError::not_found(format!("Entity not found: {}", key)));
    }
    Ok(key)
}
