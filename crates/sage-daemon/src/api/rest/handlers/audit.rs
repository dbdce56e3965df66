//! Audit history handler

use super::stored_entity_key;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    Json,
};
use sage_types::AuditRecord;

/// Append-only audit records for one entity, oldest first.
pub async fn entity_history(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<AuditRecord>>> {
    let key = stored_entity_key(&state, &entity_type, &entity_id).await?;
    Ok(Json(state.store().history(&key).await?))
}
