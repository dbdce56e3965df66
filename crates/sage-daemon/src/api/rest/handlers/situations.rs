//! Situation handlers

use super::stored_entity_key;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    Json,
};
use sage_types::{Situation, SituationTrigger};
use serde::Deserialize;

/// Situation transition request
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub trigger: SituationTrigger,
}

/// Current situation of a stored entity, created in IDLE if not yet tracked.
pub async fn get_situation(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> ApiResult<Json<Situation>> {
    let key = stored_entity_key(&state, &entity_type, &entity_id).await?;
    Ok(Json(state.situations().get(&key)?))
}

/// Fire a lifecycle trigger against a stored entity's situation.
pub async fn transition_situation(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Json(request): Json<TransitionRequest>,
) -> ApiResult<Json<Situation>> {
    let key = stored_entity_key(&state, &entity_type, &entity_id).await?;
    Ok(Json(state.situations().apply(&key, request.trigger)?))
}
