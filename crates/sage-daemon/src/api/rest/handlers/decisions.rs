//! Decision handler

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{extract::State, Json};
use sage_evaluator::DecisionSummary;
use sage_situation::SituationMachine;
use sage_types::{DecisionRequest, DecisionResponse, EntityContext, Situation, SituationHint};
use std::time::Instant;

/// Evaluate every action on every entity in the request.
///
/// Decisions are advisory. Nothing here is trusted again at execution time.
pub async fn evaluate_decisions(
    State(state): State<AppState>,
    Json(request): Json<DecisionRequest>,
) -> ApiResult<Json<DecisionResponse>> {
    let started = Instant::now();
    let execution_id = uuid::Uuid::new_v4().to_string();
    let user = request.user_context();

    let mut summary = DecisionSummary::default();
    for entity in &request.entities {
        let situation = situation_for(&state, entity, request.situation)?;
        let decisions = state
            .evaluator()
            .evaluate(&user, &entity.snapshot, situation.as_ref());
        summary.extend(DecisionSummary::from_decisions(
            decisions,
            request.include_blocked,
        ));
    }

    tracing::debug!(
        execution_id = %execution_id,
        entities = request.entities.len(),
        allowed = summary.allowed_count,
        blocked = summary.blocked_count,
        "Decisions evaluated"
    );

    Ok(Json(DecisionResponse {
        execution_id,
        decisions: summary.decisions,
        allowed_count: summary.allowed_count,
        blocked_count: summary.blocked_count,
        timing_ms: started.elapsed().as_millis() as u64,
    }))
}

/// Per-entity hint, then the request-wide hint, then the tracked situation.
/// `None` makes evaluation fail closed.
fn situation_for(
    state: &AppState,
    entity: &EntityContext,
    request_hint: Option<SituationHint>,
) -> ApiResult<Option<Situation>> {
    let key = entity.snapshot.key();
    match entity.situation.or(request_hint) {
        Some(hint) => Ok(Some(SituationMachine::from_hint(&key, hint.state))),
        None => Ok(state.situations().peek(&key)?),
    }
}
