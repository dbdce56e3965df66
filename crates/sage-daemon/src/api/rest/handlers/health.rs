//! Health handler

use crate::api::rest::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub catalog_version: String,
    /// Number of actions in the loaded catalog
    pub actions: usize,
    pub uptime: String,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    let registry = state.registry();
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        catalog_version: registry.version().to_string(),
        actions: registry.len(),
        uptime: state.uptime(),
    })
}
