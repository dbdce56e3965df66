//! Execution handler

use crate::api::rest::state::AppState;
use crate::error::status_for;
use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use sage_dispatcher::RequestOrigin;
use sage_types::{ErrorCode, ExecuteRequest, ExecuteResponse};
use std::net::SocketAddr;

/// Run one action through the dispatcher.
///
/// The body is always an `ExecuteResponse`; failures carry the error code and
/// the matching HTTP status.
pub async fn execute_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<ExecuteRequest>,
) -> (StatusCode, Json<ExecuteResponse>) {
    let origin = RequestOrigin {
        ip_address: client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr)),
    };

    let outcome = state.dispatcher.dispatch(request, origin).await;
    let status = if outcome.response.success {
        StatusCode::OK
    } else {
        status_for(
            outcome
                .response
                .error_code()
                .unwrap_or(ErrorCode::InternalError),
        )
    };

    (status, Json(outcome.response))
}

/// First hop of `x-forwarded-for`, else the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}
