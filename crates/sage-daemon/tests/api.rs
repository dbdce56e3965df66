use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use sage_daemon::{api::create_router, AppState, DaemonConfig};
use sage_dispatcher::{one_time_code, SigningCredential};
use sage_types::{Department, EntitySnapshot, EntityType, SituationState};
use serde_json::{json, Value};
use tower::ServiceExt;

const SIGNER: &str = "u-chief-stew";
const PIN: &str = "2468";
const SECRET: &str = "interior-secret";

fn state() -> AppState {
    let mut config = DaemonConfig::default();
    config.signing.credentials = vec![SigningCredential::new(SIGNER, PIN, SECRET).unwrap()];
    AppState::from_config(&config).unwrap()
}

async fn seed_receiving(state: &AppState, id: &str, status: &str) {
    let snapshot = EntitySnapshot::new(EntityType::Receiving, id)
        .with_department(Department::Interior)
        .with_status(status);
    state
        .situations()
        .restore(&snapshot.key(), SituationState::Active)
        .unwrap();
    state.store().put(snapshot).await.unwrap();
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn accept(mode: &str) -> Value {
    json!({
        "action": "accept_receiving",
        "context": {
            "entityId": "RCV-1",
            "role": "chief_steward",
            "department": "interior",
            "userId": SIGNER
        },
        "payload": { "received_by": "chief_steward" },
        "mode": mode
    })
}

fn signed_execute(token: &str) -> Value {
    let mut body = accept("execute");
    body["confirmationToken"] = json!(token);
    body["signature"] = json!({
        "pin": PIN,
        "oneTimeCode": one_time_code(SECRET, Utc::now(), 30)
    });
    body
}

fn work_order_decisions(role: &str, department: &str, owner: &str) -> Value {
    json!({
        "role": role,
        "department": department,
        "detectedIntents": ["close"],
        "entities": [{
            "entityType": "work_order",
            "entityId": "WO-1",
            "department": owner,
            "status": "in_progress",
            "situation": { "state": "ACTIVE" }
        }],
        "includeBlocked": true
    })
}

fn actions(body: &Value) -> Vec<(String, bool)> {
    body["decisions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| {
            (
                d["action"].as_str().unwrap().to_string(),
                d["allowed"].as_bool().unwrap(),
            )
        })
        .collect()
}

#[tokio::test]
async fn health_reports_catalog() {
    let app = create_router(state(), true);
    let (status, body) = call(&app, get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["actions"], 36);
    assert!(body["catalog_version"].is_string());
}

#[tokio::test]
async fn crew_sees_close_on_own_department_work_order() {
    let app = create_router(state(), true);
    let (status, body) = call(
        &app,
        post("/api/v1/decisions", work_order_decisions("crew", "deck", "deck")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(actions(&body).contains(&("close_work_order".to_string(), true)));
    assert!(body["executionId"].is_string());
}

#[tokio::test]
async fn permission_blocks_stay_hidden() {
    let app = create_router(state(), true);
    let (status, body) = call(
        &app,
        post(
            "/api/v1/decisions",
            work_order_decisions("crew", "deck", "engineering"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(actions(&body).iter().all(|(a, _)| a != "close_work_order"));
    assert!(body["blockedCount"].as_u64().unwrap() >= 1);

    let (_, body) = call(
        &app,
        post(
            "/api/v1/decisions",
            work_order_decisions("captain", "bridge", "engineering"),
        ),
    )
    .await;
    assert!(actions(&body).contains(&("close_work_order".to_string(), true)));
}

#[tokio::test]
async fn missing_role_yields_no_decisions() {
    let app = create_router(state(), true);
    let mut request = work_order_decisions("crew", "deck", "deck");
    request["role"] = Value::Null;
    let (status, body) = call(&app, post("/api/v1/decisions", request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decisions"], json!([]));
    assert_eq!(body["allowedCount"], 0);
    assert_eq!(body["blockedCount"], 0);
}

#[tokio::test]
async fn execute_without_signature_is_bad_request() {
    let state = state();
    seed_receiving(&state, "RCV-1", "pending").await;
    let app = create_router(state, true);

    let (status, body) = call(&app, post("/api/v1/actions/execute", accept("execute"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "SIGNATURE_REQUIRED");
}

#[tokio::test]
async fn replayed_token_conflicts_and_audits_once() {
    let state = state();
    seed_receiving(&state, "RCV-1", "pending").await;
    let app = create_router(state, true);

    let (status, prepared) = call(&app, post("/api/v1/actions/execute", accept("prepare"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(prepared["confirmationRequired"], true);
    let token = prepared["confirmationToken"].as_str().unwrap().to_string();

    let (status, executed) =
        call(&app, post("/api/v1/actions/execute", signed_execute(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(executed["success"], true);

    let (status, replay) =
        call(&app, post("/api/v1/actions/execute", signed_execute(&token))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(replay["error"]["code"], "TOKEN_STALE");

    let (status, history) = call(&app, get("/api/v1/audit/receiving/RCV-1")).await;
    assert_eq!(status, StatusCode::OK);
    let records = history.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["action"], "accept_receiving");
    assert_eq!(records[0]["signature"]["signer"], SIGNER);
    assert_eq!(records[0]["metadata"]["ipAddress"], "203.0.113.7");
}

#[tokio::test]
async fn resolved_receiving_rejects_updates() {
    let state = state();
    seed_receiving(&state, "RCV-2", "accepted").await;
    let app = create_router(state, true);

    let (status, body) = call(
        &app,
        post(
            "/api/v1/actions/execute",
            json!({
                "action": "update_receiving_line",
                "context": {
                    "entityId": "RCV-2",
                    "role": "chief_steward",
                    "department": "interior"
                },
                "payload": { "line_id": "L-1", "notes": "short one case" }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "ALREADY_RESOLVED");
}

#[tokio::test]
async fn situation_lifecycle_over_http() {
    let state = state();
    let fault = EntitySnapshot::new(EntityType::Fault, "F-7")
        .with_department(Department::Engineering)
        .with_status("open");
    state.store().put(fault).await.unwrap();
    let app = create_router(state, true);

    let (status, body) = call(&app, get("/api/v1/situations/fault/F-7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "IDLE");

    let (status, body) = call(
        &app,
        post(
            "/api/v1/situations/fault/F-7/transitions",
            json!({ "trigger": "entity_opened" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "CANDIDATE");
    assert_eq!(body["allowedBrackets"], json!(["READ", "WRITE-NOTE"]));

    let (status, body) = call(
        &app,
        post(
            "/api/v1/situations/fault/F-7/transitions",
            json!({ "trigger": "resolved" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STATE_GUARD");
}

#[tokio::test]
async fn situations_of_unknown_entities_are_not_found() {
    let state = state();
    let app = create_router(state.clone(), true);

    let (status, body) = call(&app, get("/api/v1/situations/work_order/NOPE")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = call(
        &app,
        post(
            "/api/v1/situations/work_order/NOPE/transitions",
            json!({ "trigger": "entity_opened" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(state.situations().is_empty());
}

#[tokio::test]
async fn bad_paths_and_bodies_are_rejected() {
    let app = create_router(state(), true);

    let (status, body) = call(&app, get("/api/v1/situations/spaceship/S-1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = call(&app, get("/api/v1/audit/receiving/RCV-404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let malformed = Request::builder()
        .method("POST")
        .uri("/api/v1/actions/execute")
        .header("content-type", "application/json")
        .body(Body::from("{\"action\":"))
        .unwrap();
    let (status, _) = call(&app, malformed).await;
    assert!(status.is_client_error());
}
