use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sage_audit::{AuditError, AuditJournal, AuditRecorder, JournalResult};
use sage_dispatcher::{
    one_time_code, Commit, CommitReceipt, EntityStore, ExecutionDispatcher, InMemoryStore,
    PinTotpVerifier, RequestOrigin, SigningCredential, StoreResult,
};
use sage_evaluator::DecisionEvaluator;
use sage_registry::ActionRegistry;
use sage_situation::SituationTracker;
use sage_types::{
    ActionId, AuditRecord, Department, EntityKey, EntitySnapshot, EntityType, ErrorCode,
    ExecuteRequest, ExecuteResponse, ExecutionContext, ExecutionMode, ExecutionPhase,
    SignatureInput, SituationState, SituationTrigger,
};
use serde_json::{json, Value};

const SIGNER: &str = "u-chief-stew";
const PIN: &str = "2468";
const SECRET: &str = "interior-secret";

struct Harness {
    dispatcher: ExecutionDispatcher,
    store: Arc<dyn EntityStore>,
    situations: Arc<SituationTracker>,
}

fn harness_with(store: Option<Arc<dyn EntityStore>>, ttl: Option<Duration>) -> Harness {
    harness_sharing(store, Arc::new(SituationTracker::new()), ttl)
}

fn harness_sharing(
    store: Option<Arc<dyn EntityStore>>,
    situations: Arc<SituationTracker>,
    ttl: Option<Duration>,
) -> Harness {
    let registry = Arc::new(ActionRegistry::builtin().unwrap());
    let evaluator = Arc::new(DecisionEvaluator::new(Arc::clone(&registry)));
    let store = store
        .unwrap_or_else(|| Arc::new(InMemoryStore::new(AuditRecorder::new(registry))));
    let verifier = Arc::new(PinTotpVerifier::new([
        SigningCredential::new(SIGNER, PIN, SECRET).unwrap()
    ]));

    let mut dispatcher = ExecutionDispatcher::new(
        evaluator,
        Arc::clone(&situations),
        Arc::clone(&store),
        verifier,
    );
    if let Some(ttl) = ttl {
        dispatcher = dispatcher.with_token_ttl(ttl);
    }

    Harness {
        dispatcher,
        store,
        situations,
    }
}

fn harness() -> Harness {
    harness_with(None, None)
}

impl Harness {
    async fn seed(&self, snapshot: EntitySnapshot, state: SituationState) -> EntityKey {
        let key = snapshot.key();
        self.store.put(snapshot).await.unwrap();
        self.situations.restore(&key, state).unwrap();
        key
    }

    async fn seed_receiving(&self, id: &str, status: &str) -> EntityKey {
        self.seed(
            EntitySnapshot::new(EntityType::Receiving, id)
                .with_department(Department::Interior)
                .with_status(status),
            SituationState::Active,
        )
        .await
    }

    async fn send(&self, request: ExecuteRequest) -> ExecuteResponse {
        self.dispatcher
            .dispatch(request, RequestOrigin::default())
            .await
            .response
    }

    async fn history(&self, key: &EntityKey, action: ActionId) -> Vec<AuditRecord> {
        self.store
            .history(key)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.action == action)
            .collect()
    }
}

fn request(action: ActionId, entity_id: &str, mode: ExecutionMode, payload: Value) -> ExecuteRequest {
    ExecuteRequest {
        action: action.as_str().to_string(),
        context: ExecutionContext {
            entity_id: entity_id.to_string(),
            role: Some("chief_steward".to_string()),
            department: Some("interior".to_string()),
            user_id: Some(SIGNER.to_string()),
            session_id: Some("sess-1".to_string()),
            source: Some("test".to_string()),
            lens: None,
        },
        payload: serde_json::from_value(payload).unwrap(),
        mode,
        confirmation_token: None,
        signature: None,
    }
}

fn signature() -> SignatureInput {
    SignatureInput {
        pin: PIN.to_string(),
        one_time_code: one_time_code(SECRET, Utc::now(), 30),
    }
}

fn accept(mode: ExecutionMode) -> ExecuteRequest {
    request(
        ActionId::AcceptReceiving,
        "RCV-1",
        mode,
        json!({ "received_by": "chief_steward" }),
    )
}

fn execute_with(token: &str) -> ExecuteRequest {
    let mut execute = accept(ExecutionMode::Execute);
    execute.confirmation_token = Some(token.to_string());
    execute.signature = Some(signature());
    execute
}

async fn prepare_token(h: &Harness) -> String {
    let prepared = h.send(accept(ExecutionMode::Prepare)).await;
    assert!(prepared.success, "{:?}", prepared.error);
    assert!(prepared.confirmation_required);
    prepared.confirmation_token.unwrap()
}

#[tokio::test]
async fn execute_without_signature_is_refused() {
    let h = harness();
    let key = h.seed_receiving("RCV-1", "pending").await;
    let token = prepare_token(&h).await;

    let mut unsigned = accept(ExecutionMode::Execute);
    unsigned.confirmation_token = Some(token.clone());
    let response = h.send(unsigned).await;

    assert!(!response.success);
    assert_eq!(response.error_code(), Some(ErrorCode::SignatureRequired));
    assert!(h.history(&key, ActionId::AcceptReceiving).await.is_empty());

    // The token was not consumed by the refused attempt.
    assert!(h.send(execute_with(&token)).await.success);
}

#[tokio::test]
async fn confirmation_token_is_single_use() {
    let h = harness();
    let key = h.seed_receiving("RCV-1", "pending").await;
    let token = prepare_token(&h).await;

    let first = h.send(execute_with(&token)).await;
    assert!(first.success, "{:?}", first.error);
    assert_eq!(first.data.as_ref().unwrap()["entity"]["status"], "accepted");

    let second = h.send(execute_with(&token)).await;
    assert_eq!(second.error_code(), Some(ErrorCode::TokenStale));

    let records = h.history(&key, ActionId::AcceptReceiving).await;
    assert_eq!(records.len(), 1);
    let signed = records[0].signature.as_ref().unwrap();
    assert_eq!(signed.signer, SIGNER);
    assert_eq!(signed.method, "pin_totp");
    assert_eq!(records[0].metadata.source, "test");
}

#[tokio::test]
async fn concurrent_executes_commit_once() {
    let h = harness();
    let key = h.seed_receiving("RCV-1", "pending").await;
    let token = prepare_token(&h).await;

    let (a, b) = futures::join!(
        h.dispatcher.dispatch(execute_with(&token), RequestOrigin::default()),
        h.dispatcher.dispatch(execute_with(&token), RequestOrigin::default()),
    );

    let successes = [&a, &b].iter().filter(|o| o.response.success).count();
    assert_eq!(successes, 1);
    let loser = if a.response.success { &b } else { &a };
    assert_eq!(loser.response.error_code(), Some(ErrorCode::TokenStale));
    assert_eq!(h.history(&key, ActionId::AcceptReceiving).await.len(), 1);
}

#[tokio::test]
async fn resolved_entity_refuses_further_mutation() {
    let h = harness();
    h.seed_receiving("RCV-9", "accepted").await;

    let response = h
        .send(request(
            ActionId::UpdateReceivingLine,
            "RCV-9",
            ExecutionMode::Direct,
            json!({ "line_id": "L-1" }),
        ))
        .await;

    assert_eq!(response.error_code(), Some(ErrorCode::AlreadyResolved));
    let error = response.error.unwrap();
    assert_eq!(error.details.unwrap()["reason"], "ALREADY_ACCEPTED");
}

#[tokio::test]
async fn resolving_action_resolves_the_situation() {
    let h = harness();
    let key = h.seed_receiving("RCV-1", "pending").await;
    let token = prepare_token(&h).await;
    assert!(h.send(execute_with(&token)).await.success);

    let situation = h.situations.peek(&key).unwrap().unwrap();
    assert_eq!(situation.state, SituationState::Resolved);

    let again = h.send(accept(ExecutionMode::Prepare)).await;
    assert_eq!(again.error_code(), Some(ErrorCode::AlreadyResolved));
}

#[tokio::test]
async fn prepare_is_side_effect_free_and_repeatable() {
    let h = harness();
    let key = h.seed_receiving("RCV-1", "pending").await;

    let first = h.send(accept(ExecutionMode::Prepare)).await;
    let second = h.send(accept(ExecutionMode::Prepare)).await;

    assert_eq!(first.proposed_changes, second.proposed_changes);
    assert_ne!(first.confirmation_token, second.confirmation_token);
    assert!(h.store.history(&key).await.unwrap().is_empty());
    let entity = h.store.get(&key).await.unwrap().unwrap();
    assert_eq!(entity.status.as_deref(), Some("pending"));
    assert_eq!(entity.version, 0);
}

#[tokio::test]
async fn entity_change_after_prepare_invalidates_token() {
    let h = harness();
    h.seed_receiving("RCV-1", "pending").await;
    let token = prepare_token(&h).await;

    let note = h
        .send(request(
            ActionId::UpdateReceivingLine,
            "RCV-1",
            ExecutionMode::Direct,
            json!({ "line_id": "L-2", "quantity_received": 4 }),
        ))
        .await;
    assert!(note.success, "{:?}", note.error);

    let response = h.send(execute_with(&token)).await;
    assert_eq!(response.error_code(), Some(ErrorCode::TokenStale));
}

#[tokio::test]
async fn expired_token_is_refused() {
    let h = harness_with(None, Some(Duration::zero()));
    h.seed_receiving("RCV-1", "pending").await;
    let token = prepare_token(&h).await;

    let response = h.send(execute_with(&token)).await;
    assert_eq!(response.error_code(), Some(ErrorCode::TokenExpired));
}

#[tokio::test]
async fn wrong_pin_is_refused_without_burning_token() {
    let h = harness();
    h.seed_receiving("RCV-1", "pending").await;
    let token = prepare_token(&h).await;

    let mut bad = execute_with(&token);
    bad.signature = Some(SignatureInput {
        pin: "0000".to_string(),
        one_time_code: one_time_code(SECRET, Utc::now(), 30),
    });
    assert_eq!(
        h.send(bad).await.error_code(),
        Some(ErrorCode::SignatureInvalid)
    );
    assert!(h.send(execute_with(&token)).await.success);
}

#[tokio::test]
async fn signed_action_cannot_run_directly() {
    let h = harness();
    h.seed_receiving("RCV-1", "pending").await;

    let response = h.send(accept(ExecutionMode::Direct)).await;
    assert_eq!(response.error_code(), Some(ErrorCode::SignatureRequired));
}

#[tokio::test]
async fn unsigned_action_rejects_prepare() {
    let h = harness();
    h.seed_receiving("RCV-1", "pending").await;

    let response = h
        .send(request(
            ActionId::UpdateReceivingLine,
            "RCV-1",
            ExecutionMode::Prepare,
            json!({ "line_id": "L-1" }),
        ))
        .await;
    assert_eq!(response.error_code(), Some(ErrorCode::ValidationError));
}

#[tokio::test]
async fn direct_note_records_audit_and_phases() {
    let h = harness();
    let key = h.seed_receiving("RCV-1", "pending").await;

    let outcome = h
        .dispatcher
        .dispatch(
            request(
                ActionId::UpdateReceivingLine,
                "RCV-1",
                ExecutionMode::Direct,
                json!({ "line_id": "L-1", "notes": "two cases short" }),
            ),
            RequestOrigin {
                ip_address: Some("10.1.2.3".to_string()),
            },
        )
        .await;

    assert!(outcome.response.success, "{:?}", outcome.response.error);
    assert_eq!(
        outcome.phases,
        vec![
            ExecutionPhase::Received,
            ExecutionPhase::DecisionRevalidated,
            ExecutionPhase::Authorized,
            ExecutionPhase::DirectExecute,
            ExecutionPhase::Audited,
            ExecutionPhase::Complete,
        ]
    );

    let records = h.history(&key, ActionId::UpdateReceivingLine).await;
    assert_eq!(records.len(), 1);
    assert!(records[0].signature.is_none());
    assert_eq!(records[0].metadata.ip_address.as_deref(), Some("10.1.2.3"));
    assert_eq!(records[0].actor.role, "chief_steward");
    assert_eq!(h.store.get(&key).await.unwrap().unwrap().version, 1);
}

#[tokio::test]
async fn cross_department_member_is_forbidden() {
    let h = harness();
    h.seed(
        EntitySnapshot::new(EntityType::WorkOrder, "WO-7")
            .with_department(Department::Engineering)
            .with_status("open"),
        SituationState::Active,
    )
    .await;

    let mut note = request(
        ActionId::AddWorkOrderNote,
        "WO-7",
        ExecutionMode::Direct,
        json!({ "note": "checked the seals" }),
    );
    note.context.role = Some("crew".to_string());
    note.context.department = Some("deck".to_string());

    let response = h.send(note).await;
    assert_eq!(response.error_code(), Some(ErrorCode::Forbidden));
    assert_eq!(
        response.error.unwrap().details.unwrap()["reason"],
        "department_mismatch"
    );
}

#[tokio::test]
async fn authority_is_checked_before_resolution_status() {
    let h = harness();
    h.seed_receiving("RCV-9", "accepted").await;

    let mut update = request(
        ActionId::UpdateReceivingLine,
        "RCV-9",
        ExecutionMode::Direct,
        json!({ "line_id": "L-1" }),
    );
    update.context.role = Some("crew".to_string());
    update.context.department = Some("deck".to_string());

    let response = h.send(update).await;
    assert_eq!(response.error_code(), Some(ErrorCode::Forbidden));
    let details = response.error.unwrap().details.unwrap();
    assert_ne!(details["reason"], "ALREADY_ACCEPTED");
}

#[tokio::test]
async fn unknown_role_fails_closed() {
    let h = harness();
    h.seed_receiving("RCV-1", "pending").await;

    let mut note = request(
        ActionId::UpdateReceivingLine,
        "RCV-1",
        ExecutionMode::Direct,
        json!({ "line_id": "L-1" }),
    );
    note.context.role = Some("stowaway".to_string());

    let response = h.send(note).await;
    assert_eq!(response.error_code(), Some(ErrorCode::Forbidden));
}

#[tokio::test]
async fn state_guard_blocks_writes_before_edit_begins() {
    let h = harness();
    h.seed(
        EntitySnapshot::new(EntityType::Receiving, "RCV-2")
            .with_department(Department::Interior)
            .with_status("pending"),
        SituationState::Idle,
    )
    .await;

    let response = h
        .send(request(
            ActionId::UpdateReceivingLine,
            "RCV-2",
            ExecutionMode::Direct,
            json!({ "line_id": "L-1" }),
        ))
        .await;
    assert_eq!(response.error_code(), Some(ErrorCode::StateGuard));
}

#[tokio::test]
async fn payload_is_validated_against_the_catalog() {
    let h = harness();
    h.seed_receiving("RCV-1", "pending").await;

    let missing = h
        .send(request(
            ActionId::UpdateReceivingLine,
            "RCV-1",
            ExecutionMode::Direct,
            json!({}),
        ))
        .await;
    assert_eq!(missing.error_code(), Some(ErrorCode::ValidationError));

    let smuggled = h
        .send(request(
            ActionId::UpdateReceivingLine,
            "RCV-1",
            ExecutionMode::Direct,
            json!({ "line_id": "L-1", "status": "accepted" }),
        ))
        .await;
    assert_eq!(smuggled.error_code(), Some(ErrorCode::ValidationError));
}

#[tokio::test]
async fn unknown_action_and_entity_are_not_found() {
    let h = harness();
    let unknown = h
        .send(ExecuteRequest {
            action: "scuttle_ship".to_string(),
            ..accept(ExecutionMode::Direct)
        })
        .await;
    assert_eq!(unknown.error_code(), Some(ErrorCode::NotFound));

    let missing = h
        .send(request(
            ActionId::ViewReceiving,
            "RCV-404",
            ExecutionMode::Direct,
            json!({}),
        ))
        .await;
    assert_eq!(missing.error_code(), Some(ErrorCode::NotFound));
}

#[tokio::test]
async fn read_action_returns_entity_without_audit() {
    let h = harness();
    let key = h.seed_receiving("RCV-1", "pending").await;

    let response = h
        .send(request(
            ActionId::ViewReceiving,
            "RCV-1",
            ExecutionMode::Direct,
            json!({}),
        ))
        .await;
    assert!(response.success);
    assert_eq!(response.data.unwrap()["entityId"], "RCV-1");
    assert!(h.store.history(&key).await.unwrap().is_empty());
}

struct OfflineJournal;

#[async_trait]
impl AuditJournal for OfflineJournal {
    async fn append(&self, _record: AuditRecord) -> JournalResult<()> {
        Err(AuditError::Journal("disk full".to_string()))
    }

    async fn by_entity(&self, _key: &EntityKey) -> JournalResult<Vec<AuditRecord>> {
        Ok(vec![])
    }

    async fn count(&self) -> JournalResult<usize> {
        Ok(0)
    }
}

#[tokio::test]
async fn failed_audit_write_rolls_back_mutation() {
    let registry = Arc::new(ActionRegistry::builtin().unwrap());
    let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::with_journal(
        AuditRecorder::new(registry),
        Arc::new(OfflineJournal),
    ));
    let h = harness_with(Some(store), None);
    let key = h.seed_receiving("RCV-1", "pending").await;

    let response = h
        .send(request(
            ActionId::UpdateReceivingLine,
            "RCV-1",
            ExecutionMode::Direct,
            json!({ "line_id": "L-1" }),
        ))
        .await;

    assert_eq!(response.error_code(), Some(ErrorCode::InternalError));
    assert_eq!(response.error.unwrap().message, "Internal error");
    let entity = h.store.get(&key).await.unwrap().unwrap();
    assert_eq!(entity.version, 0);
    assert!(entity.field("line_updates").is_none());
}

/// Resolves the entity's situation just before each commit lands, as a
/// concurrent lifecycle trigger would.
struct SituationRacingStore {
    inner: InMemoryStore,
    situations: Arc<SituationTracker>,
}

#[async_trait]
impl EntityStore for SituationRacingStore {
    async fn get(&self, key: &EntityKey) -> StoreResult<Option<EntitySnapshot>> {
        self.inner.get(key).await
    }

    async fn put(&self, snapshot: EntitySnapshot) -> StoreResult<()> {
        self.inner.put(snapshot).await
    }

    async fn list(&self) -> StoreResult<Vec<EntitySnapshot>> {
        self.inner.list().await
    }

    async fn commit(&self, commit: Commit) -> StoreResult<CommitReceipt> {
        let key = commit.snapshot.key();
        self.situations
            .apply(&key, SituationTrigger::Resolved)
            .unwrap();
        self.inner.commit(commit).await
    }

    async fn history(&self, key: &EntityKey) -> StoreResult<Vec<AuditRecord>> {
        self.inner.history(key).await
    }
}

#[tokio::test]
async fn commit_stands_when_situation_cannot_be_resolved() {
    let registry = Arc::new(ActionRegistry::builtin().unwrap());
    let situations = Arc::new(SituationTracker::new());
    let store: Arc<dyn EntityStore> = Arc::new(SituationRacingStore {
        inner: InMemoryStore::new(AuditRecorder::new(registry)),
        situations: Arc::clone(&situations),
    });
    let h = harness_sharing(Some(store), situations, None);
    let key = h.seed_receiving("RCV-1", "pending").await;
    let token = prepare_token(&h).await;

    let outcome = h
        .dispatcher
        .dispatch(execute_with(&token), RequestOrigin::default())
        .await;

    assert!(outcome.response.success, "{:?}", outcome.response.error);
    assert_eq!(outcome.phases.last(), Some(&ExecutionPhase::Complete));
    let entity = h.store.get(&key).await.unwrap().unwrap();
    assert_eq!(entity.status.as_deref(), Some("accepted"));
    assert_eq!(h.history(&key, ActionId::AcceptReceiving).await.len(), 1);
    let situation = h.situations.peek(&key).unwrap().unwrap();
    assert_eq!(situation.state, SituationState::Resolved);
}
