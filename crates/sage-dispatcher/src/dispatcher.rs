use std::sync::Arc;

use chrono::{Duration, Utc};
use sage_evaluator::DecisionEvaluator;
use sage_registry::ActionRegistry;
use sage_situation::SituationTracker;
use sage_types::{
    ActionDefinition, Actor, AuditEntry, AuditMetadata, AuditSignature, Bracket, EntityKey,
    EntitySnapshot, ExecuteRequest, ExecuteResponse, ExecutionMode, ExecutionPhase,
    ProposedChanges, SituationTrigger, UserContext,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::error::DispatchError;
use crate::guard::InFlightGuard;
use crate::handler::{apply_changes, validate_payload, ActionHandler, StandardHandler};
use crate::signature::{SignatureVerifier, VerifiedSigner};
use crate::store::{Commit, EntityStore};
use crate::token::{TokenStore, DEFAULT_TOKEN_TTL_SECS};

const DEFAULT_SOURCE: &str = "api";

/// Transport-level facts about the caller.
#[derive(Clone, Debug, Default)]
pub struct RequestOrigin {
    pub ip_address: Option<String>,
}

/// Result of one dispatch, success or failure.
#[derive(Clone, Debug)]
pub struct DispatchOutcome {
    pub execution_id: String,
    pub response: ExecuteResponse,
    /// Phases reached, in order. A rejected request ends in `Rejected`.
    pub phases: Vec<ExecutionPhase>,
}

/// The single path by which a mutation reaches the store.
///
/// Every request is revalidated from scratch: the decision a client was shown
/// earlier is never trusted. Signed actions go through prepare then execute;
/// everything else runs directly.
pub struct ExecutionDispatcher {
    evaluator: Arc<DecisionEvaluator>,
    situations: Arc<SituationTracker>,
    store: Arc<dyn EntityStore>,
    tokens: TokenStore,
    verifier: Arc<dyn SignatureVerifier>,
    handler: Arc<dyn ActionHandler>,
    in_flight: InFlightGuard,
}

impl ExecutionDispatcher {
    pub fn new(
        evaluator: Arc<DecisionEvaluator>,
        situations: Arc<SituationTracker>,
        store: Arc<dyn EntityStore>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            evaluator,
            situations,
            store,
            tokens: TokenStore::new(Duration::seconds(DEFAULT_TOKEN_TTL_SECS)),
            verifier,
            handler: Arc::new(StandardHandler),
            in_flight: InFlightGuard::new(),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Replace the token store, discarding any outstanding tokens.
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.tokens = TokenStore::new(ttl);
        self
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn situations(&self) -> &Arc<SituationTracker> {
        &self.situations
    }

    pub fn registry(&self) -> &ActionRegistry {
        self.evaluator.registry()
    }

    pub fn evaluator(&self) -> &Arc<DecisionEvaluator> {
        &self.evaluator
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Run one execution request to completion.
    pub async fn dispatch(&self, request: ExecuteRequest, origin: RequestOrigin) -> DispatchOutcome {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let mut phases = vec![ExecutionPhase::Received];

        let action = request.action.clone();
        let mode = request.mode;
        let response = match self.run(request, &origin, &mut phases).await {
            Ok(response) => response,
            Err(err) => {
                phases.push(ExecutionPhase::Rejected);
                match &err {
                    DispatchError::Internal(detail) => error!(
                        execution_id = %execution_id,
                        action = %action,
                        error = %detail,
                        "Execution failed"
                    ),
                    _ => warn!(
                        execution_id = %execution_id,
                        action = %action,
                        mode = mode.as_str(),
                        code = err.code().as_str(),
                        "Execution rejected: {}",
                        err
                    ),
                }
                ExecuteResponse::failure_with(err.to_body())
            }
        };

        debug!(execution_id = %execution_id, phases = ?phases, "Dispatch finished");

        DispatchOutcome {
            execution_id,
            response,
            phases,
        }
    }

    async fn run(
        &self,
        request: ExecuteRequest,
        origin: &RequestOrigin,
        phases: &mut Vec<ExecutionPhase>,
    ) -> Result<ExecuteResponse, DispatchError> {
        let definition = self
            .evaluator
            .registry()
            .resolve(&request.action)
            .map_err(|e| DispatchError::NotFound(e.to_string()))?
            .clone();

        let entity_id = request.context.entity_id.trim();
        if entity_id.is_empty() {
            return Err(DispatchError::Validation("context.entity_id is required".to_string()));
        }
        let key = EntityKey::new(definition.card_type, entity_id);

        check_mode(&definition, &request)?;

        // Execute: serialise per entity, prove the signer, burn the token.
        let mut signed = None;
        let _permit = if request.mode == ExecutionMode::Execute {
            let permit = self
                .in_flight
                .try_acquire(&key)
                .ok_or_else(|| DispatchError::TokenStale(format!("{} has an execution in flight", key)))?;

            let signature = request
                .signature
                .as_ref()
                .ok_or(DispatchError::SignatureRequired(definition.id))?;
            let signer = self.verifier.verify(
                request.context.user_id.as_deref(),
                signature,
                Utc::now(),
            )?;

            let token = request.confirmation_token.as_deref().unwrap_or_default();
            let confirmation = self.tokens.redeem(token, Utc::now())?;
            if confirmation.key != key {
                return Err(DispatchError::TokenStale("token issued for another entity".to_string()));
            }
            if confirmation
                .issued_to
                .as_deref()
                .is_some_and(|issued| issued != signer.user_id)
            {
                return Err(DispatchError::TokenStale("token issued to another user".to_string()));
            }
            signed = Some((signer, confirmation));
            Some(permit)
        } else {
            None
        };

        let entity = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| DispatchError::NotFound(key.to_string()))?;

        let situation = self
            .situations
            .get(&key)
            .map_err(|e| DispatchError::Internal(e.to_string()))?;

        let user = UserContext::from_claims(
            request.context.role.as_deref(),
            request.context.department.as_deref(),
            Vec::new(),
        );
        let (role, department) = match (user.role, user.department) {
            (Some(role), Some(department)) => (role, department),
            _ => return Err(DispatchError::Forbidden("authority_unavailable".to_string())),
        };

        // Unauthorized callers never see ALREADY_RESOLVED.
        self.evaluator
            .resolver()
            .admit(&user, &definition, entity.department)
            .map_err(|e| DispatchError::Forbidden(e.reason_code().to_string()))?;

        if definition.bracket.is_mutation() && (entity.is_terminal() || situation.is_resolved()) {
            return Err(DispatchError::AlreadyResolved {
                key: key.to_string(),
                status: entity
                    .status
                    .clone()
                    .unwrap_or_else(|| situation.state.as_str().to_ascii_lowercase()),
            });
        }

        let decision = self
            .evaluator
            .evaluate_action(&user, &entity, Some(&situation), definition.id)
            .ok_or_else(|| {
                DispatchError::Validation(format!(
                    "{} is not offered on {}",
                    definition.id, definition.card_type
                ))
            })?;
        if let Some(blocked) = &decision.blocked_by {
            return Err(DispatchError::from_block(blocked));
        }
        phases.push(ExecutionPhase::DecisionRevalidated);
        phases.push(ExecutionPhase::Authorized);

        validate_payload(&definition, &request.payload)
            .map_err(|e| DispatchError::Validation(e.to_string()))?;

        if definition.bracket == Bracket::Read {
            phases.push(ExecutionPhase::Complete);
            return entity_json(&entity).map(ExecuteResponse::completed);
        }

        let changes = self
            .handler
            .plan(&definition, &entity, &request.payload)
            .map_err(|e| DispatchError::Validation(e.to_string()))?;

        let actor = Actor {
            role: role.as_str().to_string(),
            department: department.as_str().to_string(),
            user_id: request.context.user_id.clone(),
        };
        let metadata = AuditMetadata {
            source: request
                .context
                .source
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            lens: request.context.lens.clone(),
            session_id: request.context.session_id.clone(),
            ip_address: origin.ip_address.clone(),
        };

        match request.mode {
            ExecutionMode::Direct => {
                phases.push(ExecutionPhase::DirectExecute);
                let data = self
                    .commit(&definition, &entity, &changes, actor, None, metadata, phases)
                    .await?;
                Ok(ExecuteResponse::completed(data))
            }
            ExecutionMode::Prepare => {
                let issued = self.tokens.issue(
                    definition.id,
                    &changes,
                    request.context.user_id.clone(),
                    Utc::now(),
                )?;
                phases.push(ExecutionPhase::Prepared);
                info!(
                    action = %definition.id,
                    entity = %key,
                    fields = changes.changes.len(),
                    expires_at = %issued.expires_at,
                    "Confirmation prepared"
                );
                Ok(ExecuteResponse::confirmation(
                    issued.token,
                    changes,
                    issued.expires_at,
                ))
            }
            ExecutionMode::Execute => {
                let (signer, confirmation) = signed.ok_or_else(|| {
                    DispatchError::Internal("execute reached commit without a redeemed token".to_string())
                })?;
                self.tokens.verify(&confirmation, definition.id, &changes)?;
                phases.push(ExecutionPhase::Executed);

                let signature = audit_signature(&signer, confirmation.binding_hex());
                let data = self
                    .commit(
                        &definition,
                        &entity,
                        &changes,
                        actor,
                        Some(signature),
                        metadata,
                        phases,
                    )
                    .await?;
                Ok(ExecuteResponse::completed(data))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn commit(
        &self,
        definition: &ActionDefinition,
        entity: &EntitySnapshot,
        changes: &ProposedChanges,
        actor: Actor,
        signature: Option<AuditSignature>,
        metadata: AuditMetadata,
        phases: &mut Vec<ExecutionPhase>,
    ) -> Result<Value, DispatchError> {
        let key = entity.key();
        let receipt = self
            .store
            .commit(Commit {
                snapshot: apply_changes(entity, changes),
                expected_version: entity.version,
                audit: AuditEntry {
                    entity_type: entity.entity_type,
                    entity_id: entity.entity_id.clone(),
                    action: definition.id,
                    actor,
                    signature,
                    changes: changes.changes.clone(),
                    metadata,
                },
            })
            .await?;
        phases.push(ExecutionPhase::Audited);

        if changes.resolves {
            // The commit stands regardless.
            if let Err(e) = self.situations.apply(&key, SituationTrigger::Resolved) {
                error!(
                    entity = %key,
                    action = %definition.id,
                    version = receipt.snapshot.version,
                    error = %e,
                    "Committed resolving action but could not mark situation resolved"
                );
            }
        }
        phases.push(ExecutionPhase::Complete);

        info!(
            action = %definition.id,
            entity = %key,
            version = receipt.snapshot.version,
            record_id = %receipt.record.record_id,
            signed = receipt.record.signature.is_some(),
            "Action executed"
        );

        Ok(json!({
            "entity": entity_json(&receipt.snapshot)?,
            "changes": changes.changes,
            "auditRecordId": receipt.record.record_id,
        }))
    }
}

/// Reject mode/bracket combinations before touching any state.
fn check_mode(definition: &ActionDefinition, request: &ExecuteRequest) -> Result<(), DispatchError> {
    let signed = definition.signature_required();
    match request.mode {
        ExecutionMode::Direct if signed => Err(DispatchError::SignatureRequired(definition.id)),
        ExecutionMode::Prepare | ExecutionMode::Execute if !signed => Err(DispatchError::Validation(
            format!("{} does not use prepare/execute", definition.id),
        )),
        ExecutionMode::Execute if request.signature.is_none() => {
            Err(DispatchError::SignatureRequired(definition.id))
        }
        ExecutionMode::Execute
            if request
                .confirmation_token
                .as_deref()
                .map_or(true, |t| t.trim().is_empty()) =>
        {
            Err(DispatchError::Validation("confirmation_token is required".to_string()))
        }
        _ => Ok(()),
    }
}

fn audit_signature(signer: &VerifiedSigner, binding: String) -> AuditSignature {
    AuditSignature {
        signer: signer.user_id.clone(),
        method: signer.method.to_string(),
        binding,
        signed_at: Utc::now(),
    }
}

fn entity_json(entity: &EntitySnapshot) -> Result<Value, DispatchError> {
    serde_json::to_value(entity).map_err(|e| DispatchError::Internal(e.to_string()))
}

