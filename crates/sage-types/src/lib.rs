//! SAGE Types - the shared vocabulary of the Situational Action Governance Engine.
//!
//! Every other crate speaks in these types: what an action is, which capability
//! bracket it belongs to, who is asking, what lifecycle state the target entity is
//! in, and what the engine decided. Wire envelopes for the decision and execution
//! endpoints live here too so the daemon and the client agree on one shape.

#![deny(unsafe_code)]

pub mod action;
pub mod audit;
pub mod decision;
pub mod entity;
pub mod error;
pub mod execution;
pub mod identity;
pub mod situation;

pub use action::{
    ActionDefinition, ActionId, ActionTrigger, Bracket, Cluster, ConditionOp, ConditionSource,
    SideEffect, TriggerCondition,
};
pub use audit::{AuditEntry, AuditMetadata, AuditRecord, AuditRecordId, AuditSignature, Actor};
pub use decision::{
    ActionDecision, BlockReason, BlockedBy, ConfidenceBreakdown, DecisionRequest,
    DecisionResponse, EntityContext, SituationHint, Tier, UserContext,
};
pub use entity::{EntityId, EntityKey, EntitySnapshot, EntityType, LifecycleKind};
pub use error::{ErrorBody, ErrorCode, UnknownVariant};
pub use execution::{
    ExecuteRequest, ExecuteResponse, ExecutionContext, ExecutionMode, ExecutionPhase,
    FieldChange, ProposedChanges, SignatureInput,
};
pub use identity::{AuthorityLevel, Department, Role};
pub use situation::{Situation, SituationState, SituationTransition, SituationTrigger};
