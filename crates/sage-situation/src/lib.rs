//! SAGE Situation - per-entity lifecycle state machine
//!
//! Every tracked entity has a situation whose state decides which capability
//! brackets are reachable at all. The canonical path is
//! `IDLE → CANDIDATE → ACTIVE → COOLDOWN → RESOLVED`; read-only entity types
//! never leave `IDLE`/`CANDIDATE` and record-ledger types resolve straight from
//! `ACTIVE` by countersignature.

#![deny(unsafe_code)]

mod machine;
mod tracker;

pub use machine::SituationMachine;
pub use tracker::SituationTracker;

use sage_types::{EntityType, LifecycleKind, SituationState, SituationTrigger};
use thiserror::Error;

/// Situation errors
#[derive(Debug, Error)]
pub enum SituationError {
    #[error("{trigger} is not valid from {from} for {entity_type} ({lifecycle:?} lifecycle)")]
    InvalidTransition {
        entity_type: EntityType,
        lifecycle: LifecycleKind,
        from: SituationState,
        trigger: SituationTrigger,
    },

    #[error("{entity_type} never enters {state}")]
    UnreachableState {
        entity_type: EntityType,
        state: SituationState,
    },

    #[error("Situation not found: {0}")]
    NotFound(String),

    #[error("Lock error")]
    LockError,
}
