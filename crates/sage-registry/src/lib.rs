//! SAGE Registry - the immutable action catalog.
//!
//! The catalog is declarative data (`catalog/actions.v1.json`) compiled into the
//! binary and validated exactly once at boot. Any inconsistency aborts startup:
//! a registry that loaded is, by construction, complete and internally coherent.
//!
//! Validation covers:
//! - every [`ActionId`] defined exactly once
//! - side effect agrees with bracket
//! - read-only entity types expose only READ actions
//! - mutation triggers never list a terminal status
//! - trigger conditions are well-formed for their operator
//! - required and optional payload fields are disjoint

#![deny(unsafe_code)]

use sage_types::{
    ActionDefinition, ActionId, Bracket, ConditionOp, EntityType, LifecycleKind, SideEffect,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

const BUILTIN_CATALOG: &str = include_str!("../catalog/actions.v1.json");

/// Versioned catalog document as stored on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionCatalog {
    pub version: String,
    pub actions: Vec<ActionDefinition>,
}

/// Validated, read-only view of the catalog.
///
/// Definitions keep catalog order; that order is the tie-breaker wherever
/// callers need a deterministic sequence.
#[derive(Clone, Debug)]
pub struct ActionRegistry {
    version: String,
    definitions: Vec<ActionDefinition>,
    index: HashMap<ActionId, usize>,
}

impl ActionRegistry {
    /// Load the catalog bundled with this crate.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    /// Parse and validate a catalog document.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let catalog: ActionCatalog =
            serde_json::from_str(json).map_err(|e| RegistryError::Parse(e.to_string()))?;
        Self::from_catalog(catalog)
    }

    /// Validate an already-parsed catalog.
    pub fn from_catalog(catalog: ActionCatalog) -> Result<Self, RegistryError> {
        if catalog.version.trim().is_empty() {
            return Err(RegistryError::EmptyVersion);
        }

        let mut index = HashMap::with_capacity(catalog.actions.len());
        for (position, definition) in catalog.actions.iter().enumerate() {
            if index.insert(definition.id, position).is_some() {
                return Err(RegistryError::DuplicateAction(definition.id));
            }
            validate_definition(definition)?;
        }

        if let Some(missing) = ActionId::ALL.iter().find(|id| !index.contains_key(id)) {
            return Err(RegistryError::MissingAction(*missing));
        }

        info!(
            version = %catalog.version,
            actions = catalog.actions.len(),
            "Action catalog loaded"
        );

        Ok(Self {
            version: catalog.version,
            definitions: catalog.actions,
            index,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Look up a definition by its typed id.
    pub fn lookup(&self, id: ActionId) -> Option<&ActionDefinition> {
        self.index.get(&id).map(|&i| &self.definitions[i])
    }

    /// Resolve a wire-level action name.
    pub fn resolve(&self, name: &str) -> Result<&ActionDefinition, RegistryError> {
        let id: ActionId = name
            .parse()
            .map_err(|_| RegistryError::UnknownAction(name.to_string()))?;
        self.lookup(id)
            .ok_or_else(|| RegistryError::UnknownAction(name.to_string()))
    }

    /// Actions offered on one card type, in catalog order.
    pub fn by_card_type(&self, card_type: EntityType) -> Vec<&ActionDefinition> {
        self.definitions
            .iter()
            .filter(|d| d.card_type == card_type)
            .collect()
    }

    /// Every definition, in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &ActionDefinition> {
        self.definitions.iter()
    }

    /// Position of an action in catalog order.
    pub fn position(&self, id: ActionId) -> Option<usize> {
        self.index.get(&id).copied()
    }
}

fn validate_definition(definition: &ActionDefinition) -> Result<(), RegistryError> {
    let id = definition.id;

    let side_effect_ok = match definition.bracket {
        Bracket::Read => definition.side_effect == SideEffect::ReadOnly,
        _ => definition.side_effect != SideEffect::ReadOnly,
    };
    if !side_effect_ok {
        return Err(RegistryError::SideEffectMismatch {
            action: id,
            bracket: definition.bracket,
            side_effect: definition.side_effect,
        });
    }

    if definition.card_type.lifecycle() == LifecycleKind::ReadOnly && definition.bracket.is_mutation()
    {
        return Err(RegistryError::ReadOnlyEntityMutation {
            action: id,
            card_type: definition.card_type,
        });
    }

    if definition.bracket.is_mutation() {
        let terminal = definition.card_type.terminal_statuses();
        if let Some(status) = definition
            .trigger
            .statuses
            .iter()
            .find(|s| terminal.contains(&s.as_str()))
        {
            return Err(RegistryError::UnreachableTrigger {
                action: id,
                status: status.clone(),
            });
        }
    }

    for condition in &definition.trigger.conditions {
        let has_rhs = condition.value.is_some() || condition.compare_to.is_some();
        let both_rhs = condition.value.is_some() && condition.compare_to.is_some();
        let reason = match condition.op {
            ConditionOp::Exists | ConditionOp::Missing if has_rhs => {
                Some("presence checks take no right-hand side")
            }
            ConditionOp::Exists | ConditionOp::Missing => None,
            _ if !has_rhs => Some("comparison needs `value` or `compare_to`"),
            _ if both_rhs => Some("`value` and `compare_to` are mutually exclusive"),
            op if op.is_numeric() && condition.value.as_ref().is_some_and(|v| !v.is_number()) => {
                Some("numeric comparison against a non-numeric literal")
            }
            _ => None,
        };
        if let Some(reason) = reason {
            return Err(RegistryError::InvalidCondition {
                action: id,
                key: condition.key.clone(),
                reason: reason.to_string(),
            });
        }
    }

    if let Some(field) = definition
        .required_fields
        .iter()
        .find(|f| definition.optional_fields.contains(f))
    {
        return Err(RegistryError::FieldOverlap {
            action: id,
            field: field.clone(),
        });
    }

    if let Some(role) = definition
        .trigger
        .roles
        .iter()
        .find(|r| definition.trigger.forbidden_roles.contains(r))
    {
        return Err(RegistryError::RoleConflict {
            action: id,
            role: role.as_str().to_string(),
        });
    }

    Ok(())
}

/// Catalog load failures. All of them are fatal at boot.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Catalog parse error: {0}")]
    Parse(String),

    #[error("Catalog version is empty")]
    EmptyVersion,

    #[error("Action defined more than once: {0}")]
    DuplicateAction(ActionId),

    #[error("Action missing from catalog: {0}")]
    MissingAction(ActionId),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("{action}: bracket {bracket} disagrees with side effect {side_effect:?}")]
    SideEffectMismatch {
        action: ActionId,
        bracket: Bracket,
        side_effect: SideEffect,
    },

    #[error("{action}: mutation declared on read-only entity type {card_type}")]
    ReadOnlyEntityMutation {
        action: ActionId,
        card_type: EntityType,
    },

    #[error("{action}: trigger lists terminal status '{status}'")]
    UnreachableTrigger { action: ActionId, status: String },

    #[error("{action}: invalid condition on '{key}': {reason}")]
    InvalidCondition {
        action: ActionId,
        key: String,
        reason: String,
    },

    #[error("{action}: field '{field}' is both required and optional")]
    FieldOverlap { action: ActionId, field: String },

    #[error("{action}: role '{role}' is both allowed and forbidden")]
    RoleConflict { action: ActionId, role: String },
}
