//! Action handlers: turn an admitted request into a field diff.
//!
//! Handlers never mutate. They compute a [`ProposedChanges`] from the current
//! snapshot and the payload; the dispatcher commits it. Because the diff is a
//! pure function of its inputs, recomputing it at execute time detects any
//! change to the entity since prepare.

use sage_types::{
    ActionDefinition, ActionId, EntitySnapshot, FieldChange, ProposedChanges,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Prefix addressing a related-record count instead of a field.
const RELATED_PREFIX: &str = "related.";

/// What an action does to its entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionEffect {
    Read,
    /// Append the payload as one entry of a list field.
    AppendEntry { field: &'static str },
    /// Overwrite fields with payload values.
    UpdateFields,
    /// Apply payload fields, then move to `status`.
    Transition {
        status: &'static str,
        resolves: bool,
    },
    /// Decrement stock by the payload quantity.
    ConsumeStock,
    /// Link a new work order and bump the related count.
    RaiseWorkOrder,
}

impl ActionEffect {
    /// Exhaustive over the action set: adding an action without an effect does
    /// not compile.
    pub fn of(action: ActionId) -> Self {
        use ActionEffect::*;
        match action {
            ActionId::ViewWorkOrder
            | ActionId::ViewFault
            | ActionId::ViewEquipment
            | ActionId::ViewStock
            | ActionId::ViewCertificate
            | ActionId::ViewPurchaseOrder
            | ActionId::ViewReceiving
            | ActionId::ViewComplianceLog
            | ActionId::ViewDocument
            | ActionId::RunSearch => Read,

            ActionId::AddWorkOrderNote | ActionId::AddFaultNote | ActionId::AddCertificateNote => {
                AppendEntry { field: "notes" }
            }
            ActionId::AddComplianceEntry => AppendEntry { field: "entries" },
            ActionId::UpdateReceivingLine => AppendEntry {
                field: "line_updates",
            },
            ActionId::NotifyEquipmentOwner => AppendEntry {
                field: "notifications",
            },
            ActionId::OrderPart => AppendEntry { field: "orders" },

            ActionId::UpdateWorkOrder
            | ActionId::ReassignWorkOrder
            | ActionId::UpdateRunningHours
            | ActionId::UpdatePurchaseOrder => UpdateFields,

            ActionId::StartWorkOrder => Transition {
                status: "in_progress",
                resolves: false,
            },
            ActionId::CloseWorkOrder => Transition {
                status: "closed",
                resolves: true,
            },
            ActionId::AcknowledgeFault => Transition {
                status: "acknowledged",
                resolves: false,
            },
            ActionId::CloseFault => Transition {
                status: "closed",
                resolves: true,
            },
            ActionId::FlagEquipmentCritical => Transition {
                status: "critical",
                resolves: false,
            },
            ActionId::RenewCertificate => Transition {
                status: "valid",
                resolves: false,
            },
            ActionId::RevokeCertificate => Transition {
                status: "revoked",
                resolves: true,
            },
            ActionId::RequestPurchaseApproval => Transition {
                status: "pending_approval",
                resolves: false,
            },
            ActionId::ApprovePurchaseOrder => Transition {
                status: "approved",
                resolves: true,
            },
            ActionId::CancelPurchaseOrder => Transition {
                status: "cancelled",
                resolves: true,
            },
            ActionId::AcceptReceiving => Transition {
                status: "accepted",
                resolves: true,
            },
            ActionId::RejectReceiving => Transition {
                status: "rejected",
                resolves: true,
            },
            ActionId::CountersignComplianceLog => Transition {
                status: "countersigned",
                resolves: true,
            },

            ActionId::LogPartUsage => ConsumeStock,
            ActionId::CreateWorkOrderFromFault => RaiseWorkOrder,
        }
    }
}

/// Computes the diff an action would apply.
pub trait ActionHandler: Send + Sync {
    fn plan(
        &self,
        definition: &ActionDefinition,
        entity: &EntitySnapshot,
        payload: &BTreeMap<String, Value>,
    ) -> Result<ProposedChanges, HandlerError>;
}

/// Handler driven by [`ActionEffect::of`].
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardHandler;

impl ActionHandler for StandardHandler {
    fn plan(
        &self,
        definition: &ActionDefinition,
        entity: &EntitySnapshot,
        payload: &BTreeMap<String, Value>,
    ) -> Result<ProposedChanges, HandlerError> {
        let effect = ActionEffect::of(definition.id);
        let mut diff = Diff::new(entity);

        let resolves = match effect {
            ActionEffect::Read => false,
            ActionEffect::AppendEntry { field } => {
                let entry: Map<String, Value> =
                    payload.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                let mut list = entity
                    .field(field)
                    .and_then(|v| v.as_array().cloned())
                    .unwrap_or_default();
                list.push(Value::Object(entry));
                diff.set(field, Value::Array(list));
                false
            }
            ActionEffect::UpdateFields => {
                diff.set_all(payload);
                false
            }
            ActionEffect::Transition { status, resolves } => {
                diff.set_all(payload);
                diff.set("status", Value::from(status));
                resolves
            }
            ActionEffect::ConsumeStock => {
                let quantity = positive_number(payload, "quantity")?;
                let stock = entity
                    .field("stock_quantity")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0);
                if quantity > stock {
                    return Err(HandlerError::InvalidValue {
                        field: "quantity".to_string(),
                        reason: format!("exceeds stock on hand ({})", stock),
                    });
                }
                diff.set("stock_quantity", number(stock - quantity));
                if let Some(work_order) = payload.get("work_order_id") {
                    diff.set("last_used_for", work_order.clone());
                }
                false
            }
            ActionEffect::RaiseWorkOrder => {
                diff.set(
                    "linked_work_order",
                    Value::from(format!("WO-{}", entity.entity_id)),
                );
                if let Some(title) = payload.get("title") {
                    diff.set("linked_work_order_title", title.clone());
                }
                let open = entity.related.get("open_work_orders").copied().unwrap_or(0);
                diff.set(
                    &format!("{}open_work_orders", RELATED_PREFIX),
                    Value::from(open + 1),
                );
                if entity.status.as_deref() == Some("open") {
                    diff.set("status", Value::from("acknowledged"));
                }
                false
            }
        };

        let changes = diff.finish();
        if definition.bracket.is_mutation() && changes.is_empty() {
            return Err(HandlerError::NoChanges);
        }

        Ok(ProposedChanges {
            entity_type: entity.entity_type,
            entity_id: entity.entity_id.clone(),
            base_version: entity.version,
            changes,
            resolves,
        })
    }
}

/// Reject payloads missing a required field or carrying an undeclared one.
pub fn validate_payload(
    definition: &ActionDefinition,
    payload: &BTreeMap<String, Value>,
) -> Result<(), HandlerError> {
    for field in &definition.required_fields {
        let present = match payload.get(field) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        };
        if !present {
            return Err(HandlerError::MissingField(field.clone()));
        }
    }
    if let Some(extra) = payload.keys().find(|k| {
        !definition.required_fields.contains(k) && !definition.optional_fields.contains(k)
    }) {
        return Err(HandlerError::UnexpectedField(extra.clone()));
    }
    Ok(())
}

/// Produce the post-mutation snapshot. The store assigns the version.
pub fn apply_changes(entity: &EntitySnapshot, changes: &ProposedChanges) -> EntitySnapshot {
    let mut next = entity.clone();
    for change in &changes.changes {
        if change.field == "status" {
            next.status = change.to.as_str().map(str::to_string);
        } else if let Some(relation) = change.field.strip_prefix(RELATED_PREFIX) {
            next.related
                .insert(relation.to_string(), change.to.as_u64().unwrap_or(0));
        } else if change.to.is_null() {
            next.fields.remove(&change.field);
        } else {
            next.fields.insert(change.field.clone(), change.to.clone());
        }
    }
    next
}

struct Diff<'a> {
    entity: &'a EntitySnapshot,
    changes: Vec<FieldChange>,
}

impl<'a> Diff<'a> {
    fn new(entity: &'a EntitySnapshot) -> Self {
        Self {
            entity,
            changes: Vec::new(),
        }
    }

    fn current(&self, field: &str) -> Value {
        match field.strip_prefix(RELATED_PREFIX) {
            Some(relation) => self
                .entity
                .related
                .get(relation)
                .map(|c| Value::from(*c))
                .unwrap_or(Value::Null),
            None => self.entity.field(field).unwrap_or(Value::Null),
        }
    }

    fn set(&mut self, field: &str, to: Value) {
        let from = self.current(field);
        if from != to {
            self.changes.push(FieldChange {
                field: field.to_string(),
                from,
                to,
            });
        }
    }

    fn set_all(&mut self, payload: &BTreeMap<String, Value>) {
        for (field, value) in payload {
            self.set(field, value.clone());
        }
    }

    fn finish(self) -> Vec<FieldChange> {
        self.changes
    }
}

fn positive_number(payload: &BTreeMap<String, Value>, field: &str) -> Result<f64, HandlerError> {
    match payload.get(field).and_then(Value::as_f64) {
        Some(n) if n > 0.0 => Ok(n),
        _ => Err(HandlerError::InvalidValue {
            field: field.to_string(),
            reason: "must be a positive number".to_string(),
        }),
    }
}

fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

/// Handler errors. All of them are caller-correctable.
#[derive(Debug, Error, PartialEq)]
pub enum HandlerError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unexpected field: {0}")]
    UnexpectedField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Request would change nothing")]
    NoChanges,
}
