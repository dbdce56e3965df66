//! Trigger condition evaluation against an entity snapshot.

use sage_types::{ConditionOp, ConditionSource, EntitySnapshot, TriggerCondition};
use serde_json::Value;

/// Result of checking one condition.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ConditionOutcome {
    pub satisfied: bool,
    /// Relative distance from the boundary, for satisfied numeric comparisons.
    pub margin: Option<f64>,
    pub description: String,
}

pub(crate) fn check(condition: &TriggerCondition, entity: &EntitySnapshot) -> ConditionOutcome {
    let lhs = left_hand_side(condition, entity);
    let (rhs, rhs_label) = right_hand_side(condition, entity);
    let description = describe(condition, &rhs_label, lhs.as_ref());

    let present = |v: &Option<Value>| v.as_ref().is_some_and(|v| !v.is_null());

    let (satisfied, margin) = match condition.op {
        ConditionOp::Exists => (present(&lhs), None),
        ConditionOp::Missing => (!present(&lhs), None),
        ConditionOp::Eq => (matches!((&lhs, &rhs), (Some(l), Some(r)) if values_equal(l, r)), None),
        ConditionOp::Ne => (matches!((&lhs, &rhs), (Some(l), Some(r)) if !values_equal(l, r)), None),
        op => match (lhs.as_ref().and_then(Value::as_f64), rhs.as_ref().and_then(Value::as_f64)) {
            (Some(l), Some(r)) => {
                let satisfied = match op {
                    ConditionOp::Gt => l > r,
                    ConditionOp::Gte => l >= r,
                    ConditionOp::Lt => l < r,
                    ConditionOp::Lte => l <= r,
                    _ => false,
                };
                let margin = satisfied.then(|| (l - r).abs() / r.abs().max(1.0));
                (satisfied, margin)
            }
            _ => (false, None),
        },
    };

    ConditionOutcome {
        satisfied,
        margin,
        description,
    }
}

fn left_hand_side(condition: &TriggerCondition, entity: &EntitySnapshot) -> Option<Value> {
    match condition.source {
        ConditionSource::Field => entity.field(&condition.key),
        ConditionSource::Related => entity
            .related
            .get(&condition.key)
            .map(|count| Value::from(*count)),
    }
}

fn right_hand_side(condition: &TriggerCondition, entity: &EntitySnapshot) -> (Option<Value>, String) {
    match (&condition.value, &condition.compare_to) {
        (Some(value), _) => (Some(value.clone()), value.to_string()),
        (None, Some(field)) => (entity.field(field), field.clone()),
        (None, None) => (None, String::new()),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn describe(condition: &TriggerCondition, rhs_label: &str, lhs: Option<&Value>) -> String {
    let actual = lhs
        .map(Value::to_string)
        .unwrap_or_else(|| "absent".to_string());
    match condition.op {
        ConditionOp::Exists | ConditionOp::Missing => {
            format!("{} {} (actual {})", condition.key, condition.op.symbol(), actual)
        }
        op => format!(
            "{} {} {} (actual {})",
            condition.key,
            op.symbol(),
            rhs_label,
            actual
        ),
    }
}
