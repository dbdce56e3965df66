use chrono::{DateTime, Utc};
use sage_types::{ExecuteResponse, FieldChange, ProposedChanges};
use serde_json::Value;

/// What the user is asked to sign, built from a prepare response.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfirmationPrompt {
    pub action: String,
    pub token: String,
    pub changes: ProposedChanges,
    pub expires_at: DateTime<Utc>,
}

impl ConfirmationPrompt {
    /// `None` unless the response is a complete confirmation request.
    pub fn from_response(action: &str, response: &ExecuteResponse) -> Option<Self> {
        if !response.success || !response.confirmation_required {
            return None;
        }
        Some(Self {
            action: action.to_string(),
            token: response.confirmation_token.clone()?,
            changes: response.proposed_changes.clone()?,
            expires_at: response.expires_at?,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Plain-text prompt, one line per changed field.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Confirm {} on {}/{}:\n",
            self.action.replace('_', " "),
            self.changes.entity_type,
            self.changes.entity_id
        );
        for change in &self.changes.changes {
            out.push_str(&format!("  {}\n", describe(change)));
        }
        out.push_str(&format!(
            "Sign with PIN and one-time code before {}.",
            self.expires_at.format("%H:%M:%S UTC")
        ));
        out
    }
}

fn describe(change: &FieldChange) -> String {
    match (&change.from, &change.to) {
        (Value::Null, to) => format!("{}: set to {}", change.field, short(to)),
        (from, Value::Null) => format!("{}: clear (was {})", change.field, short(from)),
        (from, to) => format!("{}: {} -> {}", change.field, short(from), short(to)),
    }
}

fn short(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => format!("{} entries", items.len()),
        other => other.to_string(),
    }
}
