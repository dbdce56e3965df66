//! Per-action lifecycle records in a bounded, ordered arena.

use crate::error::{ClientError, ClientResult};
use crate::prompt::ConfirmationPrompt;
use chrono::{DateTime, Utc};
use sage_types::{ErrorBody, ExecuteRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of records retained.
pub const DEFAULT_HISTORY_CAP: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionRecordId(pub u64);

impl std::fmt::Display for ActionRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of one user-initiated action.
///
/// `Pending` is the only non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Success,
    Error,
    RolledBack,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Success => "success",
            ActionStatus::Error => "error",
            ActionStatus::RolledBack => "rolled_back",
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, ActionStatus::Pending)
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct ActionRecord {
    pub id: ActionRecordId,
    pub action_name: String,
    pub entity_id: String,
    pub status: ActionStatus,
    /// Request as first dispatched; reused to build the execute call.
    pub request: ExecuteRequest,
    /// Outstanding prepare result awaiting `confirm` or `cancel`.
    pub confirmation: Option<ConfirmationPrompt>,
    pub attempts: u32,
    /// A request is out and its answer has not been recorded yet.
    pub in_flight: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<ErrorBody>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Arena of action records keyed by monotonically increasing id.
///
/// Past `cap` records, the oldest settled record is evicted first; idle
/// pending records are only evicted when nothing else is left. Records with a
/// request in flight are never evicted, so the arena may briefly exceed `cap`.
#[derive(Debug)]
pub struct ActionTracker {
    records: BTreeMap<ActionRecordId, ActionRecord>,
    next_id: u64,
    cap: usize,
}

impl Default for ActionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

impl ActionTracker {
    pub fn new(cap: usize) -> Self {
        Self {
            records: BTreeMap::new(),
            next_id: 1,
            cap: cap.max(1),
        }
    }

    /// Open a pending record for `request`, in flight until [`land`](Self::land).
    pub fn begin(&mut self, request: ExecuteRequest) -> ActionRecordId {
        let id = ActionRecordId(self.next_id);
        self.next_id += 1;
        let now = Utc::now();
        self.records.insert(
            id,
            ActionRecord {
                id,
                action_name: request.action.clone(),
                entity_id: request.context.entity_id.clone(),
                status: ActionStatus::Pending,
                request,
                confirmation: None,
                attempts: 0,
                in_flight: true,
                result: None,
                error: None,
                created_at: now,
                updated_at: now,
            },
        );
        self.evict();
        id
    }

    pub fn get(&self, id: ActionRecordId) -> Option<&ActionRecord> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records oldest first.
    pub fn history(&self) -> impl Iterator<Item = &ActionRecord> {
        self.records.values()
    }

    pub fn pending(&self) -> impl Iterator<Item = &ActionRecord> {
        self.records
            .values()
            .filter(|r| r.status == ActionStatus::Pending)
    }

    /// Record that the in-flight request came back after `attempts` sends.
    pub fn land(&mut self, id: ActionRecordId, attempts: u32) -> ClientResult<()> {
        let record = self.pending_mut(id)?;
        record.attempts += attempts;
        record.in_flight = false;
        record.updated_at = Utc::now();
        Ok(())
    }

    /// Park a prepare result on the record; it stays pending.
    pub fn await_confirmation(
        &mut self,
        id: ActionRecordId,
        prompt: ConfirmationPrompt,
    ) -> ClientResult<()> {
        let record = self.pending_mut(id)?;
        record.confirmation = Some(prompt);
        record.updated_at = Utc::now();
        Ok(())
    }

    /// Take the outstanding confirmation to send it. The record stays pending
    /// and is in flight until landed or settled.
    pub fn take_confirmation(&mut self, id: ActionRecordId) -> ClientResult<ConfirmationPrompt> {
        let record = self.pending_mut(id)?;
        let prompt = record
            .confirmation
            .take()
            .ok_or(ClientError::NoConfirmation(id))?;
        record.in_flight = true;
        Ok(prompt)
    }

    pub fn succeed(&mut self, id: ActionRecordId, result: serde_json::Value) -> ClientResult<()> {
        let record = self.pending_mut(id)?;
        record.result = Some(result);
        Self::settle(record, ActionStatus::Success);
        Ok(())
    }

    pub fn fail(&mut self, id: ActionRecordId, error: Option<ErrorBody>) -> ClientResult<()> {
        let record = self.pending_mut(id)?;
        record.error = error;
        Self::settle(record, ActionStatus::Error);
        Ok(())
    }

    /// Discard local tracking of a pending action.
    ///
    /// Refused while a request is in flight: the server may still commit it.
    pub fn roll_back(&mut self, id: ActionRecordId) -> ClientResult<()> {
        let record = self.pending_mut(id)?;
        if record.in_flight {
            return Err(ClientError::InFlight(id));
        }
        record.confirmation = None;
        Self::settle(record, ActionStatus::RolledBack);
        Ok(())
    }

    fn settle(record: &mut ActionRecord, status: ActionStatus) {
        record.status = status;
        record.in_flight = false;
        record.updated_at = Utc::now();
    }

    fn pending_mut(&mut self, id: ActionRecordId) -> ClientResult<&mut ActionRecord> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(ClientError::UnknownRecord(id))?;
        if record.status != ActionStatus::Pending {
            return Err(ClientError::NotPending {
                id,
                status: record.status,
            });
        }
        Ok(record)
    }

    fn evict(&mut self) {
        while self.records.len() > self.cap {
            let victim = self
                .records
                .values()
                .find(|r| r.status.is_settled())
                .or_else(|| self.records.values().find(|r| !r.in_flight))
                .map(|r| r.id);
            match victim {
                Some(id) => {
                    self.records.remove(&id);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sage_types::{ErrorCode, ExecutionContext, ExecutionMode};

    fn request(action: &str) -> ExecuteRequest {
        ExecuteRequest {
            action: action.to_string(),
            context: ExecutionContext {
                entity_id: "WO-1".to_string(),
                ..ExecutionContext::default()
            },
            payload: Default::default(),
            mode: ExecutionMode::Direct,
            confirmation_token: None,
            signature: None,
        }
    }

    #[test]
    fn settled_records_are_terminal() {
        let mut tracker = ActionTracker::default();
        let id = tracker.begin(request("add_work_order_note"));
        tracker.succeed(id, serde_json::json!({})).unwrap();

        assert!(matches!(
            tracker.fail(id, None),
            Err(ClientError::NotPending {
                status: ActionStatus::Success,
                ..
            })
        ));
        assert!(tracker.roll_back(id).is_err());
    }

    #[test]
    fn failure_keeps_the_server_error() {
        let mut tracker = ActionTracker::default();
        let id = tracker.begin(request("close_work_order"));
        tracker
            .fail(
                id,
                Some(ErrorBody {
                    code: ErrorCode::Forbidden,
                    message: "no".to_string(),
                    details: None,
                }),
            )
            .unwrap();
        let record = tracker.get(id).unwrap();
        assert_eq!(record.status, ActionStatus::Error);
        assert_eq!(record.error.as_ref().unwrap().code, ErrorCode::Forbidden);
    }

    #[test]
    fn eviction_prefers_settled_records() {
        let mut tracker = ActionTracker::new(2);
        let first = tracker.begin(request("a"));
        tracker.land(first, 1).unwrap();
        let second = tracker.begin(request("b"));
        tracker.succeed(second, serde_json::json!(null)).unwrap();
        let third = tracker.begin(request("c"));
        tracker.land(third, 1).unwrap();

        assert_eq!(tracker.len(), 2);
        assert!(tracker.get(first).is_some());
        assert!(tracker.get(second).is_none());
        assert!(tracker.get(third).is_some());

        let fourth = tracker.begin(request("d"));
        assert!(tracker.get(first).is_none());
        assert_eq!(
            tracker.history().map(|r| r.id).collect::<Vec<_>>(),
            vec![third, fourth]
        );
    }

    #[test]
    fn in_flight_records_are_kept_past_the_cap() {
        let mut tracker = ActionTracker::new(1);
        let a = tracker.begin(request("a"));
        let b = tracker.begin(request("b"));
        assert_ne!(a, b);
        assert_eq!(tracker.len(), 2);

        tracker.succeed(a, serde_json::json!(1)).unwrap();
        let c = tracker.begin(request("c"));
        assert!(tracker.get(a).is_none());
        assert_eq!(
            tracker.history().map(|r| r.id).collect::<Vec<_>>(),
            vec![b, c]
        );
    }

    #[test]
    fn ids_are_never_reused() {
        let mut tracker = ActionTracker::new(1);
        let a = tracker.begin(request("a"));
        tracker.land(a, 1).unwrap();
        let b = tracker.begin(request("b"));
        assert_ne!(a, b);
        assert!(matches!(tracker.succeed(a, serde_json::json!(1)), Err(ClientError::UnknownRecord(_))));
    }

    #[test]
    fn roll_back_waits_for_the_request_to_land() {
        let mut tracker = ActionTracker::default();
        let id = tracker.begin(request("accept_receiving"));
        assert!(matches!(tracker.roll_back(id), Err(ClientError::InFlight(_))));
        assert_eq!(tracker.get(id).unwrap().status, ActionStatus::Pending);

        tracker.land(id, 1).unwrap();
        tracker.roll_back(id).unwrap();
        assert_eq!(tracker.get(id).unwrap().status, ActionStatus::RolledBack);
    }
}
