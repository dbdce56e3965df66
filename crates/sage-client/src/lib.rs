//! SAGE Client - client-side lifecycle of governed actions
//!
//! [`ActionClient`] wraps an [`ActionTransport`] and tracks every action it
//! sends in an [`ActionTracker`]: pending until the server answers, then
//! success or error. A signed action's prepare step leaves the record pending
//! with a [`ConfirmationPrompt`] attached, until [`ActionClient::confirm`] or
//! [`ActionClient::cancel`]. A record whose request is still on the wire can
//! be neither cancelled nor evicted.
//!
//! Transient transport failures are retried under a [`RetryPolicy`]; anything
//! the server rejected on its merits is surfaced immediately.

#![deny(unsafe_code)]

mod error;
mod prompt;
mod retry;
mod tracker;
mod transport;

pub use error::{ClientError, ClientResult};
pub use prompt::ConfirmationPrompt;
pub use retry::{RetryPolicy, MAX_ATTEMPTS};
pub use tracker::{ActionRecord, ActionRecordId, ActionStatus, ActionTracker, DEFAULT_HISTORY_CAP};
pub use transport::{ActionTransport, HttpTransport};

use chrono::Utc;
use sage_types::{
    DecisionRequest, DecisionResponse, ErrorBody, ErrorCode, ExecuteRequest, ExecutionMode,
    SignatureInput,
};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Outcome of [`ActionClient::dispatch`].
#[derive(Clone, Debug)]
pub enum Dispatched {
    Completed {
        id: ActionRecordId,
        data: Value,
    },
    /// Signed action prepared; call `confirm` or `cancel` with `id`.
    AwaitingConfirmation {
        id: ActionRecordId,
        prompt: ConfirmationPrompt,
    },
}

pub struct ActionClient {
    transport: Arc<dyn ActionTransport>,
    retry: RetryPolicy,
    tracker: Mutex<ActionTracker>,
}

impl ActionClient {
    pub fn new(transport: Arc<dyn ActionTransport>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            tracker: Mutex::new(ActionTracker::default()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.tracker = Mutex::new(ActionTracker::new(cap));
        self
    }

    /// Fetch decisions. Decisions are hints for rendering only.
    pub async fn decide(&self, request: &DecisionRequest) -> ClientResult<DecisionResponse> {
        self.retry
            .run(|| self.transport.decisions(request))
            .await
            .map(|(response, _)| response)
            .map_err(|(err, _)| err)
    }

    /// Send a direct or prepare request and track it.
    pub async fn dispatch(&self, request: ExecuteRequest) -> ClientResult<Dispatched> {
        let action = request.action.clone();
        let id = self.tracker()?.begin(request.clone());
        debug!(record = %id, action = %action, mode = %request.mode, "Action dispatched");

        match self.retry.run(|| self.transport.execute(&request)).await {
            Ok((response, attempts)) => {
                let mut tracker = self.tracker()?;
                tracker.land(id, attempts)?;

                if let Some(prompt) = ConfirmationPrompt::from_response(&action, &response) {
                    tracker.await_confirmation(id, prompt.clone())?;
                    info!(record = %id, action = %action, "Awaiting confirmation");
                    return Ok(Dispatched::AwaitingConfirmation { id, prompt });
                }
                if response.success {
                    let data = response.data.unwrap_or(Value::Null);
                    tracker.succeed(id, data.clone())?;
                    return Ok(Dispatched::Completed { id, data });
                }
                tracker.fail(id, response.error.clone())?;
                Err(ClientError::Api {
                    status: 200,
                    error: response.error,
                })
            }
            Err((err, attempts)) => {
                let mut tracker = self.tracker()?;
                tracker.land(id, attempts)?;
                tracker.fail(id, api_error(&err))?;
                warn!(record = %id, action = %action, attempts, error = %err, "Action failed");
                Err(err)
            }
        }
    }

    /// Execute a prepared action with the user's signature.
    ///
    /// Sent exactly once: the confirmation token is single-use, so a retry
    /// could only ever come back stale. An expired prompt fails locally
    /// without contacting the server.
    pub async fn confirm(&self, id: ActionRecordId, signature: SignatureInput) -> ClientResult<Value> {
        let execute = {
            let mut tracker = self.tracker()?;
            let prompt = tracker.take_confirmation(id)?;
            if prompt.is_expired(Utc::now()) {
                tracker.fail(
                    id,
                    Some(ErrorBody {
                        code: ErrorCode::TokenExpired,
                        message: format!("Confirmation expired at {}", prompt.expires_at),
                        details: None,
                    }),
                )?;
                warn!(record = %id, action = %prompt.action, "Confirmation expired before signing");
                return Err(ClientError::ConfirmationExpired(id));
            }
            let record = tracker.get(id).ok_or(ClientError::UnknownRecord(id))?;
            ExecuteRequest {
                mode: ExecutionMode::Execute,
                confirmation_token: Some(prompt.token),
                signature: Some(signature),
                ..record.request.clone()
            }
        };

        let result = self.transport.execute(&execute).await;

        let mut tracker = self.tracker()?;
        tracker.land(id, 1)?;
        match result {
            Ok(response) if response.success => {
                let data = response.data.unwrap_or(Value::Null);
                tracker.succeed(id, data.clone())?;
                info!(record = %id, action = %execute.action, "Signed action completed");
                Ok(data)
            }
            Ok(response) => {
                tracker.fail(id, response.error.clone())?;
                Err(ClientError::Api {
                    status: 200,
                    error: response.error,
                })
            }
            Err(err) => {
                tracker.fail(id, api_error(&err))?;
                warn!(record = %id, action = %execute.action, error = %err, "Signed action failed");
                Err(err)
            }
        }
    }

    /// Stop tracking a pending action. Nothing is sent to the server.
    ///
    /// Fails with [`ClientError::InFlight`] while a request for the record is
    /// awaiting its answer.
    pub fn cancel(&self, id: ActionRecordId) -> ClientResult<()> {
        self.tracker()?.roll_back(id)
    }

    pub fn record(&self, id: ActionRecordId) -> Option<ActionRecord> {
        self.tracker().ok()?.get(id).cloned()
    }

    pub fn history(&self) -> Vec<ActionRecord> {
        self.tracker()
            .map(|t| t.history().cloned().collect())
            .unwrap_or_default()
    }

    fn tracker(&self) -> ClientResult<MutexGuard<'_, ActionTracker>> {
        self.tracker.lock().map_err(|_| ClientError::LockError)
    }
}

fn api_error(err: &ClientError) -> Option<ErrorBody> {
    match err {
        ClientError::Api { error, .. } => error.clone(),
        _ => None,
    }
}
