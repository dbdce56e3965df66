//! Single-use confirmation tokens bound to a proposed diff.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sage_types::{ActionId, EntityKey, ProposedChanges};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Default lifetime of an issued token.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 120;

/// Server-side record of an outstanding confirmation.
#[derive(Clone, Debug)]
pub struct PendingConfirmation {
    pub action: ActionId,
    pub key: EntityKey,
    pub issued_to: Option<String>,
    pub binding: blake3::Hash,
    pub expires_at: DateTime<Utc>,
}

impl PendingConfirmation {
    pub fn binding_hex(&self) -> String {
        self.binding.to_hex().to_string()
    }
}

#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and redeems confirmation tokens.
///
/// Each token is bound by a keyed MAC to the exact action, entity, base
/// version and field diff computed at prepare time. Redemption removes the
/// token in the same critical section that reads it.
pub struct TokenStore {
    key: [u8; 32],
    ttl: Duration,
    pending: Mutex<HashMap<String, PendingConfirmation>>,
}

impl TokenStore {
    pub fn new(ttl: Duration) -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self {
            key,
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// MAC over the canonical encoding of `(action, changes)`.
    pub fn bind(
        &self,
        action: ActionId,
        changes: &ProposedChanges,
    ) -> Result<blake3::Hash, TokenError> {
        let canonical = serde_json::to_vec(&(action.as_str(), changes))
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        Ok(blake3::keyed_hash(&self.key, &canonical))
    }

    pub fn issue(
        &self,
        action: ActionId,
        changes: &ProposedChanges,
        issued_to: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let binding = self.bind(action, changes)?;
        let token = uuid::Uuid::new_v4().to_string();
        let expires_at = now + self.ttl;

        let mut pending = self.pending.lock().map_err(|_| TokenError::LockError)?;
        pending.retain(|_, p| p.expires_at > now);
        pending.insert(
            token.clone(),
            PendingConfirmation {
                action,
                key: EntityKey {
                    entity_type: changes.entity_type,
                    entity_id: changes.entity_id.clone(),
                },
                issued_to,
                binding,
                expires_at,
            },
        );

        Ok(IssuedToken { token, expires_at })
    }

    /// Check-and-invalidate. A token can be redeemed at most once, whether or
    /// not the rest of the execution succeeds.
    pub fn redeem(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<PendingConfirmation, TokenError> {
        let confirmation = self
            .pending
            .lock()
            .map_err(|_| TokenError::LockError)?
            .remove(token)
            .ok_or(TokenError::Unknown)?;
        if confirmation.expires_at <= now {
            return Err(TokenError::Expired);
        }
        Ok(confirmation)
    }

    /// Confirm the redeemed token still describes `changes` for `action`.
    pub fn verify(
        &self,
        confirmation: &PendingConfirmation,
        action: ActionId,
        changes: &ProposedChanges,
    ) -> Result<(), TokenError> {
        if confirmation.action != action {
            return Err(TokenError::Mismatch("token issued for another action"));
        }
        // blake3::Hash equality is constant-time.
        if self.bind(action, changes)? != confirmation.binding {
            return Err(TokenError::Mismatch("entity changed since prepare"));
        }
        Ok(())
    }

    pub fn outstanding(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

/// Token errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token unknown or already used")]
    Unknown,

    #[error("Token expired")]
    Expired,

    #[error("Token mismatch: {0}")]
    Mismatch(&'static str),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Lock error")]
    LockError,
}
