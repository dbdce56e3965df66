//! SAGE Dispatcher - the only way a mutation reaches the system of record
//!
//! A request names an action, an entity and a payload. The dispatcher
//! re-resolves the action, re-reads the entity and its situation, re-runs the
//! decision evaluator and the authority resolver, and only then computes and
//! commits a diff. Stale client-side decisions are never trusted.
//!
//! Actions in a signed bracket use a two-step protocol:
//!
//! 1. `prepare` computes the diff and returns it with a single-use
//!    confirmation token bound to that exact diff.
//! 2. `execute` presents the token together with a PIN and one-time code. The
//!    token is burned on first use; the diff is recomputed and must match the
//!    one the token was bound to.
//!
//! Each committed mutation lands together with its audit record, or not at all.

#![deny(unsafe_code)]

mod dispatcher;
mod error;
mod guard;
mod handler;
mod signature;
mod store;
mod token;

pub use dispatcher::{DispatchOutcome, ExecutionDispatcher, RequestOrigin};
pub use error::DispatchError;
pub use guard::{InFlightGuard, InFlightPermit};
pub use handler::{
    apply_changes, validate_payload, ActionEffect, ActionHandler, HandlerError, StandardHandler,
};
pub use signature::{
    hash_pin, one_time_code, PinTotpVerifier, SignatureError, SignatureVerifier,
    SigningCredential, VerifiedSigner,
};
pub use store::{Commit, CommitReceipt, EntityStore, InMemoryStore, StoreError, StoreResult};
pub use token::{IssuedToken, PendingConfirmation, TokenError, TokenStore, DEFAULT_TOKEN_TTL_SECS};
