//! SAGE Daemon library
//!
//! HTTP surface of the governance engine:
//! - `POST /api/v1/decisions` evaluates actions for entities in context
//! - `POST /api/v1/actions/execute` runs direct, prepare and execute requests
//! - situation and audit history views per entity
//! - configuration, fixture seeding and server lifecycle

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod seed;
pub mod server;

pub use api::rest::AppState;
pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError};
pub use server::Server;
