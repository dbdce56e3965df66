//! API layer for the SAGE daemon

pub mod rest;

pub use rest::create_router;
