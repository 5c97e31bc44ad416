//! # Rally Gateway
//!
//! HTTP surface for the rally service. Thin plumbing by design: request
//! validation at the boundary, then straight into the push and reminder
//! cores.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
