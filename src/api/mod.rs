//! API route definitions
//!
//! REST endpoints for the duplicate scanner: scan lifecycle and group
//! queries under /api/duplicates, liveness and readiness probes at the root.

pub mod duplicates;
pub mod health;
