//! Thin read-only API surface (§7 of SPEC_FULL.md).
//!
//! Kept from the teacher's `api/routes.rs`/`api/simple.rs` shape, trimmed
//! to the handful of read-only snapshot endpoints a dashboard or alerting
//! consumer needs: scan status, active detections, and recent decisions.
//! No auth, no write endpoints, no UI.

mod routes;

pub use routes::{router, ApiState};
