//! Content-addressed snapshots and policy-gated rollback
//!
//! After every successfully validated task the orchestrator cuts a
//! snapshot: a point-in-time copy of all state entries plus the current
//! memory-pointer set, content-addressed by a SHA-256 hash over the
//! canonicalized contents. Snapshots are immutable once created, and
//! `verified` may only be set at creation time by the caller attesting
//! that execution up to that point passed validation.
//!
//! Rollback restores the state store to a snapshot's recorded entries
//! and swaps the memory-pointer set — but only after the goal-guard
//! approves the restore exactly as it would a task execution. A denied
//! rollback mutates nothing, raises `RollbackDenied`, and leaves a
//! single `ROLLBACK_POLICY_DECISION` audit event behind.

#![deny(unsafe_code)]

mod error;
mod manager;
mod rollback;
mod snapshot;

pub use error::*;
pub use manager::*;
pub use rollback::*;
pub use snapshot::*;
