//! Append-only per-workflow event log
//!
//! Every decision and state transition in the kernel is recorded here.
//! Events are never updated or deleted; the log is the sole audit record
//! and the rollback mechanism's evidence trail.
//!
//! A failure to append is fatal to the triggering operation — no state
//! transition is considered committed without its audit record.
//!
//! Two backends are provided behind the `EventLog` trait:
//! - `MemoryEventLog` for tests and embedded use
//! - `FileEventLog`, one JSON record per line under
//!   `<root>/<workflow_id>/events.jsonl`

#![deny(unsafe_code)]

mod error;
mod event;
mod log;

pub use error::*;
pub use event::*;
pub use log::*;
