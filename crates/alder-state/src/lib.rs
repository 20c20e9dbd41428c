//! Versioned, optimistically-locked key/value state store
//!
//! The state store is the only place process state is mutated. Every
//! entry carries a monotonically increasing version counter; an update
//! must present the version it read, and a mismatch is a conflict —
//! never a silent overwrite. That version check is the kernel's sole
//! concurrency-control mechanism.
//!
//! # Contract
//!
//! - `create` fails with `AlreadyExists` if the key is occupied.
//! - `read` returns the entry with its version, or `NotFound`.
//! - `update` atomically replaces the value and increments the version,
//!   or fails with `Conflict { expected, actual }`.
//! - `snapshot` returns an immutable point-in-time copy of all entries.
//! - `diff` returns structured per-key create/update/delete operations.
//! - `restore` atomically reconciles the store back to a snapshot; it
//!   exists solely for the rollback subsystem.

#![deny(unsafe_code)]

mod diff;
mod error;
mod store;

pub use diff::*;
pub use error::*;
pub use store::*;
