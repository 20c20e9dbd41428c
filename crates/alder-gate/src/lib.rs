//! Commit validation gate
//!
//! The gate sits between "tool produced a result" and "result becomes
//! durable state". Every proposed commit runs through an ordered list of
//! validators; with `block_on_failure` set (the default), any failure
//! blocks the commit and the caller must not persist the associated
//! state change.
//!
//! Validators are pure functions of the payload — no side effects, no
//! network calls — so the gate is deterministic and safe to re-run.
//! A blocked commit is a logical defect, not a transient fault: it is
//! never retried.

#![deny(unsafe_code)]

mod commit;
mod gate;
mod validator;

pub use commit::*;
pub use gate::*;
pub use validator::*;
