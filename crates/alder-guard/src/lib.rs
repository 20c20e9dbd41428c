//! Goal-guard: the policy approval state machine
//!
//! Every action with real-world side effects passes through the guard
//! before execution. The guard is a small FSM:
//!
//! ```text
//! Init -> Evaluating -> { Approved, Rejected, PendingHuman }
//! PendingHuman -> { Approved, Rejected }   (explicit human decision only)
//! ```
//!
//! Risk tier is a hard gate, not a score. Low and Medium actions that
//! pass the permission checks approve immediately; High and Critical
//! actions always park in `PendingHuman` with a freshly minted one-time
//! token — no configuration can weaken this.
//!
//! Permission checks fail closed: a missing permission, a tool outside
//! the allowlist, or a data-zone mismatch rejects the action outright.
//!
//! Every evaluation — approved, rejected, or pending — lands in the
//! guard's internal audit log, independent of the global event log, and
//! so does every accepted human approval or rejection.

#![deny(unsafe_code)]

mod audit;
mod error;
mod guard;

pub use audit::*;
pub use error::*;
pub use guard::*;
