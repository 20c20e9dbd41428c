//! Workflow orchestrator: the kernel's scheduling core
//!
//! The orchestrator executes static DAG workflows whose steps call
//! external tools with real-world side effects. For each ready task it:
//!
//! 1. reuses any prior completion recorded under the task's idempotency
//!    key (side effects happen at most once),
//! 2. consults the feasibility checker and the goal-guard — a rejected
//!    or pending-human decision halts the task without executing it,
//! 3. invokes the caller-supplied executor under a per-task timeout,
//! 4. passes the result through the commit validation gate — a blocked
//!    commit is a logical defect, failed without retry,
//! 5. persists the result through the state store, cuts a verified
//!    snapshot, and appends the audit events.
//!
//! Progress is durable: workflow state is persisted after every
//! transition, so `execute_workflow` is safe to call again after a
//! crash — completed tasks are never re-run. Tasks with no mutual
//! dependency run concurrently up to a configurable limit; transient
//! failures retry with exponential backoff; permanent failures trigger
//! best-effort compensation and skip downstream tasks.

#![deny(unsafe_code)]

mod config;
mod error;
mod executor;
mod orchestrator;

pub use config::*;
pub use error::*;
pub use executor::*;
pub use orchestrator::*;
