//! Shared domain types for the alder orchestration kernel
//!
//! Workflows in alder are static DAGs of tasks with real-world side
//! effects. Every type here is defined once and consumed by the rest of
//! the workspace:
//!
//! - **WorkflowSpec / TaskSpec**: the immutable blueprint — tasks, a
//!   dependency map, retry policies, idempotency keys, risk tiers.
//! - **WorkflowState / TaskState**: the durable runtime record, persisted
//!   through the state store after every transition so a crashed process
//!   can resume where it left off.
//! - **RiskTier / Permission / Principal / Action**: the policy vocabulary
//!   consumed by the goal-guard when deciding whether an action may run.
//! - **WorkflowExecutionResult**: the programmatic result surface exposed
//!   to front ends.
//!
//! # Design Principles
//!
//! 1. Specs are immutable once execution starts. To change a workflow,
//!    submit a new one.
//! 2. Every status transition is explicit and auditable.
//! 3. Structural validation (duplicate ids, unknown dependencies, cycles)
//!    happens at ingestion, before any task can run.

#![deny(unsafe_code)]

mod error;
mod policy;
mod result;
mod spec;
mod state;

pub use error::*;
pub use policy::*;
pub use result::*;
pub use spec::*;
pub use state::*;
