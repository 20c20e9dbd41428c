//! Caller-supplied executor contracts
//!
//! The kernel never executes tools itself. Tool execution, compensation,
//! and feasibility checks are provided by the embedding application
//! through these traits.

use alder_types::TaskSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error returned by a task executor.
///
/// `retryable` distinguishes transient faults (retried within the
/// task's budget) from failures the executor knows will not succeed on
/// a retry.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct ExecutorError {
    pub message: String,
    pub retryable: bool,
}

impl ExecutorError {
    /// A transient fault worth retrying.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that will not succeed on retry.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Executes a task's tool call.
///
/// Must be safe to invoke multiple times for the same idempotency key;
/// the kernel's own idempotency check is the primary guard against
/// duplicated side effects, but a cancelled call may still have partially
/// applied by the time the retry lands.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &TaskSpec) -> Result<serde_json::Value, ExecutorError>;
}

/// Context handed to a compensation handler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailureContext {
    pub error: String,
    pub attempts: u32,
}

/// Executes a task's compensation after permanent failure.
///
/// Best-effort: the kernel retries a bounded number of times, logs
/// failures, and never escalates them.
#[async_trait]
pub trait CompensationExecutor: Send + Sync {
    async fn execute(&self, task: &TaskSpec, failure: &FailureContext)
        -> Result<(), ExecutorError>;
}

/// Verdict of a feasibility check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Feasibility {
    pub feasible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Feasibility {
    pub fn ok() -> Self {
        Self {
            feasible: true,
            reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            feasible: false,
            reason: Some(reason.into()),
        }
    }
}

/// Checks tool availability and world-model hard constraints before a
/// task is allowed to execute. An infeasible task fails permanently
/// without invoking the executor.
pub trait FeasibilityChecker: Send + Sync {
    fn check(&self, task: &TaskSpec) -> Feasibility;
}
