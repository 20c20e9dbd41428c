//! Execution results: the programmatic surface returned to front ends

use crate::{TaskId, TaskStatus, WorkflowId, WorkflowStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of a single task execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskExecutionResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Number of execution attempts made
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Outcome of a complete `execute_workflow` call.
///
/// A workflow left `Running` means tasks are parked awaiting human
/// approval; re-invoking `execute_workflow` after the decision resumes it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowExecutionResult {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    pub task_results: HashMap<TaskId, TaskExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl WorkflowExecutionResult {
    pub fn task(&self, id: &TaskId) -> Option<&TaskExecutionResult> {
        self.task_results.get(id)
    }
}
