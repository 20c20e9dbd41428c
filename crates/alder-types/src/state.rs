//! Runtime workflow state: the durable record of execution progress
//!
//! WorkflowState is owned exclusively by the orchestrator and persisted
//! through the state store after every transition. A crashed process
//! resumes by reloading it and recomputing the ready set — completed
//! tasks are never re-run.

use crate::{TaskId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Overall workflow status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Created,
    Running,
    Completed,
    Failed,
    RolledBack,
}

/// Per-task execution status.
///
/// `AwaitingApproval` parks a task pending a human decision without
/// occupying a worker; `Skipped` marks tasks unreachable because an
/// upstream dependency permanently failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Retrying,
    Compensating,
    Compensated,
    AwaitingApproval,
    Skipped,
}

impl TaskStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Failed
                | TaskStatus::Compensated
                | TaskStatus::Skipped
        )
    }
}

/// Runtime state of a single task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskState {
    pub status: TaskStatus,
    /// Number of execution attempts made so far
    pub attempts: u32,
    /// Most recent error, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// State-store key holding the task's result, once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_key: Option<String>,
    /// When the task last changed status
    pub updated_at: DateTime<Utc>,
}

impl TaskState {
    pub fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
            result_key: None,
            updated_at: Utc::now(),
        }
    }

    pub fn transition(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Durable runtime state of a workflow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    pub tasks: HashMap<TaskId, TaskState>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Initialize fresh state with every task pending.
    pub fn new(workflow_id: WorkflowId, task_ids: impl IntoIterator<Item = TaskId>) -> Self {
        let now = Utc::now();
        Self {
            workflow_id,
            status: WorkflowStatus::Created,
            tasks: task_ids
                .into_iter()
                .map(|id| (id, TaskState::pending()))
                .collect(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn task(&self, id: &TaskId) -> Option<&TaskState> {
        self.tasks.get(id)
    }

    pub fn task_mut(&mut self, id: &TaskId) -> Option<&mut TaskState> {
        self.updated_at = Utc::now();
        self.tasks.get_mut(id)
    }

    /// Whether every task completed successfully.
    pub fn all_tasks_succeeded(&self) -> bool {
        self.tasks
            .values()
            .all(|t| matches!(t.status, TaskStatus::Completed))
    }

    /// Whether any task is in a permanently failed shape.
    pub fn any_task_failed(&self) -> bool {
        self.tasks.values().any(|t| {
            matches!(
                t.status,
                TaskStatus::Failed | TaskStatus::Compensated | TaskStatus::Skipped
            )
        })
    }

    /// Whether any task is parked waiting on a human decision.
    pub fn any_awaiting_approval(&self) -> bool {
        self.tasks
            .values()
            .any(|t| t.status == TaskStatus::AwaitingApproval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_all_pending() {
        let state = WorkflowState::new(
            WorkflowId::new("wf"),
            vec![TaskId::new("a"), TaskId::new("b")],
        );
        assert_eq!(state.status, WorkflowStatus::Created);
        assert!(state
            .tasks
            .values()
            .all(|t| t.status == TaskStatus::Pending && t.attempts == 0));
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Compensated.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(!TaskStatus::Retrying.is_terminal());
        assert!(!TaskStatus::AwaitingApproval.is_terminal());
    }

    #[test]
    fn state_survives_serde_round_trip() {
        let mut state = WorkflowState::new(WorkflowId::new("wf"), vec![TaskId::new("a")]);
        state.task_mut(&TaskId::new("a")).unwrap().attempts = 2;
        let json = serde_json::to_string(&state).unwrap();
        let restored: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.task(&TaskId::new("a")).unwrap().attempts, 2);
    }
}
