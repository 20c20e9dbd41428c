//! Event records

use alder_types::{TaskId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Enumerated event types covering every auditable transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskRetry,
    TaskTimeout,
    /// Execution skipped: either a prior completion with the same
    /// idempotency key was reused, or an upstream dependency failed
    /// (metadata `cause` distinguishes the two)
    TaskSkipped,
    CompensationTriggered,
    PolicyDecision,
    RollbackInitiated,
    RollbackCompleted,
    RollbackPolicyDecision,
    /// Commit validation gate verdict
    CrvResult,
}

/// A single immutable audit event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: uuid::Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub workflow_id: WorkflowId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    /// Structured payload; contents depend on the event type
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl Event {
    pub fn new(event_type: EventType, workflow_id: WorkflowId) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            event_type,
            timestamp: Utc::now(),
            workflow_id,
            task_id: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
