//! Error types for workflow specification ingestion

use crate::TaskId;

pub type SpecResult<T> = Result<T, SpecError>;

/// Errors raised while parsing or validating a workflow specification
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("workflow has no tasks")]
    Empty,

    #[error("duplicate task id: {0}")]
    DuplicateTask(TaskId),

    #[error("dependency map references unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("cycle detected in workflow dependency graph")]
    CycleDetected,

    #[error("failed to parse workflow definition: {0}")]
    Parse(String),

    #[error("failed to read workflow definition: {0}")]
    Io(String),
}
