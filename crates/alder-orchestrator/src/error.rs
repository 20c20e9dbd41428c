//! Error types for the orchestrator

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors that abort an `execute_workflow` call outright.
///
/// Task-level failures (timeouts, executor errors, policy rejections,
/// blocked commits) do not surface here — they are captured per task in
/// the `WorkflowExecutionResult` and the event log. These variants mean
/// the kernel itself could not make progress.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Spec(#[from] alder_types::SpecError),

    #[error(transparent)]
    State(#[from] alder_state::StateError),

    /// Event log append failures are fatal: no state transition may
    /// commit without its audit record.
    #[error(transparent)]
    Ledger(#[from] alder_ledger::LedgerError),

    #[error(transparent)]
    Guard(#[from] alder_guard::GuardError),

    #[error(transparent)]
    Snapshot(#[from] alder_snapshot::SnapshotError),

    #[error("workflow state serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
