//! Error types for snapshots and rollback

use alder_types::RiskTier;

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors raised by snapshot and rollback operations
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot not found: {0}")]
    NotFound(String),

    #[error("no verified snapshot exists for workflow {0}")]
    NoVerifiedSnapshot(String),

    #[error("snapshot {id} content hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch {
        id: String,
        expected: String,
        computed: String,
    },

    #[error("rollback denied for {principal} at {risk_tier} risk: {reason}")]
    RollbackDenied {
        principal: String,
        risk_tier: RiskTier,
        reason: String,
    },

    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    State(#[from] alder_state::StateError),

    #[error(transparent)]
    Ledger(#[from] alder_ledger::LedgerError),

    #[error("guard evaluation failed: {0}")]
    Guard(#[from] alder_guard::GuardError),

    #[error("snapshot store lock poisoned")]
    LockPoisoned,
}
