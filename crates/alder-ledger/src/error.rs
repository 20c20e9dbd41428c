//! Error types for the event log

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors raised by event log operations.
///
/// Callers must treat an append failure as fatal to the operation that
/// triggered the event.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("event log io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("event log lock poisoned")]
    LockPoisoned,
}
