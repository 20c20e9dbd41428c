//! Error types for the state store

pub type StateResult<T> = Result<T, StateError>;

/// Errors raised by state store operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("key already exists: {0}")]
    AlreadyExists(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("version conflict on {key}: expected {expected}, actual {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("state store lock poisoned")]
    LockPoisoned,
}
