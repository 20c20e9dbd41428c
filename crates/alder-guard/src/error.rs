//! Error types for the goal-guard

pub type GuardResult<T> = Result<T, GuardError>;

/// Errors raised by guard operations
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("guard lock poisoned")]
    LockPoisoned,
}
