//! Error types shared by the storage, task and search layers.

use thiserror::Error;

/// Storage layer errors.
///
/// Cloneable so a single failed cache load can be handed to every caller
/// that was waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Pool exhausted or database unreachable after all retries.
    #[error("storage unavailable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },

    /// Duplicate key on a plain insert.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Malformed SQL, parameter mismatch or other non-transient failure.
    #[error("query failed: {0}")]
    Query(String),

    /// A row could not be turned back into a record.
    #[error("malformed row in {table}: {reason}")]
    Decode { table: &'static str, reason: String },

    /// The worker running the operation went away before finishing.
    #[error("storage task interrupted: {0}")]
    Interrupted(String),
}

impl StorageError {
    pub fn decode(table: &'static str, reason: impl ToString) -> Self {
        Self::Decode {
            table,
            reason: reason.to_string(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Search/streaming backend errors.
///
/// None of these are fatal: the loader treats every variant as a reason to
/// move on to the next stage of its fallback chain.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend {0} is disabled")]
    Disabled(&'static str),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend request timed out after {0} ms")]
    Timeout(u64),

    #[error("unexpected backend response: {0}")]
    Protocol(String),
}

/// Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Errors reported by the task executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// The task panicked, or the pool shut down before running it.
    #[error("task aborted before producing a result")]
    Aborted,
}

impl From<TaskError> for StorageError {
    fn from(err: TaskError) -> Self {
        Self::Interrupted(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_message_names_attempts() {
        let err = StorageError::Unavailable {
            attempts: 3,
            reason: "pool timed out".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "storage unavailable after 3 attempts: pool timed out"
        );
    }

    #[test]
    fn test_task_error_converts_to_interrupted() {
        let err: StorageError = TaskError::Aborted.into();
        assert!(matches!(err, StorageError::Interrupted(_)));
    }
}
