//! Error types for the scheduler crate.

use pagemark_storage::StorageError;
use thiserror::Error;

/// Errors that can occur during scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Persisting the pending-task set failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Scheduler was shut down
    #[error("Scheduler is shut down")]
    ShutDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedulerError::ShutDown;
        assert!(err.to_string().contains("shut down"));

        let err = SchedulerError::from(StorageError::Key("bad".to_string()));
        assert!(err.to_string().contains("Storage error"));
    }
}
