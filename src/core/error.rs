use thiserror::Error;

#[derive(Error, Debug)]
pub enum PartitionError {
    #[error("{0}")]
    Validation(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Configuration for '{0}' not found")]
    ConfigurationNotFound(String),

    #[error("Command '{0}' not found")]
    CommandNotFound(String),

    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error("Switch blocked: {0}")]
    SwitchBlocked(String),

    #[error("Permission denied: missing grants {0}")]
    PermissionDenied(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

pub type Result<T> = std::result::Result<T, PartitionError>;

impl PartitionError {
    /// Message suitable for direct operator display.
    pub fn display_message(&self) -> String {
        self.to_string()
    }

    /// True for expected validation / business-rule failures, false for
    /// faults that should be logged as system errors.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            PartitionError::Infrastructure(_) | PartitionError::ExecutionError(_)
        )
    }
}

impl From<serde_json::Error> for PartitionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Infrastructure(format!("JSON serialization failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_failures_are_expected() {
        assert!(PartitionError::Validation("bad input".into()).is_expected());
        assert!(PartitionError::SwitchBlocked("target not empty".into()).is_expected());
        assert!(PartitionError::PermissionDenied("ALTER".into()).is_expected());
    }

    #[test]
    fn test_faults_are_not_expected() {
        assert!(!PartitionError::Infrastructure("pool exhausted".into()).is_expected());
        assert!(!PartitionError::ExecutionError("lock timeout".into()).is_expected());
    }
}
