//! Error types for the Virtual Assistant
//!
//! Lifecycle failures surface as [`AssistantError`]; subsystem calls fail with
//! [`SubsystemError`](crate::subsystems::SubsystemError), which the orchestrator
//! folds into the lifecycle variants or into a user-facing reply.

use crate::subsystems::SubsystemError;
use thiserror::Error;

/// Application-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssistantError {
    /// A subsystem failed to initialize; later subsystems were not touched
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// A subsystem failed to start; state was not advanced
    #[error("Start failed: {0}")]
    Start(String),

    /// One or more teardown steps failed; every step was still attempted
    #[error("Stop failed: {}", .0.join("; "))]
    Stop(Vec<String>),

    /// A lifecycle method was called before `initialize` succeeded
    #[error("Virtual Assistant is not initialized")]
    NotInitialized,

    /// A command arrived while the orchestrator was not running
    #[error("Virtual Assistant is not running")]
    NotRunning,

    /// A subsystem call failed outside the lifecycle methods
    #[error(transparent)]
    Subsystem(#[from] SubsystemError),

    /// Configuration could not be loaded, validated or saved
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O error
    #[error("IO error: {0}")]
    Io(String),

    /// The tracing subscriber could not be installed
    #[error("Logging error: {0}")]
    Logging(String),
}

impl From<std::io::Error> for AssistantError {
    fn from(e: std::io::Error) -> Self {
        AssistantError::Io(e.to_string())
    }
}

impl AssistantError {
    /// Check if this error is recoverable
    ///
    /// A failed start leaves the orchestrator where it was, so the caller may
    /// retry. Initialization and configuration problems need user action.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AssistantError::Initialization(_) => false,
            AssistantError::Start(_) => true,
            // Stopped regardless; nothing left to retry
            AssistantError::Stop(_) => true,
            AssistantError::NotInitialized => true,
            AssistantError::NotRunning => true,
            AssistantError::Subsystem(_) => true,
            AssistantError::Config(_) => false,
            AssistantError::Io(_) => false,
            AssistantError::Logging(_) => true,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            AssistantError::Initialization(_) => {
                "The assistant could not be initialized. Please check the logs.".to_string()
            }
            AssistantError::Start(_) => {
                "The assistant failed to start. Please try again.".to_string()
            }
            AssistantError::Stop(_) => {
                "The assistant stopped, but some components did not shut down cleanly.".to_string()
            }
            AssistantError::NotInitialized => {
                "The assistant has not been initialized yet.".to_string()
            }
            AssistantError::NotRunning => "The assistant is not running.".to_string(),
            AssistantError::Subsystem(_) => {
                "A component failed to handle the request. Please try again.".to_string()
            }
            AssistantError::Config(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            AssistantError::Io(_) => "File system error occurred.".to_string(),
            AssistantError::Logging(_) => "Logging could not be configured.".to_string(),
        }
    }
}

/// Result type alias for Virtual Assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_error_lists_every_failure() {
        let err = AssistantError::Stop(vec![
            "voice processor: device busy".to_string(),
            "api server: socket closed".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Stop failed: voice processor: device busy; api server: socket closed"
        );
    }

    #[test]
    fn test_recoverability() {
        assert!(AssistantError::Start("x".into()).is_recoverable());
        assert!(!AssistantError::Initialization("x".into()).is_recoverable());
        assert!(!AssistantError::Config("x".into()).is_recoverable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AssistantError = io.into();
        assert!(matches!(err, AssistantError::Io(ref m) if m.contains("missing")));
    }
}
