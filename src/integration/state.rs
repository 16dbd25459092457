//! Orchestrator lifecycle state

/// Where the orchestrator is in its lifecycle
///
/// ```text
/// NotInitialized --initialize--> Initialized --start--> Running
///                                                 ^         |
///                                                 |       stop
///                                               start       |
///                                                 |         v
///                                                 +------ Stopped
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrchestratorState {
    #[default]
    NotInitialized,
    Initialized,
    Running,
    Stopped,
}

impl OrchestratorState {
    /// Check if `start` may run from here
    pub fn can_start(&self) -> bool {
        matches!(self, OrchestratorState::Initialized | OrchestratorState::Stopped)
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        matches!(self, OrchestratorState::Running)
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestratorState::NotInitialized => write!(f, "NotInitialized"),
            OrchestratorState::Initialized => write!(f, "Initialized"),
            OrchestratorState::Running => write!(f, "Running"),
            OrchestratorState::Stopped => write!(f, "Stopped"),
        }
    }
}
