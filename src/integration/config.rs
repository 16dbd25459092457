//! Configuration for the integration layer
//!
//! Controls which front ends take part in a run and how long the orchestrator
//! waits on any single subsystem call.

use crate::config::Settings;
use std::time::Duration;

/// Orchestrator run options
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Whether `start` begins voice listening
    pub enable_voice: bool,

    /// Whether a GUI front end was requested
    pub enable_gui: bool,

    /// Deadline for each subsystem call
    pub subsystem_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enable_voice: true,
            enable_gui: false,
            subsystem_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl OrchestratorConfig {
    /// Derive run options from resolved settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            subsystem_timeout: settings.subsystem_timeout(),
            ..Self::default()
        }
    }

    /// Skip the voice start step (text/API only)
    pub fn without_voice(mut self) -> Self {
        self.enable_voice = false;
        self
    }

    /// Request the GUI front end
    pub fn with_gui(mut self) -> Self {
        self.enable_gui = true;
        self
    }

    /// Set the per-call deadline; `None` waits forever
    pub fn with_subsystem_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.subsystem_timeout = timeout;
        self
    }
}
