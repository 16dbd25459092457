//! Orchestration layer
//!
//! Connects the subsystems of the Virtual Assistant and owns their lifecycle:
//! initialize -> start -> (commands) -> stop.

mod config;
mod orchestrator;
mod runner;
mod state;

pub use config::OrchestratorConfig;
pub use orchestrator::{Orchestrator, COMMAND_FAILURE_PREFIX};
pub use runner::{run_until_shutdown, POLL_INTERVAL};
pub use state::OrchestratorState;
