//! Virtual Assistant - voice and API driven desktop automation
//!
//! The crate is organised around a lifecycle [`Orchestrator`] that owns one
//! handle per subsystem (voice processor, command parser, automation manager,
//! API server) and routes every command through parse -> execute.

pub mod config;
pub mod error;
pub mod integration;
pub mod logging;
pub mod setup;
pub mod subsystems;

pub use config::{ConfigManager, Environment, Settings};
pub use error::{AssistantError, Result};
pub use integration::{Orchestrator, OrchestratorConfig, OrchestratorState};
