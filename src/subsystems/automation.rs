//! Rule-based automation manager
//!
//! Keeps a tiny in-memory device model (the lights) and answers the intents the
//! keyword parser produces. Anything that would touch the outside world is
//! reported, not performed.

use super::{AutomationManager, ParsedCommand, SubsystemError, SubsystemKind};
use async_trait::async_trait;
use chrono::Local;
use parking_lot::Mutex;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct AutomationState {
    initialized: bool,
    started: bool,
    lights_on: bool,
    executed: u64,
}

/// Maps intents to canned actions
pub struct RuleAutomationManager {
    assistant_name: String,
    state: Mutex<AutomationState>,
}

impl RuleAutomationManager {
    pub fn new(assistant_name: impl Into<String>) -> Self {
        Self {
            assistant_name: assistant_name.into(),
            state: Mutex::new(AutomationState::default()),
        }
    }

    /// Whether the simulated lights are on
    pub fn lights_on(&self) -> bool {
        self.state.lock().lights_on
    }

    /// Number of commands executed since construction
    pub fn executed_count(&self) -> u64 {
        self.state.lock().executed
    }
}

#[async_trait]
impl AutomationManager for RuleAutomationManager {
    async fn initialize(&self) -> Result<(), SubsystemError> {
        self.state.lock().initialized = true;
        debug!("Automation manager initialized");
        Ok(())
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        let mut state = self.state.lock();
        if !state.initialized {
            return Err(SubsystemError::Initialization(
                "automation manager was never initialized".to_string(),
            ));
        }
        state.started = true;
        info!("Automation manager started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.state.lock().started = false;
        info!("Automation manager stopped");
        Ok(())
    }

    async fn execute(&self, command: &ParsedCommand) -> Result<String, SubsystemError> {
        let mut state = self.state.lock();
        if !state.started {
            return Err(SubsystemError::NotStarted(SubsystemKind::AutomationManager));
        }

        let response = match command.intent.as_str() {
            "lights_off" => {
                state.lights_on = false;
                "Lights turned off".to_string()
            }
            "lights_on" => {
                state.lights_on = true;
                "Lights turned on".to_string()
            }
            "current_time" => format!("It is {}", Local::now().format("%H:%M")),
            "open_application" => match command.entity("application") {
                Some(app) => format!("Opening {}", app),
                None => {
                    return Err(SubsystemError::Execution(
                        "no application named".to_string(),
                    ))
                }
            },
            "search_web" => match command.entity("query") {
                Some(query) => format!("Searching the web for \"{}\"", query),
                None => return Err(SubsystemError::Execution("no search query".to_string())),
            },
            "greeting" => format!("Hello! {} is listening.", self.assistant_name),
            "help" => "You can ask me to turn the lights on or off, tell the time, \
                       open an application or search the web."
                .to_string(),
            other => {
                return Err(SubsystemError::Execution(format!(
                    "no automation for intent '{}'",
                    other
                )))
            }
        };

        state.executed += 1;
        debug!(intent = %command.intent, "Automation executed");
        Ok(response)
    }
}
