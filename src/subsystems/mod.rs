//! Subsystem contracts coordinated by the orchestrator
//!
//! The orchestrator never implements voice capture, parsing, automation or
//! serving itself. It reaches each capability through one of the traits below
//! and holds a single shared handle per kind.
//!
//! Built-in implementations live in the child modules and are wired together
//! by [`DefaultSubsystems`].

mod api;
mod automation;
mod parser;
mod voice;

pub use api::TcpApiServer;
pub use automation::RuleAutomationManager;
pub use parser::KeywordCommandParser;
pub use voice::StdinVoiceProcessor;

use crate::config::Settings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Errors raised by subsystem handles
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubsystemError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("{0} is not started")]
    NotStarted(SubsystemKind),

    #[error("{subsystem} {operation} timed out after {after:?}")]
    Timeout {
        subsystem: SubsystemKind,
        operation: &'static str,
        after: Duration,
    },
}

impl From<std::io::Error> for SubsystemError {
    fn from(e: std::io::Error) -> Self {
        SubsystemError::Io(e.to_string())
    }
}

/// The four capabilities the orchestrator coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubsystemKind {
    VoiceProcessor,
    CommandParser,
    AutomationManager,
    ApiServer,
}

impl std::fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubsystemKind::VoiceProcessor => write!(f, "voice processor"),
            SubsystemKind::CommandParser => write!(f, "command parser"),
            SubsystemKind::AutomationManager => write!(f, "automation manager"),
            SubsystemKind::ApiServer => write!(f, "API server"),
        }
    }
}

/// Structured intent produced from a natural-language command
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedCommand {
    /// Intent name, e.g. `lights_off`
    pub intent: String,
    /// Named values pulled out of the phrase
    pub entities: BTreeMap<String, String>,
    /// The text the intent was parsed from
    pub raw_text: String,
    /// Parser confidence in `[0, 1]`
    pub confidence: f32,
}

impl ParsedCommand {
    pub fn new(intent: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            entities: BTreeMap::new(),
            raw_text: raw_text.into(),
            confidence: 1.0,
        }
    }

    pub fn with_entity(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entities.insert(key.into(), value.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn entity(&self, key: &str) -> Option<&str> {
        self.entities.get(key).map(String::as_str)
    }
}

/// Where an inbound command came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandSource {
    Voice,
    Api,
}

impl std::fmt::Display for CommandSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandSource::Voice => write!(f, "voice"),
            CommandSource::Api => write!(f, "api"),
        }
    }
}

/// A natural-language command waiting to be processed
///
/// When `reply` is set, the result is delivered back through the channel the
/// command arrived on.
#[derive(Debug)]
pub struct InboundCommand {
    pub id: Uuid,
    pub text: String,
    pub received_at: DateTime<Utc>,
    pub source: CommandSource,
    pub reply: Option<oneshot::Sender<String>>,
}

impl InboundCommand {
    pub fn new(text: impl Into<String>, source: CommandSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            received_at: Utc::now(),
            source,
            reply: None,
        }
    }

    /// Attach a reply channel, returning the receiving half
    pub fn with_reply(mut self) -> (Self, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        self.reply = Some(tx);
        (self, rx)
    }
}

/// Sender half of the inbound command queue shared by voice and API input
pub type CommandSender = mpsc::Sender<InboundCommand>;

/// Captures speech and turns it into inbound commands
#[async_trait]
pub trait VoiceProcessor: Send + Sync {
    async fn initialize(&self) -> Result<(), SubsystemError>;
    async fn start_listening(&self) -> Result<(), SubsystemError>;
    async fn stop_listening(&self) -> Result<(), SubsystemError>;
}

/// Turns command text into a [`ParsedCommand`]
#[async_trait]
pub trait CommandParser: Send + Sync {
    async fn initialize(&self) -> Result<(), SubsystemError>;
    async fn parse(&self, text: &str) -> Result<ParsedCommand, SubsystemError>;
}

/// Carries out parsed commands
#[async_trait]
pub trait AutomationManager: Send + Sync {
    async fn initialize(&self) -> Result<(), SubsystemError>;
    async fn start(&self) -> Result<(), SubsystemError>;
    async fn stop(&self) -> Result<(), SubsystemError>;
    async fn execute(&self, command: &ParsedCommand) -> Result<String, SubsystemError>;
}

/// Accepts commands from remote clients
#[async_trait]
pub trait ApiServer: Send + Sync {
    /// Servers are ready after construction unless they say otherwise
    async fn initialize(&self) -> Result<(), SubsystemError> {
        Ok(())
    }
    async fn start(&self) -> Result<(), SubsystemError>;
    async fn stop(&self) -> Result<(), SubsystemError>;
}

/// Constructs one handle of each subsystem kind
///
/// Called by the orchestrator during `initialize`; each successful
/// initialization keeps the handles it was given for the rest of the process.
pub trait SubsystemProvider: Send + Sync {
    fn voice_processor(&self) -> Arc<dyn VoiceProcessor>;
    fn command_parser(&self) -> Arc<dyn CommandParser>;
    fn automation_manager(&self) -> Arc<dyn AutomationManager>;
    fn api_server(&self) -> Arc<dyn ApiServer>;
}

/// Provider for the built-in subsystems
pub struct DefaultSubsystems {
    settings: Arc<Settings>,
    commands: CommandSender,
}

impl DefaultSubsystems {
    /// Voice and API input are delivered to `commands`
    pub fn new(settings: Arc<Settings>, commands: CommandSender) -> Self {
        Self { settings, commands }
    }
}

impl SubsystemProvider for DefaultSubsystems {
    fn voice_processor(&self) -> Arc<dyn VoiceProcessor> {
        Arc::new(StdinVoiceProcessor::new(
            self.settings.wake_word.clone(),
            self.commands.clone(),
        ))
    }

    fn command_parser(&self) -> Arc<dyn CommandParser> {
        Arc::new(KeywordCommandParser::new())
    }

    fn automation_manager(&self) -> Arc<dyn AutomationManager> {
        Arc::new(RuleAutomationManager::new(self.settings.app_name.clone()))
    }

    fn api_server(&self) -> Arc<dyn ApiServer> {
        Arc::new(TcpApiServer::new(
            self.settings.api_host.clone(),
            self.settings.api_port,
            self.commands.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_command_builder() {
        let cmd = ParsedCommand::new("open_application", "open firefox")
            .with_entity("application", "firefox")
            .with_confidence(1.7);

        assert_eq!(cmd.entity("application"), Some("firefox"));
        assert_eq!(cmd.confidence, 1.0);
        assert_eq!(cmd.entity("missing"), None);
    }

    #[test]
    fn test_timeout_display() {
        let err = SubsystemError::Timeout {
            subsystem: SubsystemKind::ApiServer,
            operation: "start",
            after: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "API server start timed out after 250ms");
    }

    #[tokio::test]
    async fn test_inbound_reply_channel() {
        let (cmd, rx) = InboundCommand::new("hello", CommandSource::Api).with_reply();
        assert_eq!(cmd.source, CommandSource::Api);

        cmd.reply.expect("reply attached").send("hi".to_string()).unwrap();
        assert_eq!(rx.await.unwrap(), "hi");
    }
}
