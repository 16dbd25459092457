//! Lifecycle orchestrator for the Virtual Assistant
//!
//! Sequences initialization, start-up and shutdown of the four subsystems and
//! routes each command through parse -> execute.
//!
//! Failure rules:
//! - `initialize` stops at the first failing subsystem and reports it; nothing
//!   is rolled back and the handles of the failed attempt are discarded.
//! - `start` stops at the first failing step and leaves the state unchanged.
//!   Subsystems started before the failure keep running.
//! - `stop` attempts every step, records failures, always ends in `Stopped`,
//!   and reports the collected failures afterwards.
//! - `process_command` never fails; problems become a reply sentence.
//!
//! Lifecycle methods are serialized internally, so an `Arc<Orchestrator>` can
//! be shared between the input loop and signal handling. Commands are not
//! serialized against each other.

use crate::config::Settings;
use crate::integration::config::OrchestratorConfig;
use crate::integration::state::OrchestratorState;
use crate::subsystems::{
    ApiServer, AutomationManager, CommandParser, InboundCommand, SubsystemError, SubsystemKind,
    SubsystemProvider, VoiceProcessor,
};
use crate::{AssistantError, Result};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Prefix of every reply for a command that could not be handled
pub const COMMAND_FAILURE_PREFIX: &str = "Sorry, I couldn't process that command";

type StepResult = std::result::Result<(), SubsystemError>;
type Step = for<'a> fn(&'a Subsystems) -> BoxFuture<'a, StepResult>;

/// One handle per subsystem kind, fixed after a successful `initialize`
struct Subsystems {
    voice: Arc<dyn VoiceProcessor>,
    parser: Arc<dyn CommandParser>,
    automation: Arc<dyn AutomationManager>,
    api: Arc<dyn ApiServer>,
}

fn init_voice(s: &Subsystems) -> BoxFuture<'_, StepResult> {
    s.voice.initialize()
}
fn init_parser(s: &Subsystems) -> BoxFuture<'_, StepResult> {
    s.parser.initialize()
}
fn init_automation(s: &Subsystems) -> BoxFuture<'_, StepResult> {
    s.automation.initialize()
}
fn init_api(s: &Subsystems) -> BoxFuture<'_, StepResult> {
    s.api.initialize()
}
fn start_api(s: &Subsystems) -> BoxFuture<'_, StepResult> {
    s.api.start()
}
fn start_voice(s: &Subsystems) -> BoxFuture<'_, StepResult> {
    s.voice.start_listening()
}
fn start_automation(s: &Subsystems) -> BoxFuture<'_, StepResult> {
    s.automation.start()
}
fn stop_voice(s: &Subsystems) -> BoxFuture<'_, StepResult> {
    s.voice.stop_listening()
}
fn stop_automation(s: &Subsystems) -> BoxFuture<'_, StepResult> {
    s.automation.stop()
}
fn stop_api(s: &Subsystems) -> BoxFuture<'_, StepResult> {
    s.api.stop()
}

const INITIALIZE_SEQUENCE: [(SubsystemKind, &str, Step); 4] = [
    (SubsystemKind::VoiceProcessor, "initialize", init_voice as Step),
    (SubsystemKind::CommandParser, "initialize", init_parser as Step),
    (SubsystemKind::AutomationManager, "initialize", init_automation as Step),
    (SubsystemKind::ApiServer, "initialize", init_api as Step),
];

const START_SEQUENCE: [(SubsystemKind, &str, Step); 3] = [
    (SubsystemKind::ApiServer, "start", start_api as Step),
    (SubsystemKind::VoiceProcessor, "start_listening", start_voice as Step),
    (SubsystemKind::AutomationManager, "start", start_automation as Step),
];

const STOP_SEQUENCE: [(SubsystemKind, &str, Step); 3] = [
    (SubsystemKind::VoiceProcessor, "stop_listening", stop_voice as Step),
    (SubsystemKind::AutomationManager, "stop", stop_automation as Step),
    (SubsystemKind::ApiServer, "stop", stop_api as Step),
];

/// Await a subsystem call, giving up after `deadline`
async fn with_deadline<T, F>(
    deadline: Option<Duration>,
    subsystem: SubsystemKind,
    operation: &'static str,
    call: F,
) -> std::result::Result<T, SubsystemError>
where
    F: Future<Output = std::result::Result<T, SubsystemError>>,
{
    match deadline {
        Some(after) => tokio::time::timeout(after, call)
            .await
            .map_err(|_| SubsystemError::Timeout {
                subsystem,
                operation,
                after,
            })?,
        None => call.await,
    }
}

/// Coordinates the Virtual Assistant subsystems
pub struct Orchestrator {
    settings: Arc<Settings>,
    config: OrchestratorConfig,
    provider: Box<dyn SubsystemProvider>,
    subsystems: OnceLock<Subsystems>,
    state: RwLock<OrchestratorState>,
    lifecycle: Mutex<()>,
}

impl Orchestrator {
    /// Create an orchestrator; run options are derived from `settings`
    pub fn new(settings: Arc<Settings>, provider: impl SubsystemProvider + 'static) -> Self {
        let config = OrchestratorConfig::from_settings(&settings);
        Self {
            settings,
            config,
            provider: Box::new(provider),
            subsystems: OnceLock::new(),
            state: RwLock::new(OrchestratorState::NotInitialized),
            lifecycle: Mutex::new(()),
        }
    }

    /// Replace the run options
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.read()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Construct and initialize every subsystem
    ///
    /// Order: voice processor, command parser, automation manager, API server.
    /// May succeed only once per orchestrator.
    pub async fn initialize(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.subsystems.get().is_some() {
            warn!("{} is already initialized", self.settings.app_name);
            return Err(AssistantError::Initialization(
                "already initialized".to_string(),
            ));
        }

        info!("Initializing {}...", self.settings.app_name);

        let subsystems = Subsystems {
            voice: self.provider.voice_processor(),
            parser: self.provider.command_parser(),
            automation: self.provider.automation_manager(),
            api: self.provider.api_server(),
        };

        for (kind, operation, step) in INITIALIZE_SEQUENCE {
            if let Err(e) =
                with_deadline(self.config.subsystem_timeout, kind, operation, step(&subsystems))
                    .await
            {
                error!(subsystem = %kind, "Failed to initialize {}: {}", self.settings.app_name, e);
                return Err(AssistantError::Initialization(format!("{}: {}", kind, e)));
            }
            debug!(subsystem = %kind, "Subsystem initialized");
        }

        if self.subsystems.set(subsystems).is_err() {
            return Err(AssistantError::Initialization(
                "already initialized".to_string(),
            ));
        }
        *self.state.write() = OrchestratorState::Initialized;

        info!("{} initialized successfully", self.settings.app_name);
        Ok(())
    }

    /// Start the API server, voice listening (if enabled) and automation
    ///
    /// A no-op when already running.
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let state = self.state();
        if state.is_running() {
            warn!("{} is already running", self.settings.app_name);
            return Ok(());
        }

        let Some(subsystems) = self.subsystems.get().filter(|_| state.can_start()) else {
            warn!(%state, "Cannot start before initialization");
            return Err(AssistantError::NotInitialized);
        };

        info!("Starting {}...", self.settings.app_name);

        for (kind, operation, step) in START_SEQUENCE {
            if kind == SubsystemKind::VoiceProcessor && !self.config.enable_voice {
                info!("Voice input disabled, not starting the {}", kind);
                continue;
            }

            if let Err(e) =
                with_deadline(self.config.subsystem_timeout, kind, operation, step(subsystems))
                    .await
            {
                error!(subsystem = %kind, "Failed to start {}: {}", self.settings.app_name, e);
                return Err(AssistantError::Start(format!("{}: {}", kind, e)));
            }
            debug!(subsystem = %kind, "Subsystem started");
        }

        *self.state.write() = OrchestratorState::Running;
        info!("{} started successfully", self.settings.app_name);
        Ok(())
    }

    /// Stop voice listening, automation and the API server
    ///
    /// Best effort: every step runs even if an earlier one fails. A no-op when
    /// not running.
    pub async fn stop(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        if !self.is_running() {
            warn!("{} is not running", self.settings.app_name);
            return Ok(());
        }

        info!("Stopping {}...", self.settings.app_name);

        let mut failures = Vec::new();
        match self.subsystems.get() {
            Some(subsystems) => {
                for (kind, operation, step) in STOP_SEQUENCE {
                    match with_deadline(
                        self.config.subsystem_timeout,
                        kind,
                        operation,
                        step(subsystems),
                    )
                    .await
                    {
                        Ok(()) => debug!(subsystem = %kind, "Subsystem stopped"),
                        Err(e) => {
                            error!(subsystem = %kind, "Failed to stop: {}", e);
                            failures.push(format!("{}: {}", kind, e));
                        }
                    }
                }
            }
            None => warn!("No subsystem handles to stop"),
        }

        *self.state.write() = OrchestratorState::Stopped;

        if failures.is_empty() {
            info!("{} stopped successfully", self.settings.app_name);
            Ok(())
        } else {
            error!(
                failed_steps = failures.len(),
                "{} stopped with errors", self.settings.app_name
            );
            Err(AssistantError::Stop(failures))
        }
    }

    /// Parse and execute one command
    ///
    /// Always returns a sentence for the user: the automation result on
    /// success, or an apology carrying the reason on failure.
    pub async fn process_command(&self, command: &str) -> String {
        match self.run_pipeline(command).await {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to process command '{}': {}", command, e);
                format!("{}: {}", COMMAND_FAILURE_PREFIX, e)
            }
        }
    }

    /// Process an inbound command and deliver the result
    ///
    /// The result goes to the command's reply channel when it has one and is
    /// returned otherwise.
    pub async fn dispatch(&self, command: InboundCommand) -> Option<String> {
        debug!(
            id = %command.id,
            source = %command.source,
            received_at = %command.received_at,
            "Dispatching command"
        );

        let result = self.process_command(&command.text).await;
        match command.reply {
            Some(reply) => {
                if reply.send(result).is_err() {
                    debug!(id = %command.id, "Reply receiver went away");
                }
                None
            }
            None => Some(result),
        }
    }

    async fn run_pipeline(&self, command: &str) -> Result<String> {
        if !self.is_running() {
            return Err(AssistantError::NotRunning);
        }
        let subsystems = self.subsystems.get().ok_or(AssistantError::NotInitialized)?;
        let deadline = self.config.subsystem_timeout;

        let parsed = with_deadline(
            deadline,
            SubsystemKind::CommandParser,
            "parse",
            subsystems.parser.parse(command),
        )
        .await?;
        debug!(intent = %parsed.intent, confidence = parsed.confidence, "Command parsed");

        let result = with_deadline(
            deadline,
            SubsystemKind::AutomationManager,
            "execute",
            subsystems.automation.execute(&parsed),
        )
        .await?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::ParsedCommand;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Every call succeeds; counts provider construction calls
    #[derive(Default)]
    struct Inert {
        constructed: Arc<AtomicUsize>,
    }

    struct InertHandle;

    #[async_trait]
    impl VoiceProcessor for InertHandle {
        async fn initialize(&self) -> StepResult {
            Ok(())
        }
        async fn start_listening(&self) -> StepResult {
            Ok(())
        }
        async fn stop_listening(&self) -> StepResult {
            Ok(())
        }
    }

    #[async_trait]
    impl CommandParser for InertHandle {
        async fn initialize(&self) -> StepResult {
            Ok(())
        }
        async fn parse(&self, text: &str) -> std::result::Result<ParsedCommand, SubsystemError> {
            Ok(ParsedCommand::new("echo", text))
        }
    }

    #[async_trait]
    impl AutomationManager for InertHandle {
        async fn initialize(&self) -> StepResult {
            Ok(())
        }
        async fn start(&self) -> StepResult {
            Ok(())
        }
        async fn stop(&self) -> StepResult {
            Ok(())
        }
        async fn execute(
            &self,
            command: &ParsedCommand,
        ) -> std::result::Result<String, SubsystemError> {
            Ok(command.raw_text.clone())
        }
    }

    #[async_trait]
    impl ApiServer for InertHandle {
        async fn start(&self) -> StepResult {
            Ok(())
        }
        async fn stop(&self) -> StepResult {
            Ok(())
        }
    }

    impl SubsystemProvider for Inert {
        fn voice_processor(&self) -> Arc<dyn VoiceProcessor> {
            self.constructed.fetch_add(1, Ordering::SeqCst);
            Arc::new(InertHandle)
        }
        fn command_parser(&self) -> Arc<dyn CommandParser> {
            self.constructed.fetch_add(1, Ordering::SeqCst);
            Arc::new(InertHandle)
        }
        fn automation_manager(&self) -> Arc<dyn AutomationManager> {
            self.constructed.fetch_add(1, Ordering::SeqCst);
            Arc::new(InertHandle)
        }
        fn api_server(&self) -> Arc<dyn ApiServer> {
            self.constructed.fetch_add(1, Ordering::SeqCst);
            Arc::new(InertHandle)
        }
    }

    fn orchestrator() -> (Orchestrator, Arc<AtomicUsize>) {
        let provider = Inert::default();
        let constructed = Arc::clone(&provider.constructed);
        (
            Orchestrator::new(Arc::new(Settings::default()), provider),
            constructed,
        )
    }

    #[tokio::test]
    async fn test_with_deadline_times_out() {
        let result: std::result::Result<(), _> = with_deadline(
            Some(Duration::from_millis(10)),
            SubsystemKind::CommandParser,
            "parse",
            std::future::pending(),
        )
        .await;

        assert_eq!(
            result,
            Err(SubsystemError::Timeout {
                subsystem: SubsystemKind::CommandParser,
                operation: "parse",
                after: Duration::from_millis(10),
            })
        );
    }

    #[tokio::test]
    async fn test_with_deadline_passes_through() {
        let result = with_deadline(None, SubsystemKind::ApiServer, "start", async {
            Ok::<_, SubsystemError>(7)
        })
        .await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let (orchestrator, _) = orchestrator();
        assert_eq!(orchestrator.state(), OrchestratorState::NotInitialized);

        orchestrator.initialize().await.unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Initialized);

        orchestrator.start().await.unwrap();
        assert!(orchestrator.is_running());
        assert_eq!(orchestrator.process_command("ping").await, "ping");

        orchestrator.stop().await.unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Stopped);

        // Restart from Stopped
        orchestrator.start().await.unwrap();
        assert!(orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_second_initialize_is_rejected() {
        let (orchestrator, constructed) = orchestrator();
        orchestrator.initialize().await.unwrap();
        assert_eq!(constructed.load(Ordering::SeqCst), 4);

        let err = orchestrator.initialize().await.unwrap_err();
        assert!(matches!(err, AssistantError::Initialization(_)));
        assert_eq!(constructed.load(Ordering::SeqCst), 4);
        assert_eq!(orchestrator.state(), OrchestratorState::Initialized);
    }

    #[tokio::test]
    async fn test_start_before_initialize() {
        let (orchestrator, _) = orchestrator();
        assert_eq!(
            orchestrator.start().await.unwrap_err(),
            AssistantError::NotInitialized
        );
        assert_eq!(orchestrator.state(), OrchestratorState::NotInitialized);
    }

    #[tokio::test]
    async fn test_dispatch_prefers_reply_channel() {
        let (orchestrator, _) = orchestrator();
        orchestrator.initialize().await.unwrap();
        orchestrator.start().await.unwrap();

        let plain = InboundCommand::new("hello", crate::subsystems::CommandSource::Voice);
        assert_eq!(orchestrator.dispatch(plain).await.as_deref(), Some("hello"));

        let (with_reply, rx) =
            InboundCommand::new("over api", crate::subsystems::CommandSource::Api).with_reply();
        assert_eq!(orchestrator.dispatch(with_reply).await, None);
        assert_eq!(rx.await.unwrap(), "over api");
    }

    #[tokio::test]
    async fn test_command_while_not_running() {
        let (orchestrator, _) = orchestrator();
        let reply = orchestrator.process_command("hello").await;
        assert!(reply.starts_with(COMMAND_FAILURE_PREFIX));
        assert!(reply.contains("not running"));
    }
}
