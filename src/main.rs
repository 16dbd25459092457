//! Virtual Assistant command-line front end

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, warn};
use virtual_assistant::config::ConfigManager;
use virtual_assistant::integration::run_until_shutdown;
use virtual_assistant::logging::setup_logging;
use virtual_assistant::subsystems::{DefaultSubsystems, InboundCommand};
use virtual_assistant::{Orchestrator, OrchestratorConfig, Settings};

/// Virtual Assistant CLI
#[derive(Parser, Debug)]
#[command(name = "virtual-assistant", version)]
#[command(about = "Voice and API driven desktop assistant")]
struct Cli {
    /// Enable debug mode
    #[arg(long, global = true)]
    debug: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the Virtual Assistant
    Start {
        /// Start with GUI
        #[arg(long)]
        gui: bool,

        /// Disable voice processing
        #[arg(long)]
        no_voice: bool,
    },
    /// Setup the Virtual Assistant for first-time use
    Setup,
    /// Print the resolved configuration
    Config,
}

const COMMAND_QUEUE_SIZE: usize = 100;

/// Grace period for runtime tasks after the assistant has stopped
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut manager = ConfigManager::load(cli.config.clone()).context("loading configuration")?;
    if cli.debug {
        manager.settings_mut().enable_debug();
    }

    let _logging = setup_logging(&manager.settings().log_level, &manager.settings().log_file)
        .context("setting up logging")?;
    manager.log_summary();
    let settings = manager.into_settings();

    match cli.command {
        Command::Start { gui, no_voice } => {
            let runtime = tokio::runtime::Runtime::new().context("creating async runtime")?;
            let outcome = runtime.block_on(run(settings, gui, no_voice));
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
            outcome
        }
        Command::Setup => {
            let root = std::env::current_dir()?;
            let report = virtual_assistant::setup::run_setup(&root)?;
            println!(
                "Setup complete: {} directories created, {} config files written",
                report.created_dirs.len(),
                report.written_configs.len()
            );
            Ok(())
        }
        Command::Config => {
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

async fn run(settings: Settings, gui: bool, no_voice: bool) -> Result<()> {
    let settings = Arc::new(settings);
    let (command_tx, mut command_rx) = mpsc::channel::<InboundCommand>(COMMAND_QUEUE_SIZE);

    let mut config = OrchestratorConfig::from_settings(&settings);
    if gui {
        config = config.with_gui();
    }
    if no_voice {
        config = config.without_voice();
    }

    let provider = DefaultSubsystems::new(Arc::clone(&settings), command_tx);
    let assistant = Arc::new(Orchestrator::new(Arc::clone(&settings), provider).with_config(config));

    let outcome = serve(&assistant, &mut command_rx).await;
    if let Err(e) = &outcome {
        error!("Application error: {:#}", e);
    }

    if let Err(e) = assistant.stop().await {
        error!("{}", e);
    }

    outcome
}

async fn serve(
    assistant: &Arc<Orchestrator>,
    commands: &mut mpsc::Receiver<InboundCommand>,
) -> Result<()> {
    assistant.initialize().await?;

    if assistant.config().enable_gui {
        warn!("The GUI front end is not part of this build; continuing headless");
    }

    assistant.start().await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Listening for shutdown signal failed: {}", e);
        }
    };
    run_until_shutdown(Arc::clone(assistant), commands, shutdown, |reply| {
        println!("{}", reply)
    })
    .await;

    Ok(())
}
