//! Command loop that feeds inbound commands to a running orchestrator

use super::Orchestrator;
use crate::subsystems::InboundCommand;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// How often the loop re-checks the running flag
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Dispatch inbound commands until `shutdown` resolves or the assistant stops
///
/// Each command runs in its own task so a slow subsystem never delays the
/// shutdown arm or the commands queued behind it. Replies that have no
/// reply channel are handed to `on_reply`. Commands still in flight when the
/// loop ends are aborted.
pub async fn run_until_shutdown<S, R>(
    assistant: Arc<Orchestrator>,
    commands: &mut mpsc::Receiver<InboundCommand>,
    shutdown: S,
    on_reply: R,
) where
    S: Future<Output = ()>,
    R: Fn(String) + Send + Sync + 'static,
{
    let on_reply = Arc::new(on_reply);
    let mut in_flight = JoinSet::new();
    let mut poll = tokio::time::interval(POLL_INTERVAL);
    tokio::pin!(shutdown);

    while assistant.is_running() {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Received shutdown signal");
                break;
            }
            Some(command) = commands.recv() => {
                let assistant = Arc::clone(&assistant);
                let on_reply = Arc::clone(&on_reply);
                in_flight.spawn(async move {
                    if let Some(reply) = assistant.dispatch(command).await {
                        on_reply(reply);
                    }
                });
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            _ = poll.tick() => {}
        }
    }

    if !in_flight.is_empty() {
        debug!(pending = in_flight.len(), "Abandoning in-flight commands");
        in_flight.shutdown().await;
    }
}
