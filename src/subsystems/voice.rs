//! Console stand-in for the voice processor
//!
//! Each line typed on stdin is treated as one transcribed utterance. With a wake
//! word configured, only utterances that begin with it are forwarded.
//!
//! Stdin is read on a dedicated OS thread. A blocking read cannot be cancelled,
//! so stopping only clears the listening flag; the thread drops whatever it
//! reads afterwards and never holds up process exit.

use super::{CommandSender, CommandSource, InboundCommand, SubsystemError, VoiceProcessor};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

pub struct StdinVoiceProcessor {
    wake_word: String,
    commands: CommandSender,
    initialized: AtomicBool,
    listening: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StdinVoiceProcessor {
    pub fn new(wake_word: impl Into<String>, commands: CommandSender) -> Self {
        Self {
            wake_word: wake_word.into().trim().to_lowercase(),
            commands,
            initialized: AtomicBool::new(false),
            listening: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
        }
    }

    /// Check if utterances are currently being forwarded
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
            && self
                .reader
                .lock()
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }
}

/// Strip the wake word from an utterance, or reject it if absent
///
/// The wake word must end at a word boundary. An empty wake word accepts every
/// non-empty utterance.
fn strip_wake_word<'a>(utterance: &'a str, wake_word: &str) -> Option<&'a str> {
    let utterance = utterance.trim();
    if wake_word.is_empty() {
        return (!utterance.is_empty()).then_some(utterance);
    }

    let head = utterance.get(..wake_word.len())?;
    if !head.eq_ignore_ascii_case(wake_word) {
        return None;
    }
    let tail = &utterance[wake_word.len()..];
    if tail
        .chars()
        .next()
        .is_some_and(|c| !(c.is_whitespace() || c.is_ascii_punctuation()))
    {
        return None;
    }
    let rest = tail
        .trim_start_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .trim();
    (!rest.is_empty()).then_some(rest)
}

/// Forward utterances from `reader` until EOF or the receiver goes away
///
/// Lines read while `listening` is cleared are discarded. Blocks the calling
/// thread.
fn forward_utterances<R>(
    reader: R,
    wake_word: &str,
    commands: &CommandSender,
    listening: &AtomicBool,
) where
    R: BufRead,
{
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Voice input error: {}", e);
                return;
            }
        };
        if !listening.load(Ordering::SeqCst) {
            debug!("Not listening, dropping utterance");
            continue;
        }
        let Some(text) = strip_wake_word(&line, wake_word) else {
            debug!("Ignoring utterance without wake word");
            continue;
        };
        if commands
            .blocking_send(InboundCommand::new(text, CommandSource::Voice))
            .is_err()
        {
            debug!("Command queue closed, voice listener exiting");
            return;
        }
    }
    info!("Voice input reached end of stream");
}

#[async_trait]
impl VoiceProcessor for StdinVoiceProcessor {
    async fn initialize(&self) -> Result<(), SubsystemError> {
        self.initialized.store(true, Ordering::SeqCst);
        debug!(wake_word = %self.wake_word, "Voice processor initialized");
        Ok(())
    }

    async fn start_listening(&self) -> Result<(), SubsystemError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(SubsystemError::Initialization(
                "voice processor was never initialized".to_string(),
            ));
        }

        self.listening.store(true, Ordering::SeqCst);
        let mut reader = self.reader.lock();
        if reader.as_ref().is_some_and(|h| !h.is_finished()) {
            info!("Resumed listening for voice commands");
            return Ok(());
        }

        let wake_word = self.wake_word.clone();
        let commands = self.commands.clone();
        let listening = Arc::clone(&self.listening);
        let handle = std::thread::Builder::new()
            .name("voice-stdin".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                forward_utterances(stdin.lock(), &wake_word, &commands, &listening);
            })
            .inspect_err(|_| self.listening.store(false, Ordering::SeqCst))?;
        *reader = Some(handle);
        info!("Listening for voice commands on stdin");
        Ok(())
    }

    async fn stop_listening(&self) -> Result<(), SubsystemError> {
        if self.listening.swap(false, Ordering::SeqCst) {
            info!("Stopped listening");
        }
        Ok(())
    }
}
