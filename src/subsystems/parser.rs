//! Keyword-based command parser
//!
//! Matches lower-cased input against a fixed phrase table. Good enough to drive
//! the built-in automation rules; a real NLP backend plugs in through
//! [`CommandParser`].

use super::{CommandParser, ParsedCommand, SubsystemError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// How a rule decides whether it applies
#[derive(Clone, Copy, Debug)]
enum Match {
    /// Phrase appears anywhere in the text
    Contains,
    /// Text starts with the phrase; the remainder becomes an entity
    Prefix { entity: &'static str },
}

struct Rule {
    intent: &'static str,
    phrases: &'static [&'static str],
    matcher: Match,
}

const RULES: &[Rule] = &[
    Rule {
        intent: "lights_off",
        phrases: &["turn off lights", "turn off the lights", "lights off"],
        matcher: Match::Contains,
    },
    Rule {
        intent: "lights_on",
        phrases: &["turn on lights", "turn on the lights", "lights on"],
        matcher: Match::Contains,
    },
    Rule {
        intent: "current_time",
        phrases: &["what time is it", "current time", "tell me the time"],
        matcher: Match::Contains,
    },
    Rule {
        intent: "open_application",
        phrases: &["open ", "launch ", "start "],
        matcher: Match::Prefix {
            entity: "application",
        },
    },
    Rule {
        intent: "search_web",
        phrases: &["search for ", "look up ", "google "],
        matcher: Match::Prefix { entity: "query" },
    },
    Rule {
        intent: "help",
        phrases: &["help", "what can you do"],
        matcher: Match::Contains,
    },
    Rule {
        intent: "greeting",
        phrases: &["hello", "good morning", "good evening"],
        matcher: Match::Contains,
    },
];

/// Rule-table parser
pub struct KeywordCommandParser {
    ready: AtomicBool,
}

impl KeywordCommandParser {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
        }
    }

    fn normalize(text: &str) -> String {
        text.trim()
            .trim_end_matches(['.', '!', '?'])
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    fn match_rules(text: &str) -> Option<ParsedCommand> {
        for rule in RULES {
            for phrase in rule.phrases {
                match rule.matcher {
                    Match::Contains if text.contains(phrase) => {
                        return Some(ParsedCommand::new(rule.intent, text));
                    }
                    Match::Prefix { entity } => {
                        if let Some(rest) = text.strip_prefix(phrase) {
                            let rest = rest.trim();
                            if !rest.is_empty() {
                                return Some(
                                    ParsedCommand::new(rule.intent, text)
                                        .with_entity(entity, rest),
                                );
                            }
                        }
                    }
                    Match::Contains => {}
                }
            }
        }
        None
    }
}

impl Default for KeywordCommandParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandParser for KeywordCommandParser {
    async fn initialize(&self) -> Result<(), SubsystemError> {
        self.ready.store(true, Ordering::SeqCst);
        debug!("Keyword parser ready with {} rules", RULES.len());
        Ok(())
    }

    async fn parse(&self, text: &str) -> Result<ParsedCommand, SubsystemError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(SubsystemError::Parse("parser is not initialized".to_string()));
        }

        let normalized = Self::normalize(text);
        if normalized.is_empty() {
            return Err(SubsystemError::Parse("empty command".to_string()));
        }

        Self::match_rules(&normalized)
            .ok_or_else(|| SubsystemError::Parse("unrecognized phrase".to_string()))
    }
}
