//! Natural-language fallback
//!
//! Consulted for transcripts the keyword matcher does not recognize. A
//! reply is text to speak plus the recognized directives named on an
//! `ACTIONS:` line, in the order given.

use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::debug;

use super::{Directive, ModeTarget};
use crate::actions::{Action, AutonomousKind};

/// Errors from the fallback collaborator
#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    #[error("no API key configured")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no reply within {0:?}")]
    Timeout(std::time::Duration),
}

/// One earlier exchange, sent along as context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: String,
    pub reply: String,
}

/// Bounded history of fallback exchanges, oldest first
#[derive(Debug, Clone)]
pub struct ConversationLog {
    capacity: usize,
    exchanges: VecDeque<Exchange>,
}

impl ConversationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            exchanges: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, user: impl Into<String>, reply: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.exchanges.len() == self.capacity {
            self.exchanges.pop_front();
        }
        self.exchanges.push_back(Exchange {
            user: user.into(),
            reply: reply.into(),
        });
    }

    pub fn recent(&self) -> Vec<Exchange> {
        self.exchanges.iter().cloned().collect()
    }
}

/// What the fallback wants said and done
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FallbackReply {
    pub speech: String,
    /// Recognized `ACTIONS:` names, in order
    pub directives: Vec<Directive>,
}

/// Optional natural-language collaborator
#[async_trait]
pub trait Fallback: Send + Sync {
    async fn respond(&self, text: &str, context: &[Exchange]) -> Result<FallbackReply, FallbackError>;
}

/// Split a raw model reply into speech and directives
///
/// An `ACTIONS:` marker (any case, at line start or trailing the speech)
/// introduces comma-separated names. Names that are neither an action nor
/// an autonomous mode are skipped.
pub fn parse_reply(raw: &str) -> FallbackReply {
    let mut speech = Vec::new();
    let mut directives = Vec::new();

    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (text, list) = split_actions(line);
        if !text.is_empty() {
            speech.push(text);
        }
        let Some(list) = list else { continue };
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match directive_for_name(name) {
                Some(directive) => directives.push(directive),
                None => debug!(name, "fallback named an unknown action"),
            }
        }
    }

    FallbackReply {
        speech: speech.join(" "),
        directives,
    }
}

const MARKER: &str = "actions:";

fn split_actions(line: &str) -> (&str, Option<&str>) {
    // ASCII lower-casing keeps byte offsets intact
    match line.to_ascii_lowercase().find(MARKER) {
        Some(at) => (line[..at].trim(), Some(line[at + MARKER.len()..].trim())),
        None => (line, None),
    }
}

fn directive_for_name(name: &str) -> Option<Directive> {
    let name = name.trim().to_lowercase().replace('_', " ");
    match name.as_str() {
        "line track" | "line tracking" => Some(Directive::ModeChange(ModeTarget::Autonomous(
            AutonomousKind::LineTracking,
        ))),
        "obstacle avoid" | "obstacle avoidance" => Some(Directive::ModeChange(ModeTarget::Autonomous(
            AutonomousKind::ObstacleAvoidance,
        ))),
        _ => Action::from_name(&name).map(Directive::Action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_speech_and_action() {
        let reply = parse_reply("Sure, turning left now!\nACTIONS: turn_left, nod");
        assert_eq!(reply.speech, "Sure, turning left now!");
        assert_eq!(
            reply.directives,
            vec![Directive::Action(Action::TurnLeft), Directive::Action(Action::Nod)]
        );
    }

    #[test]
    fn test_parse_skips_unknown_names() {
        let reply = parse_reply("Wheee\nactions: moonwalk, spin_around");
        assert_eq!(reply.directives, vec![Directive::Action(Action::SpinAround)]);
    }

    #[test]
    fn test_parse_mode_name() {
        let reply = parse_reply("On it.\nACTIONS: obstacle_avoid");
        assert_eq!(
            reply.directives,
            vec![Directive::ModeChange(ModeTarget::Autonomous(AutonomousKind::ObstacleAvoidance))]
        );
    }

    #[test]
    fn test_parse_inline_marker() {
        let reply = parse_reply("Sure, turning left now! ACTIONS: turn_left");
        assert_eq!(reply.speech, "Sure, turning left now!");
        assert_eq!(reply.directives, vec![Directive::Action(Action::TurnLeft)]);
    }

    #[test]
    fn test_parse_plain_text() {
        let reply = parse_reply("I am a small robot.\nI like driving around.");
        assert_eq!(reply.speech, "I am a small robot. I like driving around.");
        assert!(reply.directives.is_empty());
    }

    #[test]
    fn test_conversation_log_is_bounded() {
        let mut log = ConversationLog::new(2);
        log.push("a", "1");
        log.push("b", "2");
        log.push("c", "3");
        let recent = log.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].user, "b");
        assert_eq!(recent[1].reply, "3");
    }
}
