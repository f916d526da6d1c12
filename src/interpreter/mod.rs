//! Command interpretation
//!
//! Turns one transcript into exactly one [`Directive`]:
//! - phrases: the static phrase tables
//! - matcher: keyword matching, longest phrase first
//! - fallback: the optional natural-language collaborator and reply parsing
//! - openai: an OpenAI-compatible fallback client

mod fallback;
mod matcher;
mod openai;
mod phrases;

use serde::{Deserialize, Serialize};

use crate::actions::{Action, AutonomousKind};
use crate::feedback::SoundCue;

pub use fallback::{parse_reply, ConversationLog, Exchange, Fallback, FallbackError, FallbackReply};
pub use matcher::CommandInterpreter;
pub use openai::OpenAiFallback;

/// Requested mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "kind", rename_all = "snake_case")]
pub enum ModeTarget {
    Sleep,
    /// Leave any autonomous mode and wait for commands
    Awake,
    Autonomous(AutonomousKind),
}

/// Spoken questions answered without moving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    Status,
    Help,
}

/// The interpreted meaning of one utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Directive {
    WakeWord,
    Action(Action),
    ModeChange(ModeTarget),
    Sound(SoundCue),
    Query(Query),
    Unrecognized(String),
}

impl std::fmt::Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Directive::WakeWord => write!(f, "wake word"),
            Directive::Action(action) => write!(f, "action {}", action),
            Directive::ModeChange(ModeTarget::Sleep) => write!(f, "sleep"),
            Directive::ModeChange(ModeTarget::Awake) => write!(f, "stop mode"),
            Directive::ModeChange(ModeTarget::Autonomous(kind)) => write!(f, "{} mode", kind),
            Directive::Sound(cue) => write!(f, "sound {:?}", cue),
            Directive::Query(query) => write!(f, "query {:?}", query),
            Directive::Unrecognized(text) => write!(f, "unrecognized {:?}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_serialization() {
        let directive = Directive::ModeChange(ModeTarget::Autonomous(AutonomousKind::LineTracking));
        let json = serde_json::to_string(&directive).unwrap();
        assert!(json.contains("mode_change"));
        assert!(json.contains("line_tracking"));
    }

    #[test]
    fn test_directive_display() {
        assert_eq!(Directive::Action(Action::TurnLeft).to_string(), "action turn left");
        assert_eq!(Directive::ModeChange(ModeTarget::Awake).to_string(), "stop mode");
    }
}
