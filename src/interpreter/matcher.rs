//! Keyword matcher
//!
//! Case-insensitive substring matching. Wake phrases are checked on their
//! own table first; non-action directives come next; the action table is
//! searched longest phrase first so "turn left" beats "left".

use tracing::debug;

use super::phrases::{self, contains_any};
use super::{Directive, ModeTarget, Query};
use crate::actions::{Action, AutonomousKind};
use crate::config::Config;
use crate::feedback::SoundCue;

/// Maps transcripts to directives
#[derive(Debug, Clone)]
pub struct CommandInterpreter {
    wake_phrases: Vec<String>,
    /// Action phrases, longest first, table order among equals
    actions: Vec<(&'static str, Action)>,
}

impl CommandInterpreter {
    pub fn new(config: &Config) -> Self {
        let wake_phrases = config
            .wake
            .phrases
            .iter()
            .map(|p| normalize(p))
            .filter(|p| !p.is_empty())
            .collect();

        let mut actions = phrases::ACTIONS.to_vec();
        // stable sort keeps table order for equal lengths
        actions.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            wake_phrases,
            actions,
        }
    }

    /// Whether the transcript contains a wake phrase
    pub fn is_wake_phrase(&self, text: &str) -> bool {
        let text = normalize(text);
        self.wake_phrases.iter().any(|p| text.contains(p.as_str()))
    }

    /// Interpret one transcript
    pub fn interpret(&self, text: &str) -> Directive {
        let text = normalize(text);
        let directive = self.match_text(&text);
        debug!(%text, %directive, "interpreted");
        directive
    }

    fn match_text(&self, text: &str) -> Directive {
        if text.is_empty() {
            return Directive::Unrecognized(String::new());
        }
        if self.wake_phrases.iter().any(|p| text.contains(p.as_str())) {
            return Directive::WakeWord;
        }
        if contains_any(text, phrases::SLEEP) {
            return Directive::ModeChange(ModeTarget::Sleep);
        }
        if contains_any(text, phrases::STOP_MODE) {
            return Directive::ModeChange(ModeTarget::Awake);
        }
        if contains_any(text, phrases::LINE_TRACKING) {
            return Directive::ModeChange(ModeTarget::Autonomous(AutonomousKind::LineTracking));
        }
        if contains_any(text, phrases::OBSTACLE_AVOIDANCE) {
            return Directive::ModeChange(ModeTarget::Autonomous(AutonomousKind::ObstacleAvoidance));
        }
        if contains_any(text, phrases::HORN) {
            return Directive::Sound(SoundCue::Horn);
        }
        if contains_any(text, phrases::ENGINE) {
            return Directive::Sound(SoundCue::Engine);
        }
        if contains_any(text, phrases::STATUS) {
            return Directive::Query(Query::Status);
        }
        if contains_any(text, phrases::HELP) {
            return Directive::Query(Query::Help);
        }
        if phrases::EXACT_STOP.contains(&text) {
            return Directive::Action(Action::Stop);
        }

        self.actions
            .iter()
            .find(|(phrase, _)| text.contains(phrase))
            .map(|&(_, action)| Directive::Action(action))
            .unwrap_or_else(|| Directive::Unrecognized(text.to_string()))
    }
}

/// Lower-case, drop punctuation other than apostrophes, collapse whitespace
fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
