//! Phrase tables
//!
//! All phrases are lower-case and matched as substrings of the normalized
//! transcript.

use crate::actions::Action;

pub const SLEEP: &[&str] = &["sleep", "go to sleep", "goodbye", "bye"];

pub const STOP_MODE: &[&str] = &["stop mode", "cancel mode", "exit mode", "normal mode"];

pub const LINE_TRACKING: &[&str] = &[
    "line tracking",
    "track line",
    "follow line",
    "line track",
    "follow the line",
];

pub const OBSTACLE_AVOIDANCE: &[&str] = &[
    "obstacle avoidance",
    "avoid obstacles",
    "obstacle mode",
    "avoid mode",
];

pub const HORN: &[&str] = &["honk", "horn", "beep"];

pub const ENGINE: &[&str] = &["start engine", "engine"];

pub const STATUS: &[&str] = &["status", "how are you", "what's up"];

pub const HELP: &[&str] = &["help", "what can you do", "commands"];

/// Whole-utterance stop words
pub const EXACT_STOP: &[&str] = &["stop", "halt", "freeze"];

/// Phrase to action, in table order
pub const ACTIONS: &[(&str, Action)] = &[
    ("forward", Action::Forward),
    ("go forward", Action::Forward),
    ("move forward", Action::Forward),
    ("go ahead", Action::Forward),
    ("backward", Action::Backward),
    ("go backward", Action::Backward),
    ("move backward", Action::Backward),
    ("go back", Action::Backward),
    ("reverse", Action::Backward),
    ("back up", Action::Backward),
    ("turn left", Action::TurnLeft),
    ("go left", Action::TurnLeft),
    ("left", Action::TurnLeft),
    ("turn right", Action::TurnRight),
    ("go right", Action::TurnRight),
    ("right", Action::TurnRight),
    ("stop", Action::Stop),
    ("halt", Action::Stop),
    ("freeze", Action::Stop),
    ("look left", Action::LookLeft),
    ("look right", Action::LookRight),
    ("look up", Action::LookUp),
    ("look down", Action::LookDown),
    ("look center", Action::LookCenter),
    ("center", Action::LookCenter),
    ("shake head", Action::ShakeHead),
    ("say no", Action::ShakeHead),
    ("nod", Action::Nod),
    ("say yes", Action::Nod),
    ("wave", Action::WaveHands),
    ("wave hands", Action::WaveHands),
    ("resist", Action::Resist),
    ("refuse", Action::Resist),
    ("act cute", Action::ActCute),
    ("cute", Action::ActCute),
    ("rub hands", Action::RubHands),
    ("think", Action::Think),
    ("thinking", Action::Think),
    ("twist", Action::TwistBody),
    ("twist body", Action::TwistBody),
    ("celebrate", Action::Celebrate),
    ("party", Action::Celebrate),
    ("happy", Action::Celebrate),
    ("depressed", Action::Depressed),
    ("sad", Action::Depressed),
    ("spin", Action::SpinAround),
    ("spin around", Action::SpinAround),
    ("dance", Action::Dance),
    ("patrol", Action::Patrol),
    ("reset", Action::Reset),
];

pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text.contains(p))
}
