//! Speech feedback and sound cues
//!
//! Fire-and-forget from the controller's point of view: `say` may return
//! before the audio finishes playing.

mod command;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::FeedbackConfig;

pub use command::CommandSpeaker;

/// Short sound effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCue {
    Horn,
    Engine,
}

/// Speech-feedback collaborator
pub trait Speaker: Send + Sync {
    fn say(&self, text: &str);

    fn play(&self, cue: SoundCue);
}

/// Logs what would be spoken; used when no TTS command is configured
#[derive(Debug, Default)]
pub struct LogSpeaker;

impl Speaker for LogSpeaker {
    fn say(&self, text: &str) {
        info!(text, "say");
    }

    fn play(&self, cue: SoundCue) {
        info!(?cue, "sound");
    }
}

/// Pick a speaker for the configuration
pub fn speaker_for(config: &FeedbackConfig) -> Arc<dyn Speaker> {
    if config.tts_command.is_some() || config.sound_command.is_some() {
        Arc::new(CommandSpeaker::new(config.clone()))
    } else {
        Arc::new(LogSpeaker)
    }
}
