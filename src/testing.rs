//! Test doubles shared across modules

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::feedback::{SoundCue, Speaker};
use crate::interpreter::{parse_reply, Exchange, Fallback, FallbackError, FallbackReply};

/// Speaker that remembers everything it was asked to say or play
#[derive(Debug, Default)]
pub struct RecordingSpeaker {
    lines: Mutex<Vec<String>>,
    cues: Mutex<Vec<SoundCue>>,
}

impl RecordingSpeaker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn said(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn last_said(&self) -> Option<String> {
        self.lines.lock().last().cloned()
    }

    pub fn heard_containing(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(needle))
    }

    pub fn cues(&self) -> Vec<SoundCue> {
        self.cues.lock().clone()
    }
}

impl Speaker for RecordingSpeaker {
    fn say(&self, text: &str) {
        self.lines.lock().push(text.to_string());
    }

    fn play(&self, cue: SoundCue) {
        self.cues.lock().push(cue);
    }
}

/// Fallback answering every prompt with a canned reply after a delay
pub struct ScriptedFallback {
    reply: Option<String>,
    delay: Duration,
    prompts: Mutex<Vec<(String, usize)>>,
}

impl ScriptedFallback {
    /// Reply with `raw`, parsed like a model reply
    pub fn replying(raw: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(raw.to_string()),
            delay,
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Fail every request
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Prompts received, with the number of context turns sent along
    pub fn prompts(&self) -> Vec<(String, usize)> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Fallback for ScriptedFallback {
    async fn respond(&self, text: &str, context: &[Exchange]) -> Result<FallbackReply, FallbackError> {
        self.prompts.lock().push((text.to_string(), context.len()));
        tokio::time::sleep(self.delay).await;
        match &self.reply {
            Some(raw) => Ok(parse_reply(raw)),
            None => Err(FallbackError::InvalidResponse("scripted failure".to_string())),
        }
    }
}
