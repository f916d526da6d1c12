//! External TTS and sound player
//!
//! Spoken lines queue up for one speech task, which runs the TTS program
//! for each line in turn so replies never talk over each other. Sound cues
//! are launched straight away. Failures are logged; speech never blocks or
//! crashes the conversation.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{SoundCue, Speaker};
use crate::config::FeedbackConfig;

/// Lines waiting to be spoken beyond this are dropped
const SPEECH_QUEUE: usize = 16;

pub struct CommandSpeaker {
    config: FeedbackConfig,
    lines: Option<mpsc::Sender<String>>,
}

impl CommandSpeaker {
    /// Must be called inside the runtime; starts the speech task
    pub fn new(config: FeedbackConfig) -> Self {
        let lines = config.tts_command.clone().map(|argv| {
            let (tx, rx) = mpsc::channel(SPEECH_QUEUE);
            tokio::spawn(speak_in_order(argv, rx));
            tx
        });
        Self { config, lines }
    }

    fn sound_path(&self, cue: SoundCue) -> PathBuf {
        let file = match cue {
            SoundCue::Horn => &self.config.horn_sound,
            SoundCue::Engine => &self.config.engine_sound,
        };
        self.config.sound_dir.join(file)
    }
}

fn command(argv: &[String], last: &str) -> Option<Command> {
    let (program, args) = argv.split_first()?;
    let mut command = Command::new(program);
    command.args(args).arg(last).stdin(Stdio::null()).stdout(Stdio::null());
    Some(command)
}

/// Speak each queued line, waiting for one to finish before the next
async fn speak_in_order(argv: Vec<String>, mut lines: mpsc::Receiver<String>) {
    let program = argv.first().cloned().unwrap_or_default();
    while let Some(text) = lines.recv().await {
        let Some(mut tts) = command(&argv, &text) else {
            return;
        };
        match tts.status().await {
            Ok(status) if !status.success() => warn!(%program, %status, "tts command failed"),
            Ok(_) => {}
            Err(e) => warn!(%program, error = %e, "failed to run tts command"),
        }
    }
    debug!("speech task stopped");
}

/// Spawn `argv + [last]` detached from the caller
fn launch(argv: &[String], last: &str) {
    let Some(mut sound) = command(argv, last) else {
        return;
    };
    let program = argv[0].clone();
    match sound.spawn() {
        Ok(mut child) => {
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) if !status.success() => warn!(%program, %status, "feedback command failed"),
                    Err(e) => warn!(%program, error = %e, "feedback command wait failed"),
                    Ok(_) => {}
                }
            });
        }
        Err(e) => warn!(%program, error = %e, "failed to spawn feedback command"),
    }
}

impl Speaker for CommandSpeaker {
    fn say(&self, text: &str) {
        info!(text, "say");
        if let Some(lines) = &self.lines {
            if lines.try_send(text.to_string()).is_err() {
                warn!(text, "speech queue full, line dropped");
            }
        }
    }

    fn play(&self, cue: SoundCue) {
        let path = self.sound_path(cue);
        if !path.exists() {
            warn!(path = %path.display(), "sound file not found");
            return;
        }
        if let Some(argv) = &self.config.sound_command {
            launch(argv, &path.to_string_lossy());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sound_path() {
        let speaker = CommandSpeaker::new(FeedbackConfig::default());
        let path = speaker.sound_path(SoundCue::Horn);
        assert!(path.ends_with("car-double-horn.wav"));
    }

    #[tokio::test]
    async fn test_missing_program_does_not_panic() {
        let config = FeedbackConfig {
            tts_command: Some(vec!["/nonexistent/tts".to_string()]),
            ..FeedbackConfig::default()
        };
        CommandSpeaker::new(config).say("hello");
    }

    #[tokio::test]
    async fn test_lines_spoken_one_at_a_time() {
        let log = std::env::temp_dir().join(format!("okay-robot-tts-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&log);
        let script = format!(
            r#"echo "start $1" >> '{0}'; sleep 0.1; echo "end $1" >> '{0}'"#,
            log.display()
        );
        let config = FeedbackConfig {
            tts_command: Some(vec!["sh".to_string(), "-c".to_string(), script, "tts".to_string()]),
            ..FeedbackConfig::default()
        };
        let speaker = CommandSpeaker::new(config);
        speaker.say("Stopped!");
        speaker.say("Autonomous mode stopped.");

        let mut lines = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            lines = std::fs::read_to_string(&log)
                .unwrap_or_default()
                .lines()
                .map(String::from)
                .collect();
            if lines.len() == 4 {
                break;
            }
        }
        let _ = std::fs::remove_file(&log);

        assert_eq!(
            lines,
            vec![
                "start Stopped!",
                "end Stopped!",
                "start Autonomous mode stopped.",
                "end Autonomous mode stopped.",
            ]
        );
    }
}
