//! Configuration loading and management
//!
//! One immutable [`Config`] is built at startup from defaults, an optional
//! TOML file and a few environment overrides, then shared by reference.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "OKAY_ROBOT_CONFIG";

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name the robot introduces itself with
    pub robot_name: String,

    /// Wake phrases and the idle timeout
    pub wake: WakeConfig,

    /// Speeds, angles and durations used by the action routines
    pub motion: MotionConfig,

    /// Proximity and drop-off monitoring
    pub hazard: HazardConfig,

    /// Line tracking mode tuning
    pub line_tracking: LineTrackingConfig,

    /// Optional natural-language fallback
    pub fallback: FallbackConfig,

    /// Speech feedback and sound cues
    pub feedback: FeedbackConfig,

    /// Actuator backend selection
    pub hardware: HardwareConfig,

    /// Where transcripts come from
    pub speech: SpeechConfig,

    /// Local keyboard control
    pub keyboard: KeyboardConfig,

    /// Upper bound for bringing the robot to rest on shutdown
    pub shutdown_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    pub phrases: Vec<String>,
    /// Seconds of silence before going back to sleep
    pub command_timeout_secs: u64,
    /// Nod after the wake greeting
    pub nod_on_wake: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Drive speed for moves, 0-100
    pub speed: i16,
    pub move_duration_ms: u64,
    /// Steering angle for turns, in degrees
    pub turn_angle: i16,
    /// Camera pan used by look left/right
    pub pan_angle: i16,
    /// Camera tilt used by look up/down
    pub tilt_angle: i16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HazardConfig {
    pub poll_interval_ms: u64,
    /// Minimum spacing between repeated CRITICAL signals for a held condition
    pub critical_reassert_ms: u64,
    pub obstacle_enabled: bool,
    pub cliff_enabled: bool,
    /// Distances in centimetres
    pub safe_distance: f64,
    pub danger_distance: f64,
    pub too_close_distance: f64,
    /// Grayscale values at or below these mean a drop-off
    pub cliff_reference: [u16; 3],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LineTrackingConfig {
    pub speed: i16,
    /// Steering correction in degrees
    pub offset: i16,
    /// Grayscale values at or below these mean the sensor sees the line
    pub line_reference: [u16; 3],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Number of recent exchanges sent along as context
    pub context_turns: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// TTS program and arguments; the text is appended as the last argument.
    /// `None` logs speech instead of playing it.
    pub tts_command: Option<Vec<String>>,
    /// Sound player program and arguments; the file path is appended
    pub sound_command: Option<Vec<String>>,
    pub sound_dir: PathBuf,
    pub horn_sound: String,
    pub engine_sound: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareBackend {
    /// In-process simulated car
    Sim,
    /// Helper process speaking the bridge protocol over stdio
    Bridge,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub backend: HardwareBackend,
    pub bridge_command: Vec<String>,
    /// Longest a single bridge request may take before the bridge is declared down
    pub call_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Transcriber program and arguments, one transcript per stdout line.
    /// `None` reads transcripts from stdin.
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            robot_name: "Robot".to_string(),
            wake: WakeConfig::default(),
            motion: MotionConfig::default(),
            hazard: HazardConfig::default(),
            line_tracking: LineTrackingConfig::default(),
            fallback: FallbackConfig::default(),
            feedback: FeedbackConfig::default(),
            hardware: HardwareConfig::default(),
            speech: SpeechConfig::default(),
            keyboard: KeyboardConfig::default(),
            shutdown_timeout_ms: 2000,
        }
    }
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            phrases: vec![
                "okay robot".to_string(),
                "ok robot".to_string(),
                "hey robot".to_string(),
            ],
            command_timeout_secs: 30,
            nod_on_wake: true,
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            speed: 30,
            move_duration_ms: 1000,
            turn_angle: 25,
            pan_angle: 60,
            tilt_angle: 30,
        }
    }
}

impl Default for HazardConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            critical_reassert_ms: 1000,
            obstacle_enabled: true,
            cliff_enabled: true,
            safe_distance: 40.0,
            danger_distance: 20.0,
            too_close_distance: 10.0,
            cliff_reference: [200, 200, 200],
        }
    }
}

impl Default for LineTrackingConfig {
    fn default() -> Self {
        Self {
            speed: 10,
            offset: 20,
            line_reference: [1000, 1000, 1000],
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: 10,
            context_turns: 6,
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            tts_command: None,
            sound_command: None,
            sound_dir: PathBuf::from("/home/pi/picar-x/sounds"),
            horn_sound: "car-double-horn.wav".to_string(),
            engine_sound: "car-start-engine.wav".to_string(),
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            backend: HardwareBackend::Sim,
            bridge_command: Vec::new(),
            call_timeout_ms: 250,
        }
    }
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from an explicit path, the environment, or defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(&p)
                    .with_context(|| format!("failed to read config file {}", p.display()))?;
                Self::from_toml(&text)
                    .with_context(|| format!("invalid config file {}", p.display()))?
            }
            None => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// `$OKAY_ROBOT_CONFIG`, else the per-user file if it exists
    fn default_path() -> Option<PathBuf> {
        if let Ok(p) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(p));
        }
        let home = std::env::var("HOME").ok()?;
        let candidate = PathBuf::from(home)
            .join(".config")
            .join("okay-robot")
            .join("config.toml");
        candidate.exists().then_some(candidate)
    }

    fn apply_env(&mut self) {
        if self.fallback.api_key.as_deref().map_or(true, str::is_empty) {
            self.fallback.api_key = std::env::var("OKAY_ROBOT_LLM_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok()
                .filter(|k| !k.is_empty());
        }
    }

    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.wake.phrases.iter().all(|p| p.trim().is_empty()) {
            bail!("at least one wake phrase is required");
        }
        if self.wake.command_timeout_secs == 0 {
            bail!("wake.command_timeout_secs must be positive");
        }
        let h = &self.hazard;
        if !(h.too_close_distance < h.danger_distance && h.danger_distance < h.safe_distance) {
            bail!(
                "proximity thresholds must satisfy too_close < danger < safe (got {} / {} / {})",
                h.too_close_distance,
                h.danger_distance,
                h.safe_distance
            );
        }
        if h.poll_interval_ms == 0 {
            bail!("hazard.poll_interval_ms must be positive");
        }
        if self.fallback.timeout_secs == 0 {
            bail!("fallback.timeout_secs must be positive");
        }
        if self.hardware.backend == HardwareBackend::Bridge && self.hardware.bridge_command.is_empty() {
            bail!("hardware.bridge_command is required for the bridge backend");
        }
        if self.hardware.call_timeout_ms == 0 {
            bail!("hardware.call_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.wake.command_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.hazard.poll_interval_ms)
    }

    pub fn critical_reassert(&self) -> Duration {
        Duration::from_millis(self.hazard.critical_reassert_ms)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback.timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }



    /// Fallback is only usable with a key
    pub fn fallback_active(&self) -> bool {
        self.fallback.enabled && self.fallback.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.command_timeout(), Duration::from_secs(30));
        assert!(config.wake.phrases.contains(&"okay robot".to_string()));
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = Config::from_toml(
            r#"
            robot_name = "Picar"

            [wake]
            command_timeout_secs = 12

            [hazard]
            too_close_distance = 5.0
            "#,
        )
        .unwrap();
        assert_eq!(config.robot_name, "Picar");
        assert_eq!(config.wake.command_timeout_secs, 12);
        assert_eq!(config.hazard.too_close_distance, 5.0);
        // untouched sections keep their defaults
        assert_eq!(config.hazard.danger_distance, 20.0);
        assert_eq!(config.motion.speed, 30);
    }

    #[test]
    fn test_misordered_thresholds_rejected() {
        let mut config = Config::default();
        config.hazard.danger_distance = 50.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bridge_requires_command() {
        let config = Config::from_toml("[hardware]\nbackend = \"bridge\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fallback_needs_key() {
        let mut config = Config::default();
        config.fallback.enabled = true;
        assert!(!config.fallback_active());
        config.fallback.api_key = Some("sk-test".to_string());
        assert!(config.fallback_active());
    }
}
