//! Session mode and activity clock

use std::time::Duration;

use tokio::time::Instant;

use crate::actions::AutonomousKind;

/// Conversational mode
///
/// EXECUTING is not a mode of its own: it is derived from whether a
/// routine currently holds the actuators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Waiting for a wake phrase
    #[default]
    Sleeping,
    /// Listening for commands
    Awake,
    /// Acting on sensor input until stopped
    Autonomous(AutonomousKind),
    /// Terminal: bringing the robot to rest before exit
    ShuttingDown,
}

impl Mode {
    pub fn autonomous_kind(self) -> Option<AutonomousKind> {
        match self {
            Mode::Autonomous(kind) => Some(kind),
            _ => None,
        }
    }

    /// Whether the idle clock runs in this mode
    pub fn is_attentive(self) -> bool {
        matches!(self, Mode::Awake | Mode::Autonomous(_))
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Sleeping => write!(f, "Sleeping"),
            Mode::Awake => write!(f, "Awake"),
            Mode::Autonomous(kind) => write!(f, "Autonomous({})", kind),
            Mode::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

/// The one session of the process
#[derive(Debug, Clone)]
pub struct Session {
    pub mode: Mode,
    pub last_activity: Instant,
}

impl Session {
    pub fn new() -> Self {
        Self {
            mode: Mode::Sleeping,
            last_activity: Instant::now(),
        }
    }

    /// Record speech or a directive
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// When the session falls asleep if nothing else arrives
    pub fn idle_deadline(&self, timeout: Duration) -> Option<Instant> {
        self.mode.is_attentive().then(|| self.last_activity + timeout)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_mode_is_sleeping() {
        assert_eq!(Session::new().mode, Mode::Sleeping);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_deadline_only_when_attentive() {
        let mut session = Session::new();
        let timeout = Duration::from_secs(30);
        assert!(session.idle_deadline(timeout).is_none());

        session.mode = Mode::Autonomous(AutonomousKind::LineTracking);
        session.touch();
        let deadline = session.idle_deadline(timeout).unwrap();
        assert_eq!(deadline - session.last_activity, timeout);

        session.mode = Mode::ShuttingDown;
        assert!(session.idle_deadline(timeout).is_none());
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(
            Mode::Autonomous(AutonomousKind::ObstacleAvoidance).to_string(),
            "Autonomous(obstacle avoidance)"
        );
    }
}
