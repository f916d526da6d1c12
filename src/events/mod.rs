//! Events module for session transitions
//!
//! Provides structured event types for wake/sleep, mode entry and exit,
//! routine lifecycle and hazard edges, broadcast by the session controller.

use serde::{Deserialize, Serialize};

use crate::hazard::{HazardKind, Severity};

/// Why the session went back to sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepReason {
    /// No speech for the command timeout
    IdleTimeout,
    /// Asked to sleep
    Requested,
}

/// Events emitted by the session controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Wake phrase heard while sleeping
    Woke,

    /// Back to sleep
    Slept { reason: SleepReason },

    /// A routine took the actuators
    RoutineStarted { name: String },

    /// Routine ran to the end
    RoutineCompleted {
        name: String,
        /// Duration in milliseconds the routine ran
        duration_ms: u64,
    },

    /// Routine was cancelled and brought to rest early
    RoutineInterrupted { name: String, duration_ms: u64 },

    /// Actuator error inside a routine
    RoutineFailed { name: String, error: String },

    /// Entered an autonomous mode
    ModeEntered { mode: String },

    /// Left an autonomous mode
    ModeExited { mode: String },

    /// Hazard monitor reported a threshold crossing
    HazardRaised { kind: HazardKind, severity: Severity },

    /// All monitored hazards back below their thresholds
    HazardCleared,

    /// A directive was superseded or discarded without running
    DirectiveDropped { directive: String },
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Woke => write!(f, "WOKE"),
            SessionEvent::Slept { reason } => write!(f, "SLEPT ({:?})", reason),
            SessionEvent::RoutineStarted { name } => write!(f, "ROUTINE_STARTED {}", name),
            SessionEvent::RoutineCompleted { name, duration_ms } => {
                write!(f, "ROUTINE_COMPLETED {} ({}ms)", name, duration_ms)
            }
            SessionEvent::RoutineInterrupted { name, duration_ms } => {
                write!(f, "ROUTINE_INTERRUPTED {} ({}ms)", name, duration_ms)
            }
            SessionEvent::RoutineFailed { name, error } => {
                write!(f, "ROUTINE_FAILED {}: {}", name, error)
            }
            SessionEvent::ModeEntered { mode } => write!(f, "MODE_ENTERED {}", mode),
            SessionEvent::ModeExited { mode } => write!(f, "MODE_EXITED {}", mode),
            SessionEvent::HazardRaised { kind, severity } => {
                write!(f, "HAZARD_RAISED {:?} {:?}", kind, severity)
            }
            SessionEvent::HazardCleared => write!(f, "HAZARD_CLEARED"),
            SessionEvent::DirectiveDropped { directive } => {
                write!(f, "DIRECTIVE_DROPPED {}", directive)
            }
        }
    }
}
