//! Action library
//!
//! Provides the named routines the robot can perform:
//! - catalog: action names and their step sequences
//! - library: the interruptible executor with its safe-stop postcondition
//! - autonomous: line tracking and obstacle avoidance loops

mod autonomous;
mod catalog;
mod library;

pub use autonomous::AutonomousKind;
pub use catalog::{Action, Step};
pub use library::{ActionLibrary, Outcome};

use crate::config::MotionConfig;

/// What occupies the actuator slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routine {
    Action(Action),
    /// Several actions run back to back as one interruptible routine
    Sequence(Vec<Action>),
    Autonomous(AutonomousKind),
}

impl Routine {
    /// Steps of a one-shot routine; autonomous modes have none
    pub fn steps(&self, motion: &MotionConfig) -> Option<Vec<Step>> {
        match self {
            Routine::Action(action) => Some(action.steps(motion)),
            Routine::Sequence(actions) => Some(actions.iter().flat_map(|a| a.steps(motion)).collect()),
            Routine::Autonomous(_) => None,
        }
    }
}

impl std::fmt::Display for Routine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Routine::Action(action) => write!(f, "{}", action),
            Routine::Sequence(actions) => {
                let names: Vec<&str> = actions.iter().map(|a| a.name()).collect();
                write!(f, "{}", names.join(", then "))
            }
            Routine::Autonomous(kind) => write!(f, "{} mode", kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_runs_actions_in_order() {
        let motion = MotionConfig::default();
        let sequence = Routine::Sequence(vec![Action::Nod, Action::TurnLeft]);

        let mut expected = Action::Nod.steps(&motion);
        expected.extend(Action::TurnLeft.steps(&motion));
        assert_eq!(sequence.steps(&motion), Some(expected));
        assert_eq!(sequence.to_string(), "nod, then turn left");
        assert!(Routine::Autonomous(AutonomousKind::LineTracking).steps(&motion).is_none());
    }
}
