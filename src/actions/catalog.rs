//! Named actions and the step sequences behind them
//!
//! Every routine is a fixed list of [`Step`]s. Gesture timings and angles
//! are tuned for a PiCar-style chassis: steering servo, pan/tilt camera.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::MotionConfig;

/// How long a look left/right/up/down holds before recentering
const LOOK_HOLD: Duration = Duration::from_millis(1000);
/// Patrol drive speed and sweep
const PATROL_SPEED: i16 = 25;
const PATROL_DURATION: Duration = Duration::from_secs(5);
const PATROL_TICK: Duration = Duration::from_millis(100);
const PATROL_SWEEP_LIMIT: i16 = 45;

/// One actuator command or a pause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Drive(i16),
    Steer(i16),
    Pan(i16),
    Tilt(i16),
    /// Cut drive power
    Halt,
    /// Interruptible pause
    Wait(Duration),
}

/// Every routine the robot knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    Stop,
    LookLeft,
    LookRight,
    LookUp,
    LookDown,
    LookCenter,
    ShakeHead,
    Nod,
    WaveHands,
    Resist,
    ActCute,
    RubHands,
    Think,
    TwistBody,
    Celebrate,
    Depressed,
    SpinAround,
    Dance,
    Patrol,
    Reset,
}

impl Action {
    pub const ALL: [Action; 24] = [
        Action::Forward,
        Action::Backward,
        Action::TurnLeft,
        Action::TurnRight,
        Action::Stop,
        Action::LookLeft,
        Action::LookRight,
        Action::LookUp,
        Action::LookDown,
        Action::LookCenter,
        Action::ShakeHead,
        Action::Nod,
        Action::WaveHands,
        Action::Resist,
        Action::ActCute,
        Action::RubHands,
        Action::Think,
        Action::TwistBody,
        Action::Celebrate,
        Action::Depressed,
        Action::SpinAround,
        Action::Dance,
        Action::Patrol,
        Action::Reset,
    ];

    /// Spoken name, also used in logs and events
    pub fn name(self) -> &'static str {
        match self {
            Action::Forward => "forward",
            Action::Backward => "backward",
            Action::TurnLeft => "turn left",
            Action::TurnRight => "turn right",
            Action::Stop => "stop",
            Action::LookLeft => "look left",
            Action::LookRight => "look right",
            Action::LookUp => "look up",
            Action::LookDown => "look down",
            Action::LookCenter => "look center",
            Action::ShakeHead => "shake head",
            Action::Nod => "nod",
            Action::WaveHands => "wave hands",
            Action::Resist => "resist",
            Action::ActCute => "act cute",
            Action::RubHands => "rub hands",
            Action::Think => "think",
            Action::TwistBody => "twist body",
            Action::Celebrate => "celebrate",
            Action::Depressed => "depressed",
            Action::SpinAround => "spin around",
            Action::Dance => "dance",
            Action::Patrol => "patrol",
            Action::Reset => "reset",
        }
    }

    /// Look up an action by name; underscores and spaces are interchangeable
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase().replace('_', " ");
        Self::ALL.into_iter().find(|a| a.name() == normalized)
    }

    /// The step sequence for this action
    pub fn steps(self, motion: &MotionConfig) -> Vec<Step> {
        use Step::*;

        let speed = motion.speed;
        let hold = Duration::from_millis(motion.move_duration_ms);
        let turn = motion.turn_angle;

        match self {
            Action::Forward => vec![Steer(0), Drive(speed), Wait(hold), Halt],
            Action::Backward => vec![Steer(0), Drive(-speed), Wait(hold), Halt],
            Action::TurnLeft => vec![Steer(-turn), Drive(speed), Wait(hold), Halt, Steer(0)],
            Action::TurnRight => vec![Steer(turn), Drive(speed), Wait(hold), Halt, Steer(0)],
            Action::Stop => vec![Halt, Steer(0)],
            Action::LookLeft => vec![Pan(motion.pan_angle), Wait(LOOK_HOLD)],
            Action::LookRight => vec![Pan(-motion.pan_angle), Wait(LOOK_HOLD)],
            Action::LookUp => vec![Tilt(motion.tilt_angle), Wait(LOOK_HOLD)],
            Action::LookDown => vec![Tilt(-motion.tilt_angle), Wait(LOOK_HOLD)],
            Action::LookCenter => vec![Pan(0), Tilt(0), Wait(ms(300))],
            Action::ShakeHead => sweep(Pan, &[30, -30, 20, -20, 10, -10, 0], ms(120)),
            Action::Nod => sweep(Tilt, &[20, -10, 15, -5, 0], ms(200)),
            Action::WaveHands => wave_hands(),
            Action::Resist => {
                let mut steps = vec![Tilt(10)];
                for _ in 0..3 {
                    steps.extend([Steer(15), Pan(15), Wait(ms(150)), Steer(-15), Pan(-15), Wait(ms(150))]);
                }
                steps.extend([Halt, Steer(0), Pan(0), Tilt(0)]);
                steps
            }
            Action::ActCute => {
                let mut steps = vec![Tilt(-15), Wait(ms(200))];
                for _ in 0..3 {
                    steps.extend([
                        Drive(15),
                        Wait(ms(100)),
                        Halt,
                        Wait(ms(50)),
                        Drive(-15),
                        Wait(ms(100)),
                        Halt,
                        Wait(ms(50)),
                    ]);
                }
                steps.push(Tilt(0));
                steps
            }
            Action::RubHands => {
                let mut steps = Vec::new();
                for _ in 0..5 {
                    steps.extend([Steer(6), Wait(ms(100)), Steer(-6), Wait(ms(100))]);
                }
                steps.push(Steer(0));
                steps
            }
            Action::Think => vec![
                Pan(-30),
                Tilt(-10),
                Steer(15),
                Wait(ms(1000)),
                Pan(-15),
                Wait(ms(500)),
                Steer(0),
                Pan(0),
                Tilt(0),
            ],
            Action::TwistBody => {
                let mut steps = Vec::new();
                for _ in 0..3 {
                    steps.extend([
                        Drive(15),
                        Wait(ms(150)),
                        Halt,
                        Pan(20),
                        Steer(-15),
                        Wait(ms(150)),
                        Drive(-15),
                        Wait(ms(150)),
                        Halt,
                        Pan(-20),
                        Steer(15),
                        Wait(ms(150)),
                    ]);
                }
                steps.extend([Halt, Steer(0), Pan(0)]);
                steps
            }
            Action::Celebrate => celebrate(),
            Action::Depressed => {
                let mut steps = sweep(Tilt, &[-10, -20, -15, -25, -10], ms(400));
                // the sweep ends recentered; sulk first
                steps.insert(steps.len() - 1, Wait(ms(1000)));
                steps
            }
            Action::SpinAround => vec![Steer(35), Drive(speed), Wait(ms(2500)), Halt, Steer(0)],
            Action::Dance => {
                let mut steps = Vec::new();
                for _ in 0..2 {
                    steps.extend([Steer(25), Drive(20), Wait(ms(300)), Steer(-25), Wait(ms(300))]);
                }
                steps.extend([Halt, Steer(0)]);
                steps.extend(wave_hands());
                steps.extend(celebrate());
                steps
            }
            Action::Patrol => patrol(),
            Action::Reset => vec![Halt, Steer(0), Pan(0), Tilt(0)],
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Visit each angle with a pause, then recenter
fn sweep(servo: fn(i16) -> Step, angles: &[i16], pause: Duration) -> Vec<Step> {
    let mut steps = Vec::with_capacity(angles.len() * 2 + 1);
    for &angle in angles {
        steps.push(servo(angle));
        steps.push(Step::Wait(pause));
    }
    steps.push(servo(0));
    steps
}

fn wave_hands() -> Vec<Step> {
    use Step::*;
    let mut steps = vec![Tilt(15)];
    for _ in 0..2 {
        steps.extend([Steer(25), Wait(ms(250)), Steer(-25), Wait(ms(250))]);
    }
    steps.extend([Steer(0), Tilt(0)]);
    steps
}

fn celebrate() -> Vec<Step> {
    use Step::*;
    let mut steps = vec![Tilt(20)];
    for _ in 0..2 {
        steps.extend([Pan(-30), Steer(-20), Wait(ms(200)), Pan(30), Steer(20), Wait(ms(200))]);
    }
    steps.extend([Pan(0), Tilt(0), Steer(0)]);
    steps
}

/// Drive ahead while the camera sweeps side to side
fn patrol() -> Vec<Step> {
    let ticks = (PATROL_DURATION.as_millis() / PATROL_TICK.as_millis()) as usize;
    let mut steps = vec![Step::Drive(PATROL_SPEED)];
    let mut angle: i16 = 0;
    let mut direction: i16 = 1;

    for _ in 0..ticks {
        steps.push(Step::Pan(angle));
        angle += 5 * direction;
        if !(-PATROL_SWEEP_LIMIT..=PATROL_SWEEP_LIMIT).contains(&angle) {
            direction = -direction;
        }
        steps.push(Step::Wait(PATROL_TICK));
    }
    steps.extend([Step::Halt, Step::Pan(0)]);
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_wait(steps: &[Step]) -> Duration {
        steps
            .iter()
            .filter_map(|s| match s {
                Step::Wait(d) => Some(*d),
                _ => None,
            })
            .sum()
    }

    #[test]
    fn test_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::from_name(action.name()), Some(action));
        }
        assert_eq!(Action::from_name("turn_left"), Some(Action::TurnLeft));
        assert_eq!(Action::from_name(" Spin Around "), Some(Action::SpinAround));
        assert_eq!(Action::from_name("fly"), None);
    }

    #[test]
    fn test_turn_left_uses_configured_angle() {
        let motion = MotionConfig::default();
        let steps = Action::TurnLeft.steps(&motion);
        assert_eq!(steps[0], Step::Steer(-motion.turn_angle));
        assert_eq!(steps[1], Step::Drive(motion.speed));
        assert_eq!(steps.last(), Some(&Step::Steer(0)));
        assert_eq!(total_wait(&steps), Duration::from_millis(motion.move_duration_ms));
    }

    #[test]
    fn test_backward_drives_negative() {
        let steps = Action::Backward.steps(&MotionConfig::default());
        assert!(steps.contains(&Step::Drive(-30)));
    }

    #[test]
    fn test_patrol_sweeps_within_limits() {
        let steps = Action::Patrol.steps(&MotionConfig::default());
        assert_eq!(total_wait(&steps), PATROL_DURATION);
        for step in &steps {
            if let Step::Pan(angle) = step {
                assert!(angle.abs() <= PATROL_SWEEP_LIMIT + 5);
            }
        }
    }

    #[test]
    fn test_depressed_sulks_before_recentering() {
        let steps = Action::Depressed.steps(&MotionConfig::default());
        assert_eq!(steps[steps.len() - 2], Step::Wait(Duration::from_millis(1000)));
        assert_eq!(steps.last(), Some(&Step::Tilt(0)));
    }

    #[test]
    fn test_every_action_has_steps() {
        let motion = MotionConfig::default();
        for action in Action::ALL {
            assert!(!action.steps(&motion).is_empty(), "{action} has no steps");
        }
    }
}
