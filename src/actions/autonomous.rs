//! Autonomous driving policies
//!
//! Line tracking and obstacle avoidance run as one long-lived routine in
//! the actuator slot, reading sensors each cycle until cancelled.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::catalog::Step;
use super::library::{pause, ActionLibrary, Outcome};
use crate::config::{Config, HazardConfig, LineTrackingConfig};
use crate::hardware::ActuatorError;
use crate::hazard::{HazardEvent, HazardKind, Severity};

const LINE_CYCLE: Duration = Duration::from_millis(10);
const AVOID_CYCLE: Duration = Duration::from_millis(50);
const INVALID_READING_BACKOFF: Duration = Duration::from_millis(100);
const RECOVERY_ANGLE: i16 = 30;
const RECOVERY_SPEED: i16 = 10;
const AVOID_ANGLE: i16 = 30;

/// Which autonomous behaviour is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomousKind {
    LineTracking,
    ObstacleAvoidance,
}

impl AutonomousKind {
    pub fn name(self) -> &'static str {
        match self {
            AutonomousKind::LineTracking => "line tracking",
            AutonomousKind::ObstacleAvoidance => "obstacle avoidance",
        }
    }
}

impl std::fmt::Display for AutonomousKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the line is relative to the sensor bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinePosition {
    Centered,
    Left,
    Right,
    Lost,
}

/// Classify a grayscale triple; a channel sees the line at or below its reference
pub fn line_position(values: [u16; 3], reference: [u16; 3]) -> LinePosition {
    let on = |i: usize| values[i] <= reference[i];
    if on(1) {
        LinePosition::Centered
    } else if on(0) {
        LinePosition::Left
    } else if on(2) {
        LinePosition::Right
    } else {
        LinePosition::Lost
    }
}

/// Steps for one line-tracking cycle
///
/// `last_seen` is the most recent non-lost position, used to back toward
/// the line after losing it.
pub fn line_steps(position: LinePosition, last_seen: LinePosition, cfg: &LineTrackingConfig) -> Vec<Step> {
    match position {
        LinePosition::Centered => vec![Step::Steer(0), Step::Drive(cfg.speed)],
        LinePosition::Left => vec![Step::Steer(-cfg.offset), Step::Drive(cfg.speed)],
        LinePosition::Right => vec![Step::Steer(cfg.offset), Step::Drive(cfg.speed)],
        LinePosition::Lost => match last_seen {
            LinePosition::Left => vec![Step::Steer(RECOVERY_ANGLE), Step::Drive(-RECOVERY_SPEED)],
            LinePosition::Right => vec![Step::Steer(-RECOVERY_ANGLE), Step::Drive(-RECOVERY_SPEED)],
            // keep whatever we were doing
            LinePosition::Centered | LinePosition::Lost => Vec::new(),
        },
    }
}

/// Obstacle avoidance manoeuvre for a distance reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maneuver {
    Cruise,
    Veer,
    Retreat,
}

pub fn maneuver_for(distance: f64, cfg: &HazardConfig) -> Maneuver {
    if distance >= cfg.safe_distance {
        Maneuver::Cruise
    } else if distance >= cfg.danger_distance {
        Maneuver::Veer
    } else {
        Maneuver::Retreat
    }
}

pub fn maneuver_steps(maneuver: Maneuver, speed: i16) -> Vec<Step> {
    match maneuver {
        Maneuver::Cruise => vec![Step::Steer(0), Step::Drive(speed)],
        Maneuver::Veer => vec![
            Step::Steer(AVOID_ANGLE),
            Step::Drive(speed),
            Step::Wait(Duration::from_millis(100)),
        ],
        Maneuver::Retreat => vec![
            Step::Steer(-AVOID_ANGLE),
            Step::Drive(-speed),
            Step::Wait(Duration::from_millis(500)),
        ],
    }
}

impl ActionLibrary {
    /// Run an autonomous mode until cancelled, then safe-stop
    ///
    /// `warnings` carries WARN hazards forwarded by the session controller;
    /// obstacle avoidance answers them with a veer.
    pub async fn run_autonomous(
        &self,
        kind: AutonomousKind,
        config: &Config,
        cancel: &CancellationToken,
        warnings: mpsc::Receiver<HazardEvent>,
    ) -> Result<Outcome, ActuatorError> {
        info!(mode = %kind, "autonomous mode active");
        let result = match kind {
            AutonomousKind::LineTracking => self.track_line(&config.line_tracking, cancel).await,
            AutonomousKind::ObstacleAvoidance => self.avoid_obstacles(config, cancel, warnings).await,
        };
        info!(mode = %kind, "autonomous mode stopped");
        self.finish(result)
    }

    async fn track_line(&self, cfg: &LineTrackingConfig, cancel: &CancellationToken) -> Result<Outcome, ActuatorError> {
        let mut last_seen = LinePosition::Lost;
        loop {
            match self.actuator().read_grayscale() {
                Ok(values) => {
                    let position = line_position(values, cfg.line_reference);
                    let steps = line_steps(position, last_seen, cfg);
                    if self.run_steps(&steps, cancel).await? == Outcome::Interrupted {
                        return Ok(Outcome::Interrupted);
                    }
                    if position != LinePosition::Lost {
                        last_seen = position;
                    }
                }
                Err(e) => warn!(error = %e, "line tracking sensor read failed"),
            }
            if !pause(LINE_CYCLE, cancel).await {
                return Ok(Outcome::Interrupted);
            }
        }
    }

    async fn avoid_obstacles(
        &self,
        config: &Config,
        cancel: &CancellationToken,
        mut warnings: mpsc::Receiver<HazardEvent>,
    ) -> Result<Outcome, ActuatorError> {
        let speed = config.motion.speed;
        loop {
            let forwarded = warnings.try_recv().ok().filter(|event| {
                event.kind == HazardKind::Proximity && event.severity == Severity::Warn
            });

            let maneuver = if forwarded.is_some() {
                Some(Maneuver::Veer)
            } else {
                match self.actuator().read_distance() {
                    Ok(d) if d >= 0.0 => Some(maneuver_for(d, &config.hazard)),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(error = %e, "obstacle avoidance sensor read failed");
                        None
                    }
                }
            };

            let wait = match maneuver {
                Some(m) => {
                    if self.run_steps(&maneuver_steps(m, speed), cancel).await? == Outcome::Interrupted {
                        return Ok(Outcome::Interrupted);
                    }
                    AVOID_CYCLE
                }
                None => INVALID_READING_BACKOFF,
            };
            if !pause(wait, cancel).await {
                return Ok(Outcome::Interrupted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::hardware::SimCar;

    #[test]
    fn test_line_position() {
        let reference = [1000, 1000, 1000];
        assert_eq!(line_position([1500, 400, 1500], reference), LinePosition::Centered);
        assert_eq!(line_position([400, 1500, 1500], reference), LinePosition::Left);
        assert_eq!(line_position([1500, 1500, 400], reference), LinePosition::Right);
        assert_eq!(line_position([1500, 1500, 1500], reference), LinePosition::Lost);
    }

    #[test]
    fn test_line_recovery_backs_toward_last_side() {
        let cfg = LineTrackingConfig::default();
        let steps = line_steps(LinePosition::Lost, LinePosition::Left, &cfg);
        assert_eq!(steps, vec![Step::Steer(30), Step::Drive(-10)]);
        assert!(line_steps(LinePosition::Lost, LinePosition::Centered, &cfg).is_empty());
    }

    #[test]
    fn test_maneuver_thresholds() {
        let cfg = HazardConfig::default();
        assert_eq!(maneuver_for(80.0, &cfg), Maneuver::Cruise);
        assert_eq!(maneuver_for(40.0, &cfg), Maneuver::Cruise);
        assert_eq!(maneuver_for(25.0, &cfg), Maneuver::Veer);
        assert_eq!(maneuver_for(12.0, &cfg), Maneuver::Retreat);
    }

    #[tokio::test(start_paused = true)]
    async fn test_line_tracking_follows_and_stops_on_cancel() {
        let car = Arc::new(SimCar::new());
        car.set_grayscale([1500, 300, 1500]);
        let lib = ActionLibrary::new(car.clone());
        let config = Arc::new(Config::default());
        let cancel = CancellationToken::new();
        let (_tx, rx) = mpsc::channel(1);

        let task = {
            let (lib, config, cancel) = (lib.clone(), config.clone(), cancel.clone());
            tokio::spawn(async move {
                lib.run_autonomous(AutonomousKind::LineTracking, &config, &cancel, rx).await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(car.pose().speed, 10);
        assert_eq!(car.pose().steering, 0);

        car.set_grayscale([300, 1500, 1500]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(car.pose().steering, -20);

        cancel.cancel();
        assert_eq!(task.await.unwrap().unwrap(), Outcome::Interrupted);
        assert!(car.pose().is_at_rest());
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwarded_warning_triggers_veer() {
        let car = Arc::new(SimCar::new());
        let lib = ActionLibrary::new(car.clone());
        let config = Arc::new(Config::default());
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(4);

        let task = {
            let (lib, config, cancel) = (lib.clone(), config.clone(), cancel.clone());
            tokio::spawn(async move {
                lib.run_autonomous(AutonomousKind::ObstacleAvoidance, &config, &cancel, rx).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(car.pose().steering, 0);

        tx.send(HazardEvent::new(HazardKind::Proximity, Severity::Warn, 18.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(car.transitions().iter().any(|p| p.steering == AVOID_ANGLE));

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert!(car.pose().is_at_rest());
    }
}
