//! In-process simulated car
//!
//! Tracks the commanded pose, records every visible change, and serves
//! scripted sensor values. Used when no hardware bridge is configured.

use parking_lot::Mutex;
use tracing::debug;

use super::{Actuator, ActuatorError, Pose};

/// Readings far from every default threshold
const CLEAR_DISTANCE_CM: f64 = 100.0;
const FLOOR_GRAYSCALE: [u16; 3] = [1500, 1500, 1500];

#[derive(Debug)]
struct SimState {
    pose: Pose,
    /// Pose after every command that changed it
    transitions: Vec<Pose>,
    commands: usize,
    distance: f64,
    grayscale: [u16; 3],
    sensors_failing: bool,
    failing_op: Option<&'static str>,
}

/// Simulated PiCar-style robot
#[derive(Debug)]
pub struct SimCar {
    state: Mutex<SimState>,
}

impl SimCar {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                pose: Pose::default(),
                transitions: Vec::new(),
                commands: 0,
                distance: CLEAR_DISTANCE_CM,
                grayscale: FLOOR_GRAYSCALE,
                sensors_failing: false,
                failing_op: None,
            }),
        }
    }

    /// Current commanded pose
    #[cfg(test)]
    pub fn pose(&self) -> Pose {
        self.state.lock().pose
    }

    /// Every pose change so far, oldest first
    #[cfg(test)]
    pub fn transitions(&self) -> Vec<Pose> {
        self.state.lock().transitions.clone()
    }

    /// Number of actuator commands received, including no-op ones
    #[cfg(test)]
    pub fn command_count(&self) -> usize {
        self.state.lock().commands
    }

    #[cfg(test)]
    pub fn set_distance(&self, cm: f64) {
        self.state.lock().distance = cm;
    }

    #[cfg(test)]
    pub fn set_grayscale(&self, values: [u16; 3]) {
        self.state.lock().grayscale = values;
    }

    /// Make every sensor read fail until cleared
    #[cfg(test)]
    pub fn set_sensors_failing(&self, failing: bool) {
        self.state.lock().sensors_failing = failing;
    }

    /// Make one actuator operation fail from now on
    #[cfg(test)]
    pub fn fail_op(&self, op: &'static str) {
        self.state.lock().failing_op = Some(op);
    }

    fn apply(&self, op: &'static str, update: impl FnOnce(&mut Pose)) -> Result<(), ActuatorError> {
        let mut state = self.state.lock();
        state.commands += 1;
        if state.failing_op == Some(op) {
            return Err(ActuatorError::Command {
                op,
                message: "simulated fault".to_string(),
            });
        }

        let before = state.pose;
        update(&mut state.pose);
        if state.pose != before {
            let pose = state.pose;
            debug!(op, ?pose, "sim pose changed");
            state.transitions.push(pose);
        }
        Ok(())
    }
}

impl Default for SimCar {
    fn default() -> Self {
        Self::new()
    }
}

impl Actuator for SimCar {
    fn set_speed(&self, speed: i16) -> Result<(), ActuatorError> {
        self.apply("set_speed", |p| p.speed = speed)
    }

    fn set_steering(&self, angle: i16) -> Result<(), ActuatorError> {
        self.apply("set_steering", |p| p.steering = angle)
    }

    fn set_pan(&self, angle: i16) -> Result<(), ActuatorError> {
        self.apply("set_pan", |p| p.pan = angle)
    }

    fn set_tilt(&self, angle: i16) -> Result<(), ActuatorError> {
        self.apply("set_tilt", |p| p.tilt = angle)
    }

    fn stop(&self) -> Result<(), ActuatorError> {
        self.apply("stop", |p| p.speed = 0)
    }

    fn read_distance(&self) -> Result<f64, ActuatorError> {
        let state = self.state.lock();
        if state.sensors_failing {
            return Err(ActuatorError::Sensor("simulated ultrasonic fault".to_string()));
        }
        Ok(state.distance)
    }

    fn read_grayscale(&self) -> Result<[u16; 3], ActuatorError> {
        let state = self.state.lock();
        if state.sensors_failing {
            return Err(ActuatorError::Sensor("simulated grayscale fault".to_string()));
        }
        Ok(state.grayscale)
    }
}
