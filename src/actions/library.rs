//! Routine executor
//!
//! Runs step sequences against the actuator. Cancellation is checked
//! between steps and races every pause, so an interrupt lands at the next
//! step boundary. Whatever happens, the robot is left at rest.

use std::sync::Arc;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::catalog::Step;
use crate::hardware::{self, Actuator, ActuatorError};

/// How a routine ended when no actuator error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Interrupted,
}

/// Single-writer gateway to the actuators
#[derive(Clone)]
pub struct ActionLibrary {
    actuator: Arc<dyn Actuator>,
}

impl ActionLibrary {
    pub fn new(actuator: Arc<dyn Actuator>) -> Self {
        Self { actuator }
    }

    pub fn actuator(&self) -> &dyn Actuator {
        self.actuator.as_ref()
    }

    /// Run steps to completion or cancellation, then safe-stop
    ///
    /// An actuator error aborts the remaining steps; safe-stop is still
    /// attempted and the original error is returned.
    pub async fn perform(&self, steps: &[Step], cancel: &CancellationToken) -> Result<Outcome, ActuatorError> {
        let result = self.run_steps(steps, cancel).await;
        self.finish(result)
    }

    /// Apply the safe-stop postcondition to a routine result
    pub(crate) fn finish(&self, result: Result<Outcome, ActuatorError>) -> Result<Outcome, ActuatorError> {
        let stopped = self.safe_stop();
        match (result, stopped) {
            (Err(e), stopped) => {
                if let Err(stop_err) = stopped {
                    warn!(error = %stop_err, "safe-stop after failure also failed");
                }
                Err(e)
            }
            (Ok(_), Err(e)) => Err(e),
            (Ok(outcome), Ok(())) => Ok(outcome),
        }
    }

    /// Zero speed, centered steering and camera
    pub fn safe_stop(&self) -> Result<(), ActuatorError> {
        hardware::safe_stop(self.actuator.as_ref())
    }

    pub(crate) async fn run_steps(&self, steps: &[Step], cancel: &CancellationToken) -> Result<Outcome, ActuatorError> {
        for step in steps {
            if cancel.is_cancelled() {
                return Ok(Outcome::Interrupted);
            }
            match *step {
                Step::Wait(duration) => {
                    if !pause(duration, cancel).await {
                        return Ok(Outcome::Interrupted);
                    }
                }
                other => self.apply(other)?,
            }
        }
        Ok(Outcome::Completed)
    }

    pub(crate) fn apply(&self, step: Step) -> Result<(), ActuatorError> {
        debug!(?step, "step");
        let actuator = self.actuator.as_ref();
        match step {
            Step::Drive(speed) => actuator.set_speed(speed),
            Step::Steer(angle) => actuator.set_steering(angle),
            Step::Pan(angle) => actuator.set_pan(angle),
            Step::Tilt(angle) => actuator.set_tilt(angle),
            Step::Halt => actuator.stop(),
            Step::Wait(_) => Ok(()),
        }
    }
}

/// Sleep unless cancelled first; returns false on cancellation
pub(crate) async fn pause(duration: std::time::Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}
