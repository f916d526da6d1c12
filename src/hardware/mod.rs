//! Actuator and sensor collaborator
//!
//! The core only sees the [`Actuator`] trait: primitive, synchronous,
//! possibly-failing motor/servo commands and sensor reads. Backends:
//! - `SimCar`: in-process simulated car (default, also the test double)
//! - `BridgeCar`: helper process speaking the bridge protocol over stdio

mod bridge;
mod protocol;
mod sim;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::config::{HardwareBackend, HardwareConfig};

pub use bridge::BridgeCar;
pub use sim::SimCar;

/// Errors raised by actuator backends
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("actuator backend unavailable: {0}")]
    Unavailable(String),

    #[error("actuator command {op} failed: {message}")]
    Command { op: &'static str, message: String },

    #[error("sensor read failed: {0}")]
    Sensor(String),

    #[error("bridge I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bridge protocol error: {0}")]
    Protocol(String),
}

/// Primitive robot operations
///
/// Speeds are signed: positive drives forward, negative backward.
/// Angles are in degrees with 0 as centre.
pub trait Actuator: Send + Sync {
    fn set_speed(&self, speed: i16) -> Result<(), ActuatorError>;
    fn set_steering(&self, angle: i16) -> Result<(), ActuatorError>;
    fn set_pan(&self, angle: i16) -> Result<(), ActuatorError>;
    fn set_tilt(&self, angle: i16) -> Result<(), ActuatorError>;
    /// Cut drive power
    fn stop(&self) -> Result<(), ActuatorError>;

    /// Distance ahead in centimetres; negative values are invalid echoes
    fn read_distance(&self) -> Result<f64, ActuatorError>;
    /// Left, middle, right grayscale values
    fn read_grayscale(&self) -> Result<[u16; 3], ActuatorError>;
}

/// Snapshot of everything the robot can move
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Pose {
    pub speed: i16,
    pub steering: i16,
    pub pan: i16,
    pub tilt: i16,
}

impl Pose {
    /// Zero speed, centered steering and camera
    pub fn is_at_rest(&self) -> bool {
        *self == Self::default()
    }
}

/// Drive every actuator to its resting state
///
/// Every command is attempted even if an earlier one fails; the first
/// error is returned.
pub fn safe_stop(actuator: &dyn Actuator) -> Result<(), ActuatorError> {
    let results = [
        actuator.stop(),
        actuator.set_steering(0),
        actuator.set_pan(0),
        actuator.set_tilt(0),
    ];
    results.into_iter().collect()
}

/// Bring up the configured backend
///
/// Failing here is fatal and happens before the conversational loop starts.
pub fn connect(config: &HardwareConfig) -> Result<Arc<dyn Actuator>, ActuatorError> {
    match config.backend {
        HardwareBackend::Sim => {
            info!("using simulated car");
            Ok(Arc::new(SimCar::new()))
        }
        HardwareBackend::Bridge => {
            let car = BridgeCar::spawn(&config.bridge_command, Duration::from_millis(config.call_timeout_ms))?;
            info!(command = ?config.bridge_command, "hardware bridge connected");
            Ok(Arc::new(car))
        }
    }
}
