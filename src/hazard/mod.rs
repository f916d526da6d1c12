//! Hazard monitoring
//!
//! Background sampling of the proximity and drop-off sensors, independent
//! of the conversation. The monitor only ever writes the [`HazardCell`];
//! the session controller only reads and clears it.

mod cell;
mod monitor;

use serde::{Deserialize, Serialize};

pub use cell::{HazardCell, HazardLevels};
pub use monitor::HazardMonitor;
#[cfg(test)]
pub(crate) use monitor::Sampler;

/// Which sensor raised the hazard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    Proximity,
    Cliff,
}

/// How urgent a hazard is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warn,
    Critical,
}

/// A threshold crossing observed on one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HazardEvent {
    pub kind: HazardKind,
    pub severity: Severity,
    /// Distance in cm for proximity, lowest grayscale value for cliff
    pub measured_value: f64,
}

impl HazardEvent {
    pub fn new(kind: HazardKind, severity: Severity, measured_value: f64) -> Self {
        Self {
            kind,
            severity,
            measured_value,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}
