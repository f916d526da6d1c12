//! Proximity and drop-off monitor
//!
//! Polls the sensors on a fixed period from a dedicated thread. Events are
//! edge-triggered: one per threshold crossing, with CRITICAL re-asserted
//! at a bounded interval while the condition holds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{HazardCell, HazardEvent, HazardKind, Severity};
use crate::config::{Config, HazardConfig};
use crate::hardware::Actuator;

/// Errors that can occur starting the monitor
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("hazard monitor is already running")]
    AlreadyRunning,

    #[error("failed to spawn monitor thread: {0}")]
    ThreadSpawn(String),
}

/// Background sensor poller
pub struct HazardMonitor {
    actuator: Arc<dyn Actuator>,
    cell: HazardCell,
    config: Arc<Config>,
    running: Arc<AtomicBool>,
}

impl HazardMonitor {
    pub fn new(actuator: Arc<dyn Actuator>, cell: HazardCell, config: Arc<Config>) -> Self {
        Self {
            actuator,
            cell,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start polling on a dedicated thread until `stop()` is called
    pub fn start(&self) -> Result<(), MonitorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(MonitorError::AlreadyRunning);
        }

        let actuator = Arc::clone(&self.actuator);
        let cell = self.cell.clone();
        let running = Arc::clone(&self.running);
        let period = self.config.poll_interval();
        let mut sampler = Sampler::new(self.config.hazard.clone(), self.config.critical_reassert());

        let spawned = thread::Builder::new()
            .name("hazard-monitor".to_string())
            .spawn(move || {
                info!(period_ms = period.as_millis() as u64, "hazard monitor started");
                while running.load(Ordering::SeqCst) {
                    sampler.poll(actuator.as_ref(), &cell, Instant::now());
                    thread::sleep(period);
                }
                info!("hazard monitor stopped");
            });

        if let Err(e) = spawned {
            self.running.store(false, Ordering::SeqCst);
            return Err(MonitorError::ThreadSpawn(e.to_string()));
        }
        Ok(())
    }

    /// Stop polling; the thread exits after its current cycle
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the monitor is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct Tracker {
    level: Option<Severity>,
    last_emitted: Option<Instant>,
}

/// Edge detector over successive sensor samples
pub(crate) struct Sampler {
    config: HazardConfig,
    reassert: Duration,
    proximity: Tracker,
    cliff: Tracker,
}

impl Sampler {
    pub(crate) fn new(config: HazardConfig, reassert: Duration) -> Self {
        Self {
            config,
            reassert,
            proximity: Tracker::default(),
            cliff: Tracker::default(),
        }
    }

    /// Take one sample of every enabled sensor
    pub(crate) fn poll(&mut self, actuator: &dyn Actuator, cell: &HazardCell, now: Instant) {
        if self.config.obstacle_enabled {
            match actuator.read_distance() {
                // negative readings are lost echoes
                Ok(distance) if distance >= 0.0 => {
                    let level = self.proximity_level(distance);
                    Self::update(&mut self.proximity, HazardKind::Proximity, level, distance, now, self.reassert, cell);
                }
                Ok(distance) => debug!(distance, "ignoring invalid distance reading"),
                Err(e) => {
                    warn!(error = %e, "distance read failed; no hazard this cycle");
                    Self::forget(&mut self.proximity, HazardKind::Proximity, cell);
                }
            }
        }

        if self.config.cliff_enabled {
            match actuator.read_grayscale() {
                Ok(values) => {
                    let level = self.cliff_level(values);
                    let lowest = values.iter().copied().min().unwrap_or_default();
                    Self::update(&mut self.cliff, HazardKind::Cliff, level, f64::from(lowest), now, self.reassert, cell);
                }
                Err(e) => {
                    warn!(error = %e, "grayscale read failed; no hazard this cycle");
                    Self::forget(&mut self.cliff, HazardKind::Cliff, cell);
                }
            }
        }
    }

    fn proximity_level(&self, distance: f64) -> Option<Severity> {
        if distance < self.config.too_close_distance {
            Some(Severity::Critical)
        } else if distance < self.config.danger_distance {
            Some(Severity::Warn)
        } else {
            None
        }
    }

    fn cliff_level(&self, values: [u16; 3]) -> Option<Severity> {
        values
            .iter()
            .zip(self.config.cliff_reference.iter())
            .any(|(value, reference)| value <= reference)
            .then_some(Severity::Critical)
    }

    /// A failed read counts as no hazard, so a stale level must not linger
    fn forget(tracker: &mut Tracker, kind: HazardKind, cell: &HazardCell) {
        if tracker.level.take().is_some() {
            info!(?kind, "sensor unreadable, dropping hazard level");
            tracker.last_emitted = None;
            cell.clear(kind);
        }
    }

    fn update(
        tracker: &mut Tracker,
        kind: HazardKind,
        level: Option<Severity>,
        value: f64,
        now: Instant,
        reassert: Duration,
        cell: &HazardCell,
    ) {
        if level != tracker.level {
            match level {
                Some(severity) => {
                    warn!(?kind, ?severity, value, "hazard threshold crossed");
                    cell.raise(HazardEvent::new(kind, severity, value));
                    tracker.last_emitted = Some(now);
                }
                None => {
                    info!(?kind, value, "hazard cleared");
                    cell.clear(kind);
                }
            }
            tracker.level = level;
            return;
        }

        if level == Some(Severity::Critical) {
            let due = tracker
                .last_emitted
                .map_or(true, |at| now.saturating_duration_since(at) >= reassert);
            if due {
                debug!(?kind, value, "re-asserting critical hazard");
                cell.raise(HazardEvent::new(kind, Severity::Critical, value));
                tracker.last_emitted = Some(now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimCar;

    fn sampler() -> Sampler {
        Sampler::new(HazardConfig::default(), Duration::from_millis(1000))
    }

    #[test]
    fn test_edge_triggered_not_level_triggered() {
        let car = SimCar::new();
        let cell = HazardCell::new();
        let mut sampler = sampler();
        let start = Instant::now();

        car.set_distance(15.0);
        sampler.poll(&car, &cell, start);
        let (pending, _) = cell.take();
        assert_eq!(pending.map(|e| e.severity), Some(Severity::Warn));

        // same level on the next samples: nothing new
        for i in 1..5 {
            sampler.poll(&car, &cell, start + Duration::from_millis(100 * i));
            assert!(cell.take().0.is_none());
        }
    }

    #[test]
    fn test_critical_reasserted_after_interval() {
        let car = SimCar::new();
        let cell = HazardCell::new();
        let mut sampler = sampler();
        let start = Instant::now();

        car.set_distance(5.0);
        sampler.poll(&car, &cell, start);
        assert!(cell.take().0.unwrap().is_critical());

        sampler.poll(&car, &cell, start + Duration::from_millis(500));
        assert!(cell.take().0.is_none());

        sampler.poll(&car, &cell, start + Duration::from_millis(1000));
        assert!(cell.take().0.unwrap().is_critical());
    }

    #[test]
    fn test_clearing_updates_levels() {
        let car = SimCar::new();
        let cell = HazardCell::new();
        let mut sampler = sampler();
        let now = Instant::now();

        car.set_distance(5.0);
        sampler.poll(&car, &cell, now);
        assert!(cell.levels().any_critical());

        car.set_distance(60.0);
        sampler.poll(&car, &cell, now + Duration::from_millis(100));
        assert!(cell.levels().is_clear());
    }

    #[test]
    fn test_cliff_is_critical() {
        let car = SimCar::new();
        let cell = HazardCell::new();
        let mut sampler = sampler();

        car.set_grayscale([900, 150, 900]);
        sampler.poll(&car, &cell, Instant::now());
        let event = cell.take().0.unwrap();
        assert_eq!(event.kind, HazardKind::Cliff);
        assert!(event.is_critical());
        assert_eq!(event.measured_value, 150.0);
    }

    #[test]
    fn test_read_failure_is_no_hazard() {
        let car = SimCar::new();
        let cell = HazardCell::new();
        let mut sampler = sampler();

        car.set_distance(5.0);
        car.set_sensors_failing(true);
        sampler.poll(&car, &cell, Instant::now());
        let (pending, levels) = cell.take();
        assert!(pending.is_none());
        assert!(levels.is_clear());
    }

    #[test]
    fn test_read_failure_after_critical_clears_level() {
        let car = SimCar::new();
        let cell = HazardCell::new();
        let mut sampler = sampler();
        let start = Instant::now();

        car.set_distance(5.0);
        sampler.poll(&car, &cell, start);
        assert!(cell.take().1.any_critical());

        car.set_sensors_failing(true);
        sampler.poll(&car, &cell, start + Duration::from_millis(100));
        let (pending, levels) = cell.take();
        assert!(pending.is_none());
        assert!(levels.is_clear());

        // readable and still too close: a fresh edge, not a silent continuation
        car.set_sensors_failing(false);
        sampler.poll(&car, &cell, start + Duration::from_millis(200));
        assert!(cell.take().0.unwrap().is_critical());
    }

    #[test]
    fn test_invalid_echo_ignored() {
        let car = SimCar::new();
        let cell = HazardCell::new();
        let mut sampler = sampler();

        car.set_distance(-2.0);
        sampler.poll(&car, &cell, Instant::now());
        assert!(cell.take().0.is_none());
    }

    #[test]
    fn test_monitor_start_stop() {
        let car: Arc<dyn Actuator> = Arc::new(SimCar::new());
        let monitor = HazardMonitor::new(car, HazardCell::new(), Arc::new(Config::default()));
        assert!(!monitor.is_running());

        monitor.start().unwrap();
        assert!(monitor.is_running());
        assert!(matches!(monitor.start(), Err(MonitorError::AlreadyRunning)));

        monitor.stop();
        assert!(!monitor.is_running());
    }
}
