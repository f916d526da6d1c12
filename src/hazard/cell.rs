//! Single-producer/single-consumer hazard signal cell
//!
//! Holds at most one unread event plus the current level per sensor.
//! A newer event replaces an unread one, except that an unread CRITICAL is
//! never replaced by a WARN.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{HazardEvent, HazardKind, Severity};

/// Current level per monitored sensor; `None` means below every threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HazardLevels {
    pub proximity: Option<Severity>,
    pub cliff: Option<Severity>,
}

impl HazardLevels {
    pub fn get(&self, kind: HazardKind) -> Option<Severity> {
        match kind {
            HazardKind::Proximity => self.proximity,
            HazardKind::Cliff => self.cliff,
        }
    }

    fn set(&mut self, kind: HazardKind, level: Option<Severity>) {
        match kind {
            HazardKind::Proximity => self.proximity = level,
            HazardKind::Cliff => self.cliff = level,
        }
    }

    pub fn is_clear(&self) -> bool {
        self.proximity.is_none() && self.cliff.is_none()
    }

    pub fn any_critical(&self) -> bool {
        self.proximity == Some(Severity::Critical) || self.cliff == Some(Severity::Critical)
    }
}

#[derive(Debug, Default)]
struct Slot {
    pending: Option<HazardEvent>,
    levels: HazardLevels,
}

#[derive(Debug, Default)]
struct Inner {
    slot: Mutex<Slot>,
    notify: Notify,
}

/// Shared hazard state between the monitor thread and the session controller
#[derive(Debug, Clone, Default)]
pub struct HazardCell {
    inner: Arc<Inner>,
}

impl HazardCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a threshold crossing (monitor side)
    pub fn raise(&self, event: HazardEvent) {
        {
            let mut slot = self.inner.slot.lock();
            slot.levels.set(event.kind, Some(event.severity));
            let keep_unread = matches!(
                slot.pending,
                Some(unread) if unread.is_critical() && !event.is_critical()
            );
            if !keep_unread {
                slot.pending = Some(event);
            }
        }
        self.inner.notify.notify_one();
    }

    /// Mark a sensor as back below its thresholds (monitor side)
    pub fn clear(&self, kind: HazardKind) {
        self.inner.slot.lock().levels.set(kind, None);
        self.inner.notify.notify_one();
    }

    /// Read and clear the unread event, with the current levels (controller side)
    pub fn take(&self) -> (Option<HazardEvent>, HazardLevels) {
        let mut slot = self.inner.slot.lock();
        (slot.pending.take(), slot.levels)
    }

    pub fn levels(&self) -> HazardLevels {
        self.inner.slot.lock().levels
    }

    /// Wait until the monitor publishes something
    pub async fn notified(&self) {
        self.inner.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: HazardKind, severity: Severity) -> HazardEvent {
        HazardEvent::new(kind, severity, 0.0)
    }

    #[test]
    fn test_take_clears_pending() {
        let cell = HazardCell::new();
        cell.raise(event(HazardKind::Proximity, Severity::Warn));

        let (pending, levels) = cell.take();
        assert!(pending.is_some());
        assert_eq!(levels.proximity, Some(Severity::Warn));

        let (pending, levels) = cell.take();
        assert!(pending.is_none());
        // the level survives the read
        assert_eq!(levels.proximity, Some(Severity::Warn));
    }

    #[test]
    fn test_unread_critical_not_replaced_by_warn() {
        let cell = HazardCell::new();
        cell.raise(event(HazardKind::Cliff, Severity::Critical));
        cell.raise(event(HazardKind::Proximity, Severity::Warn));

        let (pending, levels) = cell.take();
        assert_eq!(pending.map(|e| e.kind), Some(HazardKind::Cliff));
        assert!(levels.any_critical());
        assert_eq!(levels.proximity, Some(Severity::Warn));
    }

    #[test]
    fn test_newest_wins_otherwise() {
        let cell = HazardCell::new();
        cell.raise(event(HazardKind::Proximity, Severity::Warn));
        cell.raise(event(HazardKind::Proximity, Severity::Critical));

        let (pending, _) = cell.take();
        assert_eq!(pending.map(|e| e.severity), Some(Severity::Critical));
    }

    #[test]
    fn test_clear_resets_level_only() {
        let cell = HazardCell::new();
        cell.raise(event(HazardKind::Proximity, Severity::Critical));
        cell.clear(HazardKind::Proximity);

        let (pending, levels) = cell.take();
        assert!(pending.is_some());
        assert!(levels.is_clear());
    }

    #[tokio::test]
    async fn test_notification_is_not_lost() {
        let cell = HazardCell::new();
        cell.raise(event(HazardKind::Cliff, Severity::Critical));
        // raised before anyone waited; the stored permit still wakes us
        tokio::time::timeout(std::time::Duration::from_secs(1), cell.notified())
            .await
            .unwrap();
    }

    #[test]
    fn test_waiter_woken_by_raise() {
        let cell = HazardCell::new();
        let mut waiting = tokio_test::task::spawn(cell.notified());
        tokio_test::assert_pending!(waiting.poll());

        cell.raise(event(HazardKind::Proximity, Severity::Critical));
        assert!(waiting.is_woken());
        tokio_test::assert_ready!(waiting.poll());
    }
}
