//! Per-handle readiness: wakeup descriptor plus pending priority events

use std::sync::atomic::{AtomicU32, Ordering};

use log::warn;

use crate::error::Result;

use super::{events::OrbEvents, notify::EventNotifier};

/// Wake source owned by one publisher or subscriber handle
#[derive(Debug)]
pub struct Readiness {
    notifier: EventNotifier,
    data_wakeups: bool,
    pending: AtomicU32,
}

impl Readiness {
    /// Create readiness state; `notifications` false mutes data wakeups
    pub fn new(notifications: bool) -> Result<Self> {
        Ok(Self {
            notifier: EventNotifier::new()?,
            data_wakeups: notifications,
            pending: AtomicU32::new(0),
        })
    }

    /// Wake for new data, unless data wakeups are muted
    pub fn wake_data(&self) {
        if self.data_wakeups {
            self.wake();
        }
    }

    /// Wake whoever waits on this handle
    pub fn wake(&self) {
        if let Err(e) = self.notifier.notify() {
            warn!("dropping wakeup: {}", e);
        }
    }

    /// Post priority events and wake the handle, muted or not
    pub fn raise(&self, events: OrbEvents) {
        if events.is_empty() {
            return;
        }
        self.pending.fetch_or(events.bits(), Ordering::AcqRel);
        self.wake();
    }

    /// Pending priority events, without clearing them
    pub fn pending(&self) -> OrbEvents {
        OrbEvents::from_bits_truncate(self.pending.load(Ordering::Acquire))
    }

    /// Take and clear pending priority events
    pub fn take(&self) -> OrbEvents {
        OrbEvents::from_bits_truncate(self.pending.swap(0, Ordering::AcqRel))
    }

    /// Underlying notifier
    pub fn notifier(&self) -> &EventNotifier {
        &self.notifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_raise_and_take() {
        let readiness = Readiness::new(true).unwrap();
        assert!(readiness.pending().is_empty());

        readiness.raise(OrbEvents::FLUSH_COMPLETE);
        readiness.raise(OrbEvents::STATE_CHANGED);
        assert!(readiness.pending().contains(OrbEvents::FLUSH_COMPLETE));

        let taken = readiness.take();
        assert_eq!(taken, OrbEvents::FLUSH_COMPLETE | OrbEvents::STATE_CHANGED);
        assert!(readiness.take().is_empty());
        assert!(readiness.notifier().wait(Some(Duration::from_millis(0))).unwrap());
    }

    #[test]
    fn test_raise_wakes_muted_handle() {
        let readiness = Readiness::new(false).unwrap();
        readiness.wake_data();
        assert!(!readiness.notifier().wait(Some(Duration::from_millis(0))).unwrap());

        readiness.raise(OrbEvents::FLUSH_REQUESTED);
        assert!(readiness.notifier().wait(Some(Duration::from_millis(0))).unwrap());
    }
}
