//! Wakeup primitive backed by eventfd
//!
//! Every broker handle owns one [`EventNotifier`]. Publishers bump it when a
//! record lands, so a reader can block in [`EventNotifier::wait`] or have the
//! descriptor multiplexed by the [`EventLoop`](super::EventLoop). The notifier
//! only says "something may have changed"; readers re-check their
//! subscription after every wake.

use std::{
    os::fd::{AsRawFd, OwnedFd, RawFd},
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags},
    sys::eventfd::{eventfd, EfdFlags},
    unistd::{read, write},
};

use crate::error::{OrbError, Result};

/// Event-based notifier using a non-blocking eventfd
#[derive(Debug)]
pub struct EventNotifier {
    event_fd: OwnedFd,
    notify_count: AtomicU64,
    wait_count: AtomicU64,
}

impl EventNotifier {
    /// Create a new event notifier
    pub fn new() -> Result<Self> {
        let event_fd = eventfd(0, EfdFlags::EFD_CLOEXEC | EfdFlags::EFD_NONBLOCK)
            .map_err(|e| OrbError::notification(format!("eventfd: {}", e)))?;

        Ok(Self {
            event_fd,
            notify_count: AtomicU64::new(0),
            wait_count: AtomicU64::new(0),
        })
    }

    /// Signal waiters. Never blocks.
    pub fn notify(&self) -> Result<()> {
        self.notify_count.fetch_add(1, Ordering::Relaxed);

        let buf = 1u64.to_ne_bytes();
        match write(self.event_fd.as_raw_fd(), &buf) {
            Ok(_) => Ok(()),
            // Counter saturated, readers are already signalled
            Err(Errno::EAGAIN) => Ok(()),
            Err(e) => Err(OrbError::notification(format!("eventfd write: {}", e))),
        }
    }

    /// Wait until signalled or `timeout` expires.
    ///
    /// Returns `Ok(true)` when signalled and `Ok(false)` on timeout. The
    /// signal is consumed. `Err(Interrupted)` is returned on EINTR.
    /// Timeouts are rounded up to whole milliseconds, never down to zero.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
        self.wait_count.fetch_add(1, Ordering::Relaxed);

        let timeout_ms = timeout.map(poll_timeout_ms).unwrap_or(-1);

        let mut fds = [PollFd::new(&self.event_fd, PollFlags::POLLIN)];
        match poll(&mut fds, timeout_ms) {
            Ok(0) => Ok(false),
            Ok(_) => {
                self.drain();
                Ok(true)
            }
            Err(e) => Err(OrbError::from(e)),
        }
    }

    /// Reset the counter without blocking
    pub fn drain(&self) {
        let mut buf = [0u8; 8];
        // EAGAIN just means nothing was pending
        let _ = read(self.event_fd.as_raw_fd(), &mut buf);
    }

    /// Descriptor for external multiplexing
    pub fn raw_fd(&self) -> RawFd {
        self.event_fd.as_raw_fd()
    }

    /// Get notification statistics
    pub fn stats(&self) -> NotificationStats {
        NotificationStats {
            notify_count: self.notify_count.load(Ordering::Relaxed),
            wait_count: self.wait_count.load(Ordering::Relaxed),
        }
    }
}

fn poll_timeout_ms(timeout: Duration) -> i32 {
    ((timeout.as_micros() + 999) / 1000).min(i32::MAX as u128) as i32
}

/// Statistics for event notifications
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationStats {
    /// Number of notifications sent
    pub notify_count: u64,
    /// Number of waits performed
    pub wait_count: u64,
}
