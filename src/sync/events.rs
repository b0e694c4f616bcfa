//! Readiness interest masks and priority event flags

use bitflags::bitflags;

bitflags! {
    /// Readiness conditions a handle can be polled for
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        /// Unread data is deliverable (`check` would return true)
        const DATAIN = 0x01;
        /// The handle accepts a publish
        const DATAOUT = 0x02;
        /// A priority event is pending, see [`OrbEvents`]
        const PRIORITY = 0x04;
        /// The node behind the handle was unadvertised
        const ERROR = 0x08;
    }
}

bitflags! {
    /// Priority events delivered asynchronously to a handle
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OrbEvents: u32 {
        /// Publisher finished a flush or applied a batch interval
        const FLUSH_COMPLETE = 0x01;
        /// A subscriber asked the publisher to flush its FIFO
        const FLUSH_REQUESTED = 0x02;
        /// A subscriber changed its requested batch interval
        const BATCH_REQUESTED = 0x04;
        /// Subscriber set or rate limits changed
        const STATE_CHANGED = 0x08;
    }
}

impl Default for EventMask {
    fn default() -> Self {
        Self::empty()
    }
}

impl Default for OrbEvents {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_operations() {
        let mask = EventMask::DATAIN | EventMask::PRIORITY;
        assert!(mask.contains(EventMask::DATAIN));
        assert!(!mask.contains(EventMask::DATAIN | EventMask::ERROR));
        assert!(mask.intersects(EventMask::PRIORITY | EventMask::ERROR));
        assert_eq!(mask & EventMask::DATAOUT, EventMask::empty());
        assert!(EventMask::default().is_empty());
    }

    #[test]
    fn test_from_bits_truncate() {
        let events = OrbEvents::from_bits_truncate(0xff);
        assert_eq!(events.bits(), 0x0f);
        assert!(events.contains(OrbEvents::FLUSH_COMPLETE | OrbEvents::STATE_CHANGED));
        assert_eq!(OrbEvents::from_bits(0x10), None);
    }

    #[test]
    fn test_debug_lists_flags() {
        let text = format!("{:?}", OrbEvents::FLUSH_COMPLETE | OrbEvents::BATCH_REQUESTED);
        assert!(text.starts_with("OrbEvents("));
        assert!(text.contains("FLUSH_COMPLETE"));
        assert!(text.contains("BATCH_REQUESTED"));
        assert!(!text.contains("STATE_CHANGED"));
    }
}
