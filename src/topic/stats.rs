//! Topic node statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-node counters
#[derive(Debug, Default)]
pub struct NodeStats {
    /// Records published
    pub published: AtomicU64,
    /// Records delivered by copy, summed over subscribers
    pub copied: AtomicU64,
    /// Records a subscriber skipped because they were overwritten
    pub lost: AtomicU64,
}

impl NodeStats {
    /// Record a publish
    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered copy and any records skipped to reach it
    pub fn record_copied(&self, lost: u64) {
        self.copied.fetch_add(1, Ordering::Relaxed);
        if lost > 0 {
            self.lost.fetch_add(lost, Ordering::Relaxed);
        }
    }

    /// Snapshot of the counters
    pub fn snapshot(&self) -> NodeStatsSnapshot {
        NodeStatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            copied: self.copied.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`NodeStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeStatsSnapshot {
    pub published: u64,
    pub copied: u64,
    pub lost: u64,
}
