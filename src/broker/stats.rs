//! Statistics for the broker

use std::sync::atomic::{AtomicU64, Ordering};

/// Broker-wide control-plane counters
#[derive(Debug, Default)]
pub struct BrokerStats {
    /// Nodes created, ghosts included
    pub nodes_created: AtomicU64,
    /// Nodes dropped from the registry (retired or reaped ghosts)
    pub nodes_removed: AtomicU64,
    /// Successful advertises
    pub advertisements: AtomicU64,
    /// Publisher handles closed
    pub unadvertisements: AtomicU64,
    /// Subscriptions opened
    pub subscriptions: AtomicU64,
    /// Subscriptions closed
    pub unsubscriptions: AtomicU64,
}

impl BrokerStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Nodes currently held by the registry
    pub fn active_nodes(&self) -> u64 {
        let created = self.nodes_created.load(Ordering::Relaxed);
        let removed = self.nodes_removed.load(Ordering::Relaxed);
        created.saturating_sub(removed)
    }

    /// Subscriptions currently open
    pub fn active_subscriptions(&self) -> u64 {
        let opened = self.subscriptions.load(Ordering::Relaxed);
        let closed = self.unsubscriptions.load(Ordering::Relaxed);
        opened.saturating_sub(closed)
    }

    /// Plain copy of the counters
    pub fn snapshot(&self) -> BrokerStatsSnapshot {
        BrokerStatsSnapshot {
            nodes_created: self.nodes_created.load(Ordering::Relaxed),
            nodes_removed: self.nodes_removed.load(Ordering::Relaxed),
            advertisements: self.advertisements.load(Ordering::Relaxed),
            unadvertisements: self.unadvertisements.load(Ordering::Relaxed),
            subscriptions: self.subscriptions.load(Ordering::Relaxed),
            unsubscriptions: self.unsubscriptions.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`BrokerStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokerStatsSnapshot {
    pub nodes_created: u64,
    pub nodes_removed: u64,
    pub advertisements: u64,
    pub unadvertisements: u64,
    pub subscriptions: u64,
    pub unsubscriptions: u64,
}
