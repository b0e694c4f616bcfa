//! Per-instance topic state
//!
//! Each advertised or subscribed (topic, instance) pair is backed by one
//! [`TopicNode`]. The node owns:
//! - the generation-addressed ring holding the last `queue_size` records
//! - one cursor per attached subscription
//! - the wake targets of its publisher and subscribers
//! - the publisher-provided device info and control handler

pub mod node;
pub mod state;
pub mod stats;

#[cfg(test)]
mod tests;

pub use node::{CopyInfo, NodeState, SubscriberId, TopicNode};
pub use state::{DeviceInfo, OrbState};
pub use stats::{NodeStats, NodeStatsSnapshot};
