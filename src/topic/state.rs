//! Topic state and device information exposed to handles

use serde::{Deserialize, Serialize};

/// Aggregate state of a topic node, as seen by its publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrbState {
    /// Highest rate any subscriber asked for, Hz (0 when unlimited or none)
    pub max_frequency: u32,
    /// Smallest batch interval any subscriber asked for, us (0 when none)
    pub min_batch_interval: u32,
    /// Ring depth (0 for a ghost)
    pub queue_size: u32,
    /// Number of subscribers
    pub nsubscribers: u32,
    /// Records published so far
    pub generation: u64,
}

/// Static description of the device behind a topic, set by its publisher
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name
    pub name: String,
    /// Vendor name
    pub vendor: String,
    /// Driver version
    pub version: u32,
    /// Power consumption, mA
    pub power: f32,
    /// Maximum range in the topic's unit
    pub max_range: f32,
    /// Resolution in the topic's unit
    pub resolution: f32,
    /// Shortest sampling interval, us
    pub min_delay: i32,
    /// Longest sampling interval, us
    pub max_delay: i32,
    /// FIFO slots reserved for this device
    pub fifo_reserved_event_count: u32,
    /// FIFO capacity in records
    pub fifo_max_event_count: u32,
}
