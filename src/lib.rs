//! # Orbit - Topic Publish/Subscribe Broker
//!
//! Orbit is an in-process message bus for embedded and robotics software.
//! Independent producer and consumer tasks exchange fixed-size binary
//! records through named, optionally multi-instance topics without knowing
//! about each other.
//!
//! ## Features
//!
//! - **Compile-time topics**: declared with [`orb_define!`], identity is the descriptor
//! - **Multi-instance**: up to `max_instances` publishers per topic, allocated on demand
//! - **Queued delivery**: per-node ring with one cursor per subscriber, lossy on overflow
//! - **Subscribe before advertise**: ghost nodes promoted in place
//! - **Rate limiting**: per-subscriber interval applied at check time
//! - **Readiness**: eventfd per handle, blocking waits and an mio event loop
//! - **Publisher controls**: batch/flush requests, device info and ioctl passthrough
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                    Broker                       │
//! ├─────────────────────────────────────────────────┤
//! │  Instance registry       │  Topic nodes         │
//! │  - (topic, instance)     │  - Generation ring   │
//! │  - Ghost creation/reap   │  - Subscriber cursors│
//! │  - Instance allocation   │  - Wake targets      │
//! └─────────────────────────────────────────────────┘
//!           │                         │
//!           ▼                         ▼
//! ┌─────────────────┐    ┌─────────────────────────┐
//! │   Publisher /   │    │   Readiness (eventfd)   │
//! │   Subscriber    │    │   EventLoop (mio)       │
//! └─────────────────┘    └─────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use orbit::{orb_define, Broker};
//!
//! orb_define!(ORB_SENSOR_TEMP, "sensor_temp", 4);
//!
//! let broker = Broker::new();
//! broker.register(&ORB_SENSOR_TEMP)?;
//!
//! let publisher = broker.advertise_persist(&ORB_SENSOR_TEMP, Some(&21i32.to_le_bytes()))?;
//! let subscriber = broker.subscribe(&ORB_SENSOR_TEMP)?;
//!
//! assert!(subscriber.check()?);
//! assert_eq!(subscriber.copy()?.data, 21i32.to_le_bytes());
//!
//! publisher.publish(&22i32.to_le_bytes())?;
//! assert_eq!(subscriber.copy()?.data, 22i32.to_le_bytes());
//! assert!(!subscriber.check()?);
//! # Ok::<(), orbit::OrbError>(())
//! ```

#[cfg(not(any(target_os = "linux", target_os = "android")))]
compile_error!("orbit relies on eventfd and only supports Linux and Android");

// Core modules
pub mod config;
pub mod error;
pub mod metadata;
pub mod ringbuf;
pub mod time;
pub mod topic;

// Registry and handle API
pub mod broker;

// Readiness and event loop
pub mod sync;

// Main API re-exports
pub use broker::{
    Broker, BrokerStatsSnapshot, ControlHandler, IoctlReply, ObjectSummary, OrbHandle, OrbIoctl,
    Publisher, Sample, Subscriber,
};
pub use config::BrokerConfig;
pub use error::{OrbError, Result};
pub use metadata::{OrbMetadata, OrbObject, TopicCatalog};
pub use sync::{EventLoop, EventMask, LoopExit, NotificationStats, OrbEvents};
pub use time::{absolute_time, elapsed_time, OrbAbstime};
pub use topic::{CopyInfo, DeviceInfo, OrbState};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 3;
pub const VERSION_PATCH: u32 = 0;
