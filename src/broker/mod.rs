//! Broker: instance registry and the public handle API
//!
//! [`Broker`] is the entry point. Advertising yields a [`Publisher`],
//! subscribing yields a [`Subscriber`]; both are bound to one
//! (topic, instance) node kept in the instance registry. Subscribing never
//! waits for a publisher: a ghost node stands in until one advertises.

pub mod control;
pub mod handles;
pub mod manager;
pub(crate) mod registry;
pub mod stats;


pub use control::{ControlHandler, IoctlReply, OrbIoctl};
pub use handles::{OrbHandle, Publisher, Sample, Subscriber};
pub use manager::{Broker, ObjectSummary};
pub use stats::{BrokerStats, BrokerStatsSnapshot};
