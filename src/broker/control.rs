//! Generic control requests on broker handles
//!
//! [`OrbIoctl`] carries the typed controls every handle understands plus a
//! `Custom` escape hatch that is forwarded to the publisher's
//! [`ControlHandler`], the hook a driver installs to expose device-specific
//! commands.

use crate::{
    error::Result,
    topic::{DeviceInfo, OrbState},
};

/// Driver-specific control hook installed by a publisher
pub trait ControlHandler: Send + Sync {
    /// Handle command `cmd` with argument `arg`
    fn control(&self, cmd: u32, arg: u64) -> Result<u64>;
}

impl<F> ControlHandler for F
where
    F: Fn(u32, u64) -> Result<u64> + Send + Sync,
{
    fn control(&self, cmd: u32, arg: u64) -> Result<u64> {
        self(cmd, arg)
    }
}

/// Control request on a handle
#[derive(Debug, Clone, PartialEq)]
pub enum OrbIoctl {
    /// Minimum delivery spacing, us (subscriber)
    SetInterval(u32),
    /// Current delivery spacing (subscriber)
    GetInterval,
    /// Request a batch interval from the publisher, us (subscriber)
    SetBatchInterval(u32),
    /// Batch interval the publisher last confirmed
    GetBatchInterval,
    /// Ask the publisher to flush its FIFO (subscriber)
    Flush,
    /// Aggregate node state
    GetState,
    /// Describe the device (publisher)
    SetInfo(DeviceInfo),
    /// Device description
    GetInfo,
    /// Forwarded to the publisher's [`ControlHandler`]
    Custom { cmd: u32, arg: u64 },
}

impl OrbIoctl {
    /// Short name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            OrbIoctl::SetInterval(_) => "set_interval",
            OrbIoctl::GetInterval => "get_interval",
            OrbIoctl::SetBatchInterval(_) => "set_batch_interval",
            OrbIoctl::GetBatchInterval => "get_batch_interval",
            OrbIoctl::Flush => "flush",
            OrbIoctl::GetState => "get_state",
            OrbIoctl::SetInfo(_) => "set_info",
            OrbIoctl::GetInfo => "get_info",
            OrbIoctl::Custom { .. } => "custom",
        }
    }
}

/// Result of an [`OrbIoctl`]
#[derive(Debug, Clone, PartialEq)]
pub enum IoctlReply {
    /// Request applied, nothing to report
    Done,
    /// Interval in microseconds
    Interval(u32),
    /// Node state
    State(OrbState),
    /// Device description
    Info(DeviceInfo),
    /// Value returned by a custom handler
    Value(u64),
}
