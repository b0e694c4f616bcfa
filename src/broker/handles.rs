//! Publisher and Subscriber handles
//!
//! A handle binds caller code to one node. Both kinds keep the node alive
//! through an `Arc`, so closing a handle while another thread publishes or
//! copies on the same node is safe. Dropping a handle closes it.

use std::{
    os::fd::RawFd,
    sync::Arc,
    time::{Duration, Instant},
};

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::{OrbError, Result},
    metadata::{OrbMetadata, OrbObject},
    sync::{EventMask, NotificationStats, OrbEvents, Readiness},
    time::{absolute_time, frequency_to_interval, interval_to_frequency, OrbAbstime},
    topic::{CopyInfo, DeviceInfo, OrbState, SubscriberId, TopicNode},
};

use super::{
    control::{ControlHandler, IoctlReply, OrbIoctl},
    registry::InstanceRegistry,
};

/// A record delivered by [`Subscriber::copy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Generation of the record
    pub generation: u64,
    /// Publish timestamp
    pub timestamp: OrbAbstime,
    /// Records skipped since the previous copy because they were overwritten
    pub lost: u64,
    /// Payload bytes
    pub data: Vec<u8>,
}

/// Write side of a topic instance
#[derive(Debug)]
pub struct Publisher {
    registry: Arc<InstanceRegistry>,
    node: Arc<TopicNode>,
    readiness: Arc<Readiness>,
    closed: bool,
}

impl Publisher {
    pub(super) fn new(
        registry: Arc<InstanceRegistry>,
        node: Arc<TopicNode>,
        readiness: Arc<Readiness>,
    ) -> Self {
        Self {
            registry,
            node,
            readiness,
            closed: false,
        }
    }

    fn check_size(&self, len: usize) -> Result<()> {
        let meta = self.node.meta();
        if len != meta.size() {
            return Err(OrbError::size_mismatch(meta.name(), meta.size(), len));
        }
        Ok(())
    }

    /// Publish a record stamped with the current time
    pub fn publish(&self, data: &[u8]) -> Result<()> {
        self.publish_at(data, absolute_time())
    }

    /// Publish a record with an explicit timestamp
    pub fn publish_at(&self, data: &[u8], timestamp: OrbAbstime) -> Result<()> {
        self.check_size(data.len())?;
        self.node.publish(data, timestamp)?;
        Ok(())
    }

    /// Serialize `msg` with bincode and publish it.
    ///
    /// The encoding must match the topic size exactly, which holds for
    /// structs of fixed-width fields.
    pub fn publish_msg<T: Serialize>(&self, msg: &T) -> Result<()> {
        let data = bincode::serialize(msg)?;
        self.publish(&data)
    }

    /// Instance this publisher owns
    pub fn instance(&self) -> u32 {
        self.node.instance()
    }

    /// Topic metadata
    pub fn meta(&self) -> &'static OrbMetadata {
        self.node.meta()
    }

    /// Topic and instance
    pub fn object(&self) -> OrbObject {
        self.node.object()
    }

    /// Aggregate state of the node's subscribers
    pub fn get_state(&self) -> OrbState {
        self.node.state()
    }

    /// Take pending subscriber requests (flush, batch, state changes)
    pub fn take_events(&self) -> OrbEvents {
        self.readiness.take()
    }

    /// Apply a batch interval and acknowledge the subscribers that asked
    pub fn confirm_batch_interval(&self, batch_interval: u32) -> Result<()> {
        self.node.confirm_batch_interval(batch_interval)
    }

    /// Acknowledge pending flush requests
    pub fn flush_complete(&self) -> Result<()> {
        self.node.flush_complete()
    }

    /// Describe the device behind this topic
    pub fn set_info(&self, info: DeviceInfo) -> Result<()> {
        self.node.set_info(info)
    }

    /// Device description previously set
    pub fn get_info(&self) -> Result<DeviceInfo> {
        self.node.info()
    }

    /// Install the handler for custom controls
    pub fn set_control_handler(&self, handler: Arc<dyn ControlHandler>) -> Result<()> {
        self.node.set_control_handler(Some(handler))
    }

    /// Generic control passthrough
    pub fn ioctl(&self, request: OrbIoctl) -> Result<IoctlReply> {
        match request {
            OrbIoctl::GetState => Ok(IoctlReply::State(self.get_state())),
            OrbIoctl::SetInfo(info) => self.set_info(info).map(|_| IoctlReply::Done),
            OrbIoctl::GetInfo => self.get_info().map(IoctlReply::Info),
            OrbIoctl::GetBatchInterval => Ok(IoctlReply::Interval(self.node.batch_interval())),
            OrbIoctl::Custom { cmd, arg } => self.node.control(cmd, arg).map(IoctlReply::Value),
            other => Err(OrbError::unsupported(format!(
                "{} on a publisher",
                other.name()
            ))),
        }
    }

    /// Readiness of this handle
    pub fn poll_events(&self) -> EventMask {
        self.node.poll_publisher(&self.readiness)
    }

    /// Descriptor that becomes readable on subscriber requests
    pub fn raw_fd(&self) -> RawFd {
        self.readiness.notifier().raw_fd()
    }

    /// Wakeups sent to and waits performed on this handle's descriptor
    pub fn notification_stats(&self) -> NotificationStats {
        self.readiness.notifier().stats()
    }

    pub(crate) fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    /// Close the publisher and retire its node.
    ///
    /// Outstanding subscribers fail with `NotAdvertised` from now on.
    pub fn unadvertise(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.registry.unadvertise(&self.node);
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read side of a topic instance
#[derive(Debug)]
pub struct Subscriber {
    registry: Arc<InstanceRegistry>,
    node: Arc<TopicNode>,
    id: SubscriberId,
    readiness: Arc<Readiness>,
    closed: bool,
}

impl Subscriber {
    pub(super) fn new(
        registry: Arc<InstanceRegistry>,
        node: Arc<TopicNode>,
        id: SubscriberId,
        readiness: Arc<Readiness>,
    ) -> Self {
        Self {
            registry,
            node,
            id,
            readiness,
            closed: false,
        }
    }

    /// Whether an unread record may be copied now.
    ///
    /// Never mutates the subscription. Fails with `NotAdvertised` once the
    /// node was unadvertised.
    pub fn check(&self) -> Result<bool> {
        self.node.check(self.id)
    }

    /// Copy the next record
    pub fn copy(&self) -> Result<Sample> {
        let mut data = vec![0u8; self.node.meta().size()];
        let info = self.node.copy(self.id, &mut data)?;
        Ok(Sample {
            generation: info.generation,
            timestamp: info.timestamp,
            lost: info.lost,
            data,
        })
    }

    /// Copy the next record into `out`, which must be exactly the topic size
    pub fn copy_into(&self, out: &mut [u8]) -> Result<CopyInfo> {
        let meta = self.node.meta();
        if out.len() != meta.size() {
            return Err(OrbError::size_mismatch(meta.name(), meta.size(), out.len()));
        }
        self.node.copy(self.id, out)
    }

    /// Copy the next record and decode it with bincode
    pub fn copy_msg<T: DeserializeOwned>(&self) -> Result<T> {
        let sample = self.copy()?;
        Ok(bincode::deserialize(&sample.data)?)
    }

    /// Whether the node behind this handle has a live publisher
    pub fn exists(&self) -> bool {
        self.node.is_live()
    }

    /// Instance this subscription is bound to
    pub fn instance(&self) -> u32 {
        self.node.instance()
    }

    /// Topic metadata
    pub fn meta(&self) -> &'static OrbMetadata {
        self.node.meta()
    }

    /// Topic and instance
    pub fn object(&self) -> OrbObject {
        self.node.object()
    }

    /// Set the minimum delivery spacing in microseconds (0 disables)
    pub fn set_interval(&self, interval: u32) -> Result<()> {
        self.node.set_interval(self.id, interval)
    }

    /// Minimum delivery spacing in microseconds
    pub fn get_interval(&self) -> Result<u32> {
        self.node.interval(self.id)
    }

    /// Limit delivery to `frequency` Hz (0 disables)
    pub fn set_frequency(&self, frequency: u32) -> Result<()> {
        self.set_interval(frequency_to_interval(frequency))
    }

    /// Delivery limit in Hz (0 when unlimited)
    pub fn get_frequency(&self) -> Result<u32> {
        self.get_interval().map(interval_to_frequency)
    }

    /// Ask the publisher for a batch interval.
    ///
    /// Acknowledged with [`OrbEvents::FLUSH_COMPLETE`]; read the applied
    /// value with [`Self::get_batch_interval`] afterwards.
    pub fn set_batch_interval(&self, batch_interval: u32) -> Result<()> {
        self.node.request_batch_interval(self.id, batch_interval)
    }

    /// Batch interval the publisher last confirmed
    pub fn get_batch_interval(&self) -> u32 {
        self.node.batch_interval()
    }

    /// Ask the publisher to flush; acknowledged with `FLUSH_COMPLETE`
    pub fn flush(&self) -> Result<()> {
        self.node.request_flush(self.id)
    }

    /// Aggregate node state
    pub fn get_state(&self) -> OrbState {
        self.node.state()
    }

    /// Device description set by the publisher
    pub fn get_info(&self) -> Result<DeviceInfo> {
        self.node.info()
    }

    /// Generic control passthrough
    pub fn ioctl(&self, request: OrbIoctl) -> Result<IoctlReply> {
        match request {
            OrbIoctl::SetInterval(interval) => {
                self.set_interval(interval).map(|_| IoctlReply::Done)
            }
            OrbIoctl::GetInterval => self.get_interval().map(IoctlReply::Interval),
            OrbIoctl::SetBatchInterval(interval) => {
                self.set_batch_interval(interval).map(|_| IoctlReply::Done)
            }
            OrbIoctl::GetBatchInterval => Ok(IoctlReply::Interval(self.get_batch_interval())),
            OrbIoctl::Flush => self.flush().map(|_| IoctlReply::Done),
            OrbIoctl::GetState => Ok(IoctlReply::State(self.get_state())),
            OrbIoctl::GetInfo => self.get_info().map(IoctlReply::Info),
            OrbIoctl::Custom { cmd, arg } => self.node.control(cmd, arg).map(IoctlReply::Value),
            OrbIoctl::SetInfo(_) => Err(OrbError::unsupported("set_info on a subscriber")),
        }
    }

    /// Take pending priority events (flush/batch acknowledgements)
    pub fn take_events(&self) -> OrbEvents {
        self.readiness.take()
    }

    /// Block until [`Self::check`] would return true.
    ///
    /// Tolerates spurious wakeups and EINTR by re-checking. Honours the
    /// subscription interval. Fails with `Timeout` when `timeout` passes
    /// first and with `NotAdvertised` when the node is retired meanwhile.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if self.check()? {
                return Ok(());
            }

            let now = Instant::now();
            let remaining = match deadline {
                Some(deadline) if now >= deadline => {
                    return Err(OrbError::Timeout {
                        timeout_ms: timeout.map_or(0, |t| t.as_millis() as u64),
                    })
                }
                Some(deadline) => Some(deadline - now),
                None => None,
            };

            let slice = match (remaining, self.node.time_until_ready(self.id)) {
                (Some(r), Some(t)) => Some(r.min(t)),
                (r, None) => r,
                (None, t) => t,
            };

            match self.readiness.notifier().wait(slice) {
                Ok(_) | Err(OrbError::Interrupted) => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Readiness of this handle
    pub fn poll_events(&self) -> EventMask {
        self.node.poll_subscriber(self.id, &self.readiness)
    }

    /// Time until the interval lets this subscription report data again
    pub(crate) fn time_until_ready(&self) -> Option<Duration> {
        self.node.time_until_ready(self.id)
    }

    /// Descriptor that becomes readable on new data or priority events
    pub fn raw_fd(&self) -> RawFd {
        self.readiness.notifier().raw_fd()
    }

    /// Wakeups received and waits performed by this subscription
    pub fn notification_stats(&self) -> NotificationStats {
        self.readiness.notifier().stats()
    }

    pub(crate) fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    /// Close the subscription
    pub fn unsubscribe(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.registry.unsubscribe(&self.node, self.id);
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.close();
    }
}

/// Either side of a topic instance, as multiplexed by the event loop
#[derive(Debug)]
pub enum OrbHandle {
    Publisher(Publisher),
    Subscriber(Subscriber),
}

impl OrbHandle {
    /// Current readiness
    pub fn poll_events(&self) -> EventMask {
        match self {
            OrbHandle::Publisher(publisher) => publisher.poll_events(),
            OrbHandle::Subscriber(subscriber) => subscriber.poll_events(),
        }
    }

    /// Wakeup descriptor
    pub fn raw_fd(&self) -> RawFd {
        match self {
            OrbHandle::Publisher(publisher) => publisher.raw_fd(),
            OrbHandle::Subscriber(subscriber) => subscriber.raw_fd(),
        }
    }

    /// Topic and instance
    pub fn object(&self) -> OrbObject {
        match self {
            OrbHandle::Publisher(publisher) => publisher.object(),
            OrbHandle::Subscriber(subscriber) => subscriber.object(),
        }
    }

    /// Time until a rate-limited subscription turns readable
    pub(crate) fn time_until_ready(&self) -> Option<Duration> {
        match self {
            OrbHandle::Publisher(_) => None,
            OrbHandle::Subscriber(subscriber) => subscriber.time_until_ready(),
        }
    }

    pub(crate) fn readiness(&self) -> &Readiness {
        match self {
            OrbHandle::Publisher(publisher) => publisher.readiness(),
            OrbHandle::Subscriber(subscriber) => subscriber.readiness(),
        }
    }

    /// The publisher, if this is one
    pub fn as_publisher(&self) -> Option<&Publisher> {
        match self {
            OrbHandle::Publisher(publisher) => Some(publisher),
            OrbHandle::Subscriber(_) => None,
        }
    }

    /// The subscriber, if this is one
    pub fn as_subscriber(&self) -> Option<&Subscriber> {
        match self {
            OrbHandle::Subscriber(subscriber) => Some(subscriber),
            OrbHandle::Publisher(_) => None,
        }
    }
}

impl From<Publisher> for OrbHandle {
    fn from(publisher: Publisher) -> Self {
        OrbHandle::Publisher(publisher)
    }
}

impl From<Subscriber> for OrbHandle {
    fn from(subscriber: Subscriber) -> Self {
        OrbHandle::Subscriber(subscriber)
    }
}
