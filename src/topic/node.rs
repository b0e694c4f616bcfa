//! Live per-(topic, instance) state
//!
//! A [`TopicNode`] owns the ring, the generation counter and the cursor of
//! every subscription attached to it, all behind one lock. Wake targets live
//! behind a second lock so that waking readers never extends the data-plane
//! critical section. The two locks are never held at the same time.
//!
//! A node starts either as a ghost (a subscriber arrived first) or is
//! created live by an advertise. Promotion swaps [`NodeState`] in place, so
//! subscriptions taken on the ghost keep their `Arc` and simply start
//! seeing data. Unadvertise moves the node to `Retired` for good.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use log::{debug, trace};
use parking_lot::Mutex;

use crate::{
    broker::control::ControlHandler,
    error::{OrbError, Result},
    metadata::{OrbMetadata, OrbObject},
    ringbuf::GenerationRing,
    sync::{EventMask, OrbEvents, Readiness},
    time::{absolute_time, interval_to_frequency, OrbAbstime},
};

use super::{
    state::{DeviceInfo, OrbState},
    stats::NodeStats,
};

/// Identifier of a subscription within its node
pub type SubscriberId = u64;

/// Lifecycle of a node
#[derive(Debug)]
pub enum NodeState {
    /// Created by an early subscriber, no storage yet
    Ghost,
    /// Advertised, with ring storage
    Live(GenerationRing),
    /// Unadvertised; every remaining handle fails
    Retired,
}

/// Where a copied record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyInfo {
    /// Generation of the delivered record
    pub generation: u64,
    /// Publish timestamp of the record
    pub timestamp: OrbAbstime,
    /// Records skipped because they were overwritten before this copy
    pub lost: u64,
}

#[derive(Debug, Clone)]
struct Cursor {
    generation: u64,
    last_delivered: OrbAbstime,
    interval: u32,
    batch_interval: u32,
    batch_pending: bool,
    flush_pending: bool,
}

impl Cursor {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            last_delivered: 0,
            interval: 0,
            batch_interval: 0,
            batch_pending: false,
            flush_pending: false,
        }
    }

    /// Time left before the interval allows another delivery
    fn interval_remaining(&self, now: OrbAbstime) -> OrbAbstime {
        if self.interval == 0 || self.last_delivered == 0 {
            return 0;
        }
        let due = self.last_delivered + self.interval as OrbAbstime;
        due.saturating_sub(now)
    }
}

struct NodeInner {
    state: NodeState,
    generation: u64,
    persistent: bool,
    cursors: HashMap<SubscriberId, Cursor>,
    next_id: SubscriberId,
    batch_interval: u32,
    info: Option<DeviceInfo>,
    control: Option<Arc<dyn ControlHandler>>,
}

#[derive(Default)]
struct Watchers {
    subscribers: HashMap<SubscriberId, Arc<Readiness>>,
    publisher: Option<Arc<Readiness>>,
}

/// Per-(topic, instance) broker state
pub struct TopicNode {
    meta: &'static OrbMetadata,
    instance: u32,
    inner: Mutex<NodeInner>,
    watchers: Mutex<Watchers>,
    stats: NodeStats,
}

impl fmt::Debug for TopicNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicNode")
            .field("topic", &self.meta.name())
            .field("instance", &self.instance)
            .finish()
    }
}

impl TopicNode {
    /// Create a ghost node
    pub(crate) fn ghost(meta: &'static OrbMetadata, instance: u32) -> Self {
        debug!("creating ghost node {}{}", meta.name(), instance);
        Self {
            meta,
            instance,
            inner: Mutex::new(NodeInner {
                state: NodeState::Ghost,
                generation: 0,
                persistent: false,
                cursors: HashMap::new(),
                next_id: 1,
                batch_interval: 0,
                info: None,
                control: None,
            }),
            watchers: Mutex::new(Watchers::default()),
            stats: NodeStats::default(),
        }
    }

    /// Topic metadata
    pub fn meta(&self) -> &'static OrbMetadata {
        self.meta
    }

    /// Instance number
    pub fn instance(&self) -> u32 {
        self.instance
    }

    /// Topic and instance
    pub fn object(&self) -> OrbObject {
        OrbObject::new(self.meta, self.instance)
    }

    /// Node counters
    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    /// Whether the node has a live publisher
    pub fn is_live(&self) -> bool {
        matches!(self.inner.lock().state, NodeState::Live(_))
    }

    /// Whether the node is still waiting for its first publisher
    pub fn is_ghost(&self) -> bool {
        matches!(self.inner.lock().state, NodeState::Ghost)
    }

    /// Whether the node was unadvertised
    pub fn is_retired(&self) -> bool {
        matches!(self.inner.lock().state, NodeState::Retired)
    }

    /// Records published so far
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Number of attached subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().cursors.len()
    }

    fn not_advertised(&self) -> OrbError {
        OrbError::not_advertised(self.meta.name(), self.instance)
    }

    fn detached() -> OrbError {
        OrbError::invalid_parameter("subscriber", "Subscription is not attached to this node")
    }

    /// Promote a ghost to live with `ring` as storage.
    ///
    /// With `persistent`, subscriptions taken on the ghost see `initial` as
    /// their first record. Otherwise they are moved past it and only see
    /// records published from now on.
    pub(crate) fn promote(
        &self,
        mut ring: GenerationRing,
        initial: Option<(&[u8], OrbAbstime)>,
        persistent: bool,
        publisher: Arc<Readiness>,
    ) -> Result<()> {
        let requests = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            match inner.state {
                NodeState::Ghost => {}
                NodeState::Live(_) => {
                    return Err(OrbError::already_advertised(self.meta.name(), self.instance))
                }
                NodeState::Retired => return Err(self.not_advertised()),
            }

            if let Some((payload, timestamp)) = initial {
                ring.write(inner.generation, payload, timestamp);
                inner.generation += 1;
            }
            inner.state = NodeState::Live(ring);
            inner.persistent = persistent;

            if !persistent {
                let head = inner.generation;
                for cursor in inner.cursors.values_mut() {
                    cursor.generation = head;
                }
            }

            let mut requests = OrbEvents::empty();
            if !inner.cursors.is_empty() {
                requests |= OrbEvents::STATE_CHANGED;
            }
            if inner.cursors.values().any(|c| c.batch_pending) {
                requests |= OrbEvents::BATCH_REQUESTED;
            }
            if inner.cursors.values().any(|c| c.flush_pending) {
                requests |= OrbEvents::FLUSH_REQUESTED;
            }
            requests
        };

        if initial.is_some() {
            self.stats.record_published();
        }

        let mut watchers = self.watchers.lock();
        watchers.publisher = Some(publisher.clone());
        if initial.is_some() && persistent {
            for readiness in watchers.subscribers.values() {
                readiness.wake_data();
            }
        }
        drop(watchers);

        publisher.raise(requests);
        debug!(
            "promoted {}{} (persistent: {})",
            self.meta.name(),
            self.instance,
            persistent
        );
        Ok(())
    }

    /// Retire the node. Outstanding handles fail from now on.
    pub(crate) fn retire(&self) {
        {
            let mut inner = self.inner.lock();
            inner.state = NodeState::Retired;
            inner.control = None;
        }

        let mut watchers = self.watchers.lock();
        watchers.publisher = None;
        for readiness in watchers.subscribers.values() {
            readiness.wake();
        }
    }

    /// Append a record. Never blocks on subscribers; the oldest record is
    /// overwritten when the ring is full. Returns the new generation.
    pub fn publish(&self, payload: &[u8], timestamp: OrbAbstime) -> Result<u64> {
        debug_assert_eq!(payload.len(), self.meta.size());

        let generation = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let ring = match &mut inner.state {
                NodeState::Live(ring) => ring,
                _ => return Err(self.not_advertised()),
            };
            ring.write(inner.generation, payload, timestamp);
            inner.generation += 1;
            inner.generation
        };

        self.stats.record_published();

        let watchers = self.watchers.lock();
        for readiness in watchers.subscribers.values() {
            readiness.wake_data();
        }

        Ok(generation)
    }

    /// Attach a subscription.
    ///
    /// On a persistent node with data the cursor starts at the latest
    /// record; otherwise it starts at the head and sees only new records.
    pub(crate) fn attach_subscriber(&self, readiness: Arc<Readiness>) -> SubscriberId {
        let (id, unread) = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;

            let start = match inner.state {
                NodeState::Live(_) if inner.persistent && inner.generation > 0 => {
                    inner.generation - 1
                }
                _ => inner.generation,
            };
            inner.cursors.insert(id, Cursor::new(start));
            (id, start < inner.generation)
        };

        if unread {
            readiness.wake_data();
        }

        let publisher = {
            let mut watchers = self.watchers.lock();
            watchers.subscribers.insert(id, readiness);
            watchers.publisher.clone()
        };
        if let Some(publisher) = publisher {
            publisher.raise(OrbEvents::STATE_CHANGED);
        }

        id
    }

    /// Detach a subscription; returns how many remain
    pub(crate) fn detach_subscriber(&self, id: SubscriberId) -> usize {
        let remaining = {
            let mut inner = self.inner.lock();
            inner.cursors.remove(&id);
            inner.cursors.len()
        };

        let publisher = {
            let mut watchers = self.watchers.lock();
            watchers.subscribers.remove(&id);
            watchers.publisher.clone()
        };
        if let Some(publisher) = publisher {
            publisher.raise(OrbEvents::STATE_CHANGED);
        }

        remaining
    }

    /// Whether subscription `id` has a deliverable record.
    ///
    /// Side-effect free. A rate-limited subscription reports false until its
    /// interval has passed since the last copy.
    pub fn check(&self, id: SubscriberId) -> Result<bool> {
        let now = absolute_time();
        let inner = self.inner.lock();
        match inner.state {
            NodeState::Retired => Err(self.not_advertised()),
            NodeState::Ghost => Ok(false),
            NodeState::Live(_) => {
                let cursor = inner.cursors.get(&id).ok_or_else(Self::detached)?;
                Ok(cursor.generation < inner.generation && cursor.interval_remaining(now) == 0)
            }
        }
    }

    /// Time until a rate-limited subscription may report data again.
    ///
    /// `None` when nothing is unread or the subscription is not limited.
    pub fn time_until_ready(&self, id: SubscriberId) -> Option<Duration> {
        let now = absolute_time();
        let inner = self.inner.lock();
        if !matches!(inner.state, NodeState::Live(_)) {
            return None;
        }
        let cursor = inner.cursors.get(&id)?;
        if cursor.generation >= inner.generation {
            return None;
        }
        match cursor.interval_remaining(now) {
            0 => None,
            remaining => Some(Duration::from_micros(remaining)),
        }
    }

    /// Copy the oldest retained unread record into `out`.
    ///
    /// Advances the cursor by exactly one record. Records overwritten since
    /// the last copy are skipped and reported in [`CopyInfo::lost`].
    pub fn copy(&self, id: SubscriberId, out: &mut [u8]) -> Result<CopyInfo> {
        debug_assert!(out.len() >= self.meta.size());
        let now = absolute_time();

        let info = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let ring = match &inner.state {
                NodeState::Live(ring) => ring,
                NodeState::Ghost => return Err(OrbError::NoData),
                NodeState::Retired => return Err(self.not_advertised()),
            };
            let cursor = inner.cursors.get_mut(&id).ok_or_else(Self::detached)?;
            let plan = ring
                .plan_read(cursor.generation, inner.generation)
                .ok_or(OrbError::NoData)?;

            let timestamp = ring.read(plan.generation, out);
            cursor.generation = plan.generation + 1;
            cursor.last_delivered = now;

            CopyInfo {
                generation: plan.generation,
                timestamp,
                lost: plan.lost,
            }
        };

        self.stats.record_copied(info.lost);
        if info.lost > 0 {
            trace!(
                "{}{}: subscriber {} skipped {} overwritten records",
                self.meta.name(),
                self.instance,
                id,
                info.lost
            );
        }

        Ok(info)
    }

    /// Readiness of subscription `id` for polling
    pub(crate) fn poll_subscriber(&self, id: SubscriberId, readiness: &Readiness) -> EventMask {
        let mut mask = match self.check(id) {
            Ok(true) => EventMask::DATAIN,
            Ok(false) => EventMask::empty(),
            Err(_) => EventMask::ERROR,
        };
        if !readiness.pending().is_empty() {
            mask |= EventMask::PRIORITY;
        }
        mask
    }

    /// Readiness of the publisher for polling
    pub(crate) fn poll_publisher(&self, readiness: &Readiness) -> EventMask {
        let mut mask = match self.inner.lock().state {
            NodeState::Live(_) => EventMask::DATAOUT,
            NodeState::Ghost => EventMask::empty(),
            NodeState::Retired => EventMask::ERROR,
        };
        if !readiness.pending().is_empty() {
            mask |= EventMask::PRIORITY;
        }
        mask
    }

    fn notify_publisher(&self, events: OrbEvents) {
        let publisher = self.watchers.lock().publisher.clone();
        if let Some(publisher) = publisher {
            publisher.raise(events);
        }
    }

    fn with_cursor<T>(&self, id: SubscriberId, f: impl FnOnce(&mut Cursor) -> T) -> Result<T> {
        let mut inner = self.inner.lock();
        if matches!(inner.state, NodeState::Retired) {
            return Err(self.not_advertised());
        }
        let cursor = inner.cursors.get_mut(&id).ok_or_else(Self::detached)?;
        Ok(f(cursor))
    }

    /// Set the minimum delivery spacing of a subscription, in us
    pub fn set_interval(&self, id: SubscriberId, interval: u32) -> Result<()> {
        self.with_cursor(id, |cursor| cursor.interval = interval)?;
        self.notify_publisher(OrbEvents::STATE_CHANGED);
        Ok(())
    }

    /// Minimum delivery spacing of a subscription, in us
    pub fn interval(&self, id: SubscriberId) -> Result<u32> {
        self.with_cursor(id, |cursor| cursor.interval)
    }

    /// Record a batch interval request and forward it to the publisher
    pub fn request_batch_interval(&self, id: SubscriberId, batch_interval: u32) -> Result<()> {
        self.with_cursor(id, |cursor| {
            cursor.batch_interval = batch_interval;
            cursor.batch_pending = true;
        })?;
        self.notify_publisher(OrbEvents::BATCH_REQUESTED);
        Ok(())
    }

    /// Record a flush request and forward it to the publisher
    pub fn request_flush(&self, id: SubscriberId) -> Result<()> {
        self.with_cursor(id, |cursor| cursor.flush_pending = true)?;
        self.notify_publisher(OrbEvents::FLUSH_REQUESTED);
        Ok(())
    }

    /// Batch interval the publisher last confirmed, in us
    pub fn batch_interval(&self) -> u32 {
        self.inner.lock().batch_interval
    }

    fn complete_requests(&self, select: impl Fn(&mut Cursor) -> bool) {
        let completed: Vec<SubscriberId> = {
            let mut inner = self.inner.lock();
            inner
                .cursors
                .iter_mut()
                .filter_map(|(id, cursor)| select(cursor).then_some(*id))
                .collect()
        };

        let watchers = self.watchers.lock();
        for id in completed {
            if let Some(readiness) = watchers.subscribers.get(&id) {
                readiness.raise(OrbEvents::FLUSH_COMPLETE);
            }
        }
    }

    /// Publisher side: apply a batch interval and acknowledge requesters
    pub fn confirm_batch_interval(&self, batch_interval: u32) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, NodeState::Live(_)) {
                return Err(self.not_advertised());
            }
            inner.batch_interval = batch_interval;
        }
        self.complete_requests(|cursor| std::mem::take(&mut cursor.batch_pending));
        Ok(())
    }

    /// Publisher side: acknowledge pending flush requests
    pub fn flush_complete(&self) -> Result<()> {
        if !self.is_live() {
            return Err(self.not_advertised());
        }
        self.complete_requests(|cursor| std::mem::take(&mut cursor.flush_pending));
        Ok(())
    }

    /// Aggregate state across subscriptions
    pub fn state(&self) -> OrbState {
        let inner = self.inner.lock();
        let min_interval = inner
            .cursors
            .values()
            .map(|c| c.interval)
            .filter(|i| *i > 0)
            .min()
            .unwrap_or(0);
        let min_batch_interval = inner
            .cursors
            .values()
            .map(|c| c.batch_interval)
            .filter(|i| *i > 0)
            .min()
            .unwrap_or(0);
        let queue_size = match &inner.state {
            NodeState::Live(ring) => ring.queue_size(),
            _ => 0,
        };

        OrbState {
            max_frequency: interval_to_frequency(min_interval),
            min_batch_interval,
            queue_size,
            nsubscribers: inner.cursors.len() as u32,
            generation: inner.generation,
        }
    }

    /// Publisher side: describe the device behind this topic
    pub fn set_info(&self, info: DeviceInfo) -> Result<()> {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, NodeState::Live(_)) {
            return Err(self.not_advertised());
        }
        inner.info = Some(info);
        Ok(())
    }

    /// Device description, if the publisher provided one
    pub fn info(&self) -> Result<DeviceInfo> {
        let inner = self.inner.lock();
        if matches!(inner.state, NodeState::Retired) {
            return Err(self.not_advertised());
        }
        inner
            .info
            .clone()
            .ok_or_else(|| OrbError::unsupported("get_info: publisher provided no device info"))
    }

    /// Publisher side: install the handler for driver-specific controls
    pub fn set_control_handler(&self, handler: Option<Arc<dyn ControlHandler>>) -> Result<()> {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, NodeState::Live(_)) {
            return Err(self.not_advertised());
        }
        inner.control = handler;
        Ok(())
    }

    /// Forward a driver-specific control to the publisher's handler.
    ///
    /// The handler runs outside the node lock.
    pub fn control(&self, cmd: u32, arg: u64) -> Result<u64> {
        let handler = {
            let inner = self.inner.lock();
            match inner.state {
                NodeState::Retired => return Err(self.not_advertised()),
                _ => inner.control.clone(),
            }
        };
        match handler {
            Some(handler) => handler.control(cmd, arg),
            None => Err(OrbError::unsupported(format!("ioctl {:#x}", cmd))),
        }
    }
}
