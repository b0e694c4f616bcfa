//! Instance registry: (topic, instance) to node
//!
//! The registry lock only guards the instance table. It may be held while a
//! node lock is taken (registry then node), never the other way round, and
//! never on the publish/copy path.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use log::{debug, info};
use parking_lot::Mutex;

use crate::{
    config::BrokerConfig,
    error::{OrbError, Result},
    metadata::{MetaId, OrbMetadata, TopicCatalog},
    ringbuf::GenerationRing,
    sync::Readiness,
    time::absolute_time,
    topic::{SubscriberId, TopicNode},
};

use super::stats::BrokerStats;

type InstanceTable = BTreeMap<u32, Arc<TopicNode>>;

/// What an advertise call asks for
#[derive(Debug, Clone, Copy)]
pub(crate) struct AdvertiseRequest<'a> {
    pub initial: Option<&'a [u8]>,
    pub instance: Option<u32>,
    pub queue_size: u32,
    pub persistent: bool,
}

/// Shared broker state behind every [`Broker`](super::Broker) clone and handle
#[derive(Debug)]
pub(crate) struct InstanceRegistry {
    pub(crate) config: BrokerConfig,
    pub(crate) catalog: TopicCatalog,
    nodes: Mutex<HashMap<MetaId, InstanceTable>>,
    pub(crate) stats: BrokerStats,
}

impl InstanceRegistry {
    pub(crate) fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            catalog: TopicCatalog::new(),
            nodes: Mutex::new(HashMap::new()),
            stats: BrokerStats::default(),
        }
    }

    fn check_instance(&self, instance: u32) -> Result<()> {
        if instance >= self.config.max_instances {
            return Err(OrbError::invalid_parameter(
                "instance",
                format!(
                    "Instance {} out of range (max {})",
                    instance, self.config.max_instances
                ),
            ));
        }
        Ok(())
    }

    fn node_or_ghost(
        &self,
        table: &mut InstanceTable,
        meta: &'static OrbMetadata,
        instance: u32,
    ) -> Arc<TopicNode> {
        table
            .entry(instance)
            .or_insert_with(|| {
                BrokerStats::bump(&self.stats.nodes_created);
                Arc::new(TopicNode::ghost(meta, instance))
            })
            .clone()
    }

    /// Claim an instance and promote its node to live
    pub(crate) fn advertise(
        &self,
        meta: &'static OrbMetadata,
        request: AdvertiseRequest<'_>,
        publisher: Arc<Readiness>,
    ) -> Result<Arc<TopicNode>> {
        self.catalog.ensure_known(meta)?;
        if let Some(data) = request.initial {
            if data.len() != meta.size() {
                return Err(OrbError::size_mismatch(meta.name(), meta.size(), data.len()));
            }
        }
        if let Some(instance) = request.instance {
            self.check_instance(instance)?;
        }

        let queue_size = self.config.resolve_queue_size(request.queue_size)?;
        let ring = GenerationRing::new(queue_size, meta.size())?;
        let initial = request.initial.map(|data| (data, absolute_time()));

        let mut nodes = self.nodes.lock();
        let table = nodes.entry(meta.id()).or_default();

        let instance = match request.instance {
            Some(instance) => instance,
            None => (0..self.config.max_instances)
                .find(|i| table.get(i).map_or(true, |node| !node.is_live()))
                .ok_or_else(|| OrbError::NoFreeInstance {
                    name: meta.name().to_string(),
                    max: self.config.max_instances,
                })?,
        };

        let node = self.node_or_ghost(table, meta, instance);
        if let Err(e) = node.promote(ring, initial, request.persistent, publisher) {
            if node.is_ghost() && node.subscriber_count() == 0 {
                table.remove(&instance);
                BrokerStats::bump(&self.stats.nodes_removed);
            }
            return Err(e);
        }

        BrokerStats::bump(&self.stats.advertisements);
        info!(
            "advertised {}{} (queue {}, persistent: {})",
            meta.name(),
            instance,
            queue_size,
            request.persistent
        );
        Ok(node)
    }

    /// Attach a subscription, creating a ghost node when needed
    pub(crate) fn subscribe(
        &self,
        meta: &'static OrbMetadata,
        instance: u32,
        readiness: Arc<Readiness>,
    ) -> Result<(Arc<TopicNode>, SubscriberId)> {
        self.catalog.ensure_known(meta)?;
        self.check_instance(instance)?;

        let mut nodes = self.nodes.lock();
        let table = nodes.entry(meta.id()).or_default();
        let node = self.node_or_ghost(table, meta, instance);
        // Attached under the registry lock so a concurrent reap cannot
        // drop the node between lookup and attach
        let id = node.attach_subscriber(readiness);
        drop(nodes);

        BrokerStats::bump(&self.stats.subscriptions);
        debug!("subscribed to {}{} as {}", meta.name(), instance, id);
        Ok((node, id))
    }

    /// Remove `node` from the table if it is still the registered one
    fn remove_node(&self, nodes: &mut HashMap<MetaId, InstanceTable>, node: &Arc<TopicNode>) {
        let key = node.meta().id();
        let Some(table) = nodes.get_mut(&key) else {
            return;
        };
        let registered = table
            .get(&node.instance())
            .map_or(false, |current| Arc::ptr_eq(current, node));
        if registered {
            table.remove(&node.instance());
            BrokerStats::bump(&self.stats.nodes_removed);
        }
        if table.is_empty() {
            nodes.remove(&key);
        }
    }

    /// Detach a subscription and reap its node if it was an orphan ghost
    pub(crate) fn unsubscribe(&self, node: &Arc<TopicNode>, id: SubscriberId) {
        let mut nodes = self.nodes.lock();
        let remaining = node.detach_subscriber(id);
        if remaining == 0 && node.is_ghost() {
            debug!("reaping ghost {}", node.object());
            self.remove_node(&mut nodes, node);
        }
        drop(nodes);
        BrokerStats::bump(&self.stats.unsubscriptions);
    }

    /// Retire a live node and drop it from the table
    pub(crate) fn unadvertise(&self, node: &Arc<TopicNode>) {
        let mut nodes = self.nodes.lock();
        node.retire();
        self.remove_node(&mut nodes, node);
        drop(nodes);
        BrokerStats::bump(&self.stats.unadvertisements);
        info!("unadvertised {}", node.object());
    }

    /// Registered node for (meta, instance), ghost or live
    pub(crate) fn node(&self, meta: &'static OrbMetadata, instance: u32) -> Option<Arc<TopicNode>> {
        self.nodes
            .lock()
            .get(&meta.id())
            .and_then(|table| table.get(&instance))
            .cloned()
    }

    /// Whether (meta, instance) has a live publisher
    pub(crate) fn exists(&self, meta: &'static OrbMetadata, instance: u32) -> bool {
        self.node(meta, instance)
            .map_or(false, |node| node.is_live())
    }

    /// Number of live instances of `meta`
    pub(crate) fn group_count(&self, meta: &'static OrbMetadata) -> u32 {
        let nodes = self.nodes.lock();
        nodes
            .get(&meta.id())
            .map_or(0, |table| table.values().filter(|node| node.is_live()).count() as u32)
    }

    /// Every registered node, sorted by topic name then instance
    pub(crate) fn nodes(&self) -> Vec<Arc<TopicNode>> {
        let mut all: Vec<_> = self
            .nodes
            .lock()
            .values()
            .flat_map(|table| table.values().cloned())
            .collect();
        all.sort_by(|a, b| {
            (a.meta().name(), a.instance()).cmp(&(b.meta().name(), b.instance()))
        });
        all
    }
}
