//! Public broker entry point

use std::sync::Arc;

use log::info;

use crate::{
    config::BrokerConfig,
    error::{OrbError, Result},
    metadata::{OrbMetadata, OrbObject},
    sync::Readiness,
    topic::{NodeStatsSnapshot, OrbState},
};

use super::{
    handles::{Publisher, Subscriber},
    registry::{AdvertiseRequest, InstanceRegistry},
    stats::BrokerStatsSnapshot,
};

/// Summary of one registered node, as listed by [`Broker::objects`]
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSummary {
    /// Topic and instance
    pub object: OrbObject,
    /// Whether a publisher is attached
    pub live: bool,
    /// Node state
    pub state: OrbState,
    /// Node counters
    pub stats: NodeStatsSnapshot,
}

/// Topic broker
///
/// Cloning is cheap and every clone talks to the same registry. Handles
/// keep the registry alive on their own, so the broker value may be dropped
/// while publishers and subscribers are still open.
#[derive(Debug, Clone)]
pub struct Broker {
    shared: Arc<InstanceRegistry>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    /// Create a broker with the default configuration
    pub fn new() -> Self {
        Self {
            shared: Arc::new(InstanceRegistry::new(BrokerConfig::default())),
        }
    }

    /// Create a broker with a custom configuration
    pub fn with_config(config: BrokerConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "creating broker (max instances {}, max queue {})",
            config.max_instances, config.max_queue_size
        );
        Ok(Self {
            shared: Arc::new(InstanceRegistry::new(config)),
        })
    }

    /// Broker configuration
    pub fn config(&self) -> &BrokerConfig {
        &self.shared.config
    }

    /// Make a topic known to this broker
    pub fn register(&self, meta: &'static OrbMetadata) -> Result<()> {
        self.shared.catalog.register(meta)
    }

    /// Look a registered topic up by name (an instance suffix is ignored)
    pub fn get_meta(&self, name: &str) -> Option<&'static OrbMetadata> {
        self.shared.catalog.get_meta(name)
    }

    /// Registered topics sorted by name
    pub fn topics(&self) -> Vec<&'static OrbMetadata> {
        self.shared.catalog.topics()
    }

    fn readiness(&self) -> Result<Arc<Readiness>> {
        Ok(Arc::new(Readiness::new(self.shared.config.notifications)?))
    }

    fn advertise_with(
        &self,
        meta: &'static OrbMetadata,
        request: AdvertiseRequest<'_>,
    ) -> Result<Publisher> {
        let readiness = self.readiness()?;
        let node = self.shared.advertise(meta, request, readiness.clone())?;
        Ok(Publisher::new(self.shared.clone(), node, readiness))
    }

    /// Advertise instance 0 with the default queue size
    pub fn advertise(&self, meta: &'static OrbMetadata, data: Option<&[u8]>) -> Result<Publisher> {
        self.advertise_multi_queue(meta, data, Some(0), 0)
    }

    /// Advertise instance 0 with `queue_size` slots
    pub fn advertise_queue(
        &self,
        meta: &'static OrbMetadata,
        data: Option<&[u8]>,
        queue_size: u32,
    ) -> Result<Publisher> {
        self.advertise_multi_queue(meta, data, Some(0), queue_size)
    }

    /// Advertise `instance`, or the lowest free instance when `None`
    pub fn advertise_multi(
        &self,
        meta: &'static OrbMetadata,
        data: Option<&[u8]>,
        instance: Option<u32>,
    ) -> Result<Publisher> {
        self.advertise_multi_queue(meta, data, instance, 0)
    }

    /// Advertise with every option; `queue_size` 0 selects the default.
    ///
    /// Subscriptions opened on the instance before this call do not see
    /// `data`; they start with the first explicit publish.
    pub fn advertise_multi_queue(
        &self,
        meta: &'static OrbMetadata,
        data: Option<&[u8]>,
        instance: Option<u32>,
        queue_size: u32,
    ) -> Result<Publisher> {
        self.advertise_with(
            meta,
            AdvertiseRequest {
                initial: data,
                instance,
                queue_size,
                persistent: false,
            },
        )
    }

    /// Persistent advertise of instance 0 with the default queue size
    pub fn advertise_persist(
        &self,
        meta: &'static OrbMetadata,
        data: Option<&[u8]>,
    ) -> Result<Publisher> {
        self.advertise_multi_queue_persist(meta, data, Some(0), 0)
    }

    /// Persistent advertise.
    ///
    /// `data` becomes the first record and is visible to subscriptions
    /// opened before this call as well as to later ones.
    pub fn advertise_multi_queue_persist(
        &self,
        meta: &'static OrbMetadata,
        data: Option<&[u8]>,
        instance: Option<u32>,
        queue_size: u32,
    ) -> Result<Publisher> {
        self.advertise_with(
            meta,
            AdvertiseRequest {
                initial: data,
                instance,
                queue_size,
                persistent: true,
            },
        )
    }

    /// Publish through `slot`, advertising on first use.
    ///
    /// The first call advertises persistently with `data` as the initial
    /// record; later calls publish on the stored publisher. Returns the
    /// instance in use.
    pub fn publish_auto(
        &self,
        slot: &mut Option<Publisher>,
        meta: &'static OrbMetadata,
        data: &[u8],
        instance: Option<u32>,
    ) -> Result<u32> {
        match slot {
            Some(publisher) => {
                publisher.publish(data)?;
                Ok(publisher.instance())
            }
            None => {
                let publisher = self.advertise_multi_queue_persist(meta, Some(data), instance, 0)?;
                let instance = publisher.instance();
                *slot = Some(publisher);
                Ok(instance)
            }
        }
    }

    /// Subscribe to instance 0
    pub fn subscribe(&self, meta: &'static OrbMetadata) -> Result<Subscriber> {
        self.subscribe_multi(meta, 0)
    }

    /// Subscribe to `instance`, advertised or not.
    ///
    /// Succeeds for any registered topic and any `instance` below
    /// `max_instances`; an unadvertised instance gets a ghost node that the
    /// first publisher promotes. Fails with `NotFound` for an unregistered
    /// topic and with `InvalidParameter` for an out-of-range instance, since
    /// such an instance could never be advertised.
    pub fn subscribe_multi(&self, meta: &'static OrbMetadata, instance: u32) -> Result<Subscriber> {
        let readiness = self.readiness()?;
        let (node, id) = self.shared.subscribe(meta, instance, readiness.clone())?;
        Ok(Subscriber::new(self.shared.clone(), node, id, readiness))
    }

    /// Subscribe to an advertised object by name.
    ///
    /// `name` may carry the instance as a suffix (`sensor_accel1`); an
    /// explicit `instance` wins over the suffix.
    pub fn open(&self, name: &str, instance: Option<u32>) -> Result<Subscriber> {
        let (meta, suffix) = self
            .shared
            .catalog
            .lookup(name)
            .ok_or_else(|| OrbError::not_found(name))?;
        let instance = instance.or(suffix).unwrap_or(0);
        if !self.exists(meta, instance) {
            return Err(OrbError::not_advertised(meta.name(), instance));
        }
        self.subscribe_multi(meta, instance)
    }

    /// Whether `instance` has a live publisher
    pub fn exists(&self, meta: &'static OrbMetadata, instance: u32) -> bool {
        self.shared.exists(meta, instance)
    }

    /// Number of live instances of `meta`
    pub fn group_count(&self, meta: &'static OrbMetadata) -> u32 {
        self.shared.group_count(meta)
    }

    /// State of a registered node
    pub fn get_state(&self, meta: &'static OrbMetadata, instance: u32) -> Result<OrbState> {
        self.shared
            .node(meta, instance)
            .map(|node| node.state())
            .ok_or_else(|| OrbError::not_advertised(meta.name(), instance))
    }

    /// Every registered node, ghosts included, sorted by name then instance
    pub fn objects(&self) -> Vec<ObjectSummary> {
        self.shared
            .nodes()
            .into_iter()
            .map(|node| ObjectSummary {
                object: node.object(),
                live: node.is_live(),
                state: node.state(),
                stats: node.stats().snapshot(),
            })
            .collect()
    }

    /// Path naming `instance` of `meta` under the configured prefix
    pub fn object_path(&self, meta: &'static OrbMetadata, instance: u32) -> String {
        OrbObject::new(meta, instance).path(&self.shared.config.device_prefix)
    }

    /// Broker-wide counters
    pub fn stats(&self) -> BrokerStatsSnapshot {
        self.shared.stats.snapshot()
    }
}
