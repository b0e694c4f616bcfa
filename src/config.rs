//! Broker configuration

use serde::{Deserialize, Serialize};

use crate::error::{OrbError, Result};

/// Default number of instance slots per topic
pub const DEFAULT_MAX_INSTANCES: u32 = 16;

/// Default ring depth when a publisher asks for queue size 0
pub const DEFAULT_QUEUE_SIZE: u32 = 1;

/// Upper bound on ring depth
pub const DEFAULT_MAX_QUEUE_SIZE: u32 = 256;

/// Prefix under which topic objects are named
pub const ORB_SENSOR_PATH: &str = "/dev/uorb/";

/// Configuration for a [`Broker`](crate::Broker)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Instance slots available per topic
    pub max_instances: u32,
    /// Ring depth used when advertise passes 0
    pub default_queue_size: u32,
    /// Largest ring depth a publisher may request
    pub max_queue_size: u32,
    /// Whether publishes wake blocked readers
    pub notifications: bool,
    /// Prefix for object paths
    pub device_prefix: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_instances: DEFAULT_MAX_INSTANCES,
            default_queue_size: DEFAULT_QUEUE_SIZE,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            notifications: true,
            device_prefix: ORB_SENSOR_PATH.to_string(),
        }
    }
}

impl BrokerConfig {
    /// Set the number of instance slots per topic
    pub fn with_max_instances(mut self, max_instances: u32) -> Self {
        self.max_instances = max_instances;
        self
    }

    /// Set the default ring depth
    pub fn with_default_queue_size(mut self, queue_size: u32) -> Self {
        self.default_queue_size = queue_size;
        self
    }

    /// Set the maximum ring depth
    pub fn with_max_queue_size(mut self, queue_size: u32) -> Self {
        self.max_queue_size = queue_size;
        self
    }

    /// Enable or disable reader wakeups
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications = enabled;
        self
    }

    /// Set the object path prefix
    pub fn with_device_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.device_prefix = prefix.into();
        self
    }

    /// Resolve a requested queue size against the configured bounds
    pub fn resolve_queue_size(&self, requested: u32) -> Result<u32> {
        let queue_size = if requested == 0 {
            self.default_queue_size
        } else {
            requested
        };

        if queue_size > self.max_queue_size {
            return Err(OrbError::invalid_parameter(
                "queue_size",
                format!("{} exceeds maximum {}", queue_size, self.max_queue_size),
            ));
        }

        Ok(queue_size)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_instances == 0 {
            return Err(OrbError::invalid_parameter(
                "max_instances",
                "At least one instance slot is required",
            ));
        }

        if self.default_queue_size == 0 {
            return Err(OrbError::invalid_parameter(
                "default_queue_size",
                "Default queue size cannot be zero",
            ));
        }

        if self.default_queue_size > self.max_queue_size {
            return Err(OrbError::invalid_parameter(
                "default_queue_size",
                "Default queue size cannot exceed max queue size",
            ));
        }

        if self.device_prefix.is_empty() {
            return Err(OrbError::invalid_parameter(
                "device_prefix",
                "Device prefix cannot be empty",
            ));
        }

        Ok(())
    }
}
