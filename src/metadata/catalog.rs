//! Name lookup for declared topics

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{OrbError, Result};

use super::types::OrbMetadata;

/// Registry of topic descriptors known to a broker
#[derive(Debug, Default)]
pub struct TopicCatalog {
    by_name: RwLock<HashMap<&'static str, &'static OrbMetadata>>,
}

impl TopicCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor.
    ///
    /// Registering the same descriptor twice is a no-op. A different
    /// descriptor reusing a registered name is rejected.
    pub fn register(&self, meta: &'static OrbMetadata) -> Result<()> {
        if meta.name().is_empty() {
            return Err(OrbError::invalid_parameter("name", "Topic name cannot be empty"));
        }
        if meta.size() == 0 {
            return Err(OrbError::invalid_parameter("size", "Topic payload cannot be empty"));
        }

        let mut by_name = self.by_name.write();
        match by_name.get(meta.name()) {
            Some(existing) if existing.id() == meta.id() => Ok(()),
            Some(_) => Err(OrbError::invalid_parameter(
                "name",
                format!("{} is already declared by another descriptor", meta.name()),
            )),
            None => {
                by_name.insert(meta.name(), meta);
                Ok(())
            }
        }
    }

    /// Whether this exact descriptor is registered
    pub fn contains(&self, meta: &'static OrbMetadata) -> bool {
        self.by_name
            .read()
            .get(meta.name())
            .map(|m| m.id() == meta.id())
            .unwrap_or(false)
    }

    /// Fail with `NotFound` unless the descriptor is registered
    pub fn ensure_known(&self, meta: &'static OrbMetadata) -> Result<()> {
        if self.contains(meta) {
            Ok(())
        } else {
            Err(OrbError::not_found(meta.name()))
        }
    }

    /// Look a topic up by name.
    ///
    /// Accepts both the bare name (`sensor_accel`) and an object name with a
    /// trailing instance number (`sensor_accel1`); the parsed instance is
    /// returned alongside.
    pub fn lookup(&self, name: &str) -> Option<(&'static OrbMetadata, Option<u32>)> {
        let by_name = self.by_name.read();
        if let Some(meta) = by_name.get(name) {
            return Some((*meta, None));
        }

        let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
        if stem.len() == name.len() {
            return None;
        }

        let instance = name[stem.len()..].parse::<u32>().ok()?;
        by_name.get(stem).map(|meta| (*meta, Some(instance)))
    }

    /// Look up the descriptor for a name, ignoring any instance suffix
    pub fn get_meta(&self, name: &str) -> Option<&'static OrbMetadata> {
        self.lookup(name).map(|(meta, _)| meta)
    }

    /// All registered descriptors, sorted by name
    pub fn topics(&self) -> Vec<&'static OrbMetadata> {
        let mut topics: Vec<_> = self.by_name.read().values().copied().collect();
        topics.sort_by_key(|meta| meta.name());
        topics
    }

    /// Number of registered topics
    pub fn len(&self) -> usize {
        self.by_name.read().len()
    }

    /// Whether no topic is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SENSOR_ACCEL: OrbMetadata = OrbMetadata::new("sensor_accel", 16);
    static SENSOR_ACCEL_IMPOSTOR: OrbMetadata = OrbMetadata::new("sensor_accel", 16);
    static SENSOR_GYRO: OrbMetadata = OrbMetadata::new("sensor_gyro", 16);
    static EMPTY_PAYLOAD: OrbMetadata = OrbMetadata::new("empty", 0);

    #[test]
    fn test_register_and_lookup() {
        let catalog = TopicCatalog::new();
        catalog.register(&SENSOR_ACCEL).unwrap();
        catalog.register(&SENSOR_ACCEL).unwrap();
        catalog.register(&SENSOR_GYRO).unwrap();
        assert_eq!(catalog.len(), 2);

        let (meta, instance) = catalog.lookup("sensor_accel").unwrap();
        assert_eq!(meta.id(), SENSOR_ACCEL.id());
        assert_eq!(instance, None);

        let (meta, instance) = catalog.lookup("sensor_gyro12").unwrap();
        assert_eq!(meta.id(), SENSOR_GYRO.id());
        assert_eq!(instance, Some(12));

        assert!(catalog.lookup("sensor_mag0").is_none());
        assert!(catalog.lookup("sensor_accelX").is_none());
    }

    #[test]
    fn test_register_rejects_conflicts() {
        let catalog = TopicCatalog::new();
        catalog.register(&SENSOR_ACCEL).unwrap();
        assert!(catalog.register(&SENSOR_ACCEL_IMPOSTOR).is_err());
        assert!(catalog.register(&EMPTY_PAYLOAD).is_err());

        assert!(catalog.contains(&SENSOR_ACCEL));
        assert!(!catalog.contains(&SENSOR_ACCEL_IMPOSTOR));
        assert!(matches!(
            catalog.ensure_known(&SENSOR_GYRO),
            Err(OrbError::NotFound { .. })
        ));
    }

    #[test]
    fn test_topics_sorted() {
        let catalog = TopicCatalog::new();
        catalog.register(&SENSOR_GYRO).unwrap();
        catalog.register(&SENSOR_ACCEL).unwrap();
        let names: Vec<_> = catalog.topics().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["sensor_accel", "sensor_gyro"]);
    }
}
