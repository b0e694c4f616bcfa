//! Metadata types

use std::fmt;

/// Compile-time descriptor of a topic: unique name and payload size.
///
/// Identity is the address of the descriptor, so two descriptors with the
/// same name are still different topics. Always declare through
/// [`orb_define!`](crate::orb_define) so the descriptor lives in a `static`.
#[derive(Debug)]
pub struct OrbMetadata {
    name: &'static str,
    size: u16,
}

impl OrbMetadata {
    /// Create a descriptor (use from a `static` initializer)
    pub const fn new(name: &'static str, size: u16) -> Self {
        Self { name, size }
    }

    /// Topic name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// Address-based identity of this descriptor
    pub fn id(&'static self) -> MetaId {
        MetaId(self as *const OrbMetadata as usize)
    }
}

/// Identity of an [`OrbMetadata`], comparable and hashable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetaId(usize);

/// A topic instance: metadata plus instance number
#[derive(Debug, Clone, Copy)]
pub struct OrbObject {
    pub meta: &'static OrbMetadata,
    pub instance: u32,
}

impl OrbObject {
    /// Create a new object reference
    pub fn new(meta: &'static OrbMetadata, instance: u32) -> Self {
        Self { meta, instance }
    }

    /// Path of this object under `prefix`, e.g. `/dev/uorb/sensor_accel0`
    pub fn path(&self, prefix: &str) -> String {
        format!("{}{}{}", prefix, self.meta.name(), self.instance)
    }
}

impl PartialEq for OrbObject {
    fn eq(&self, other: &Self) -> bool {
        self.meta.id() == other.meta.id() && self.instance == other.instance
    }
}

impl Eq for OrbObject {}

impl fmt::Display for OrbObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.meta.name(), self.instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ORB_A: OrbMetadata = OrbMetadata::new("orb_a", 8);
    static ORB_A_TWIN: OrbMetadata = OrbMetadata::new("orb_a", 8);

    #[test]
    fn test_identity_is_address() {
        assert_eq!(ORB_A.id(), ORB_A.id());
        assert_ne!(ORB_A.id(), ORB_A_TWIN.id());
        assert_eq!(ORB_A.name(), ORB_A_TWIN.name());
    }

    #[test]
    fn test_object_path_and_display() {
        let object = OrbObject::new(&ORB_A, 2);
        assert_eq!(object.path("/dev/uorb/"), "/dev/uorb/orb_a2");
        assert_eq!(object.to_string(), "orb_a2");
        assert_ne!(object, OrbObject::new(&ORB_A_TWIN, 2));
        assert_eq!(object, OrbObject::new(&ORB_A, 2));
    }
}
