//! Topic metadata: the compile-time identity and size contract of a topic
//!
//! A topic is declared once with [`orb_define!`](crate::orb_define) as a
//! `static` [`OrbMetadata`]. The address of that static is the topic's
//! identity; every instance node of the topic points back at it. The
//! [`TopicCatalog`] makes declared topics reachable by name.

pub mod catalog;
pub mod types;

pub use catalog::TopicCatalog;
pub use types::{MetaId, OrbMetadata, OrbObject};

/// Declare a topic as a `static` [`OrbMetadata`].
///
/// ```
/// use orbit::orb_define;
///
/// orb_define!(pub ORB_SENSOR_BARO, "sensor_baro", 24);
/// assert_eq!(ORB_SENSOR_BARO.size(), 24);
/// ```
#[macro_export]
macro_rules! orb_define {
    ($vis:vis $ident:ident, $name:literal, $size:expr) => {
        $vis static $ident: $crate::metadata::OrbMetadata =
            $crate::metadata::OrbMetadata::new($name, $size);
    };
}
