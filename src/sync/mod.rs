//! Readiness signalling for broker handles
//!
//! Every handle owns a [`Readiness`]: an eventfd-backed [`EventNotifier`]
//! plus a set of pending priority [`OrbEvents`]. Publishes wake the
//! subscribers of a node; flush and batch requests wake its publisher and
//! their acknowledgements wake the requesting subscribers.
//!
//! [`EventLoop`] multiplexes many handles with mio and dispatches
//! callbacks per [`EventMask`] of interest.

pub mod events;
pub mod notify;
pub mod reactor;
pub mod readiness;

pub use events::{EventMask, OrbEvents};
pub use notify::{EventNotifier, NotificationStats};
pub use reactor::{Callback, EventLoop, LoopExit};
pub use readiness::Readiness;
