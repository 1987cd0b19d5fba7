//! Registry of functions this worker can run.
//!
//! Every agent shares the worker's registry. After a reconnect the agent
//! re-announces each entry before asking for work, because a job server
//! forgets a worker's abilities when its socket goes away.
//!
//! # Example
//!
//! ```
//! use gearwire::capability::Capabilities;
//!
//! let caps = Capabilities::new();
//! caps.register("reverse", None);
//! caps.register("resize", Some(30));
//!
//! assert_eq!(caps.names(), ["resize", "reverse"]);
//! assert_eq!(caps.packets().len(), 2);
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::protocol::{OutboundPacket, PacketType};

/// Function names mapped to an optional per-job timeout in seconds.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    functions: Arc<RwLock<BTreeMap<String, Option<u32>>>>,
}

impl Capabilities {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a function. Returns `true` if it was new.
    pub fn register(&self, name: impl Into<String>, timeout_secs: Option<u32>) -> bool {
        let mut functions = self
            .functions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        functions.insert(name.into(), timeout_secs).is_none()
    }

    /// Remove a function. Returns `true` if it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let mut functions = self
            .functions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        functions.remove(name).is_some()
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.read(|functions| functions.contains_key(name))
    }

    /// Timeout registered for `name`, if any.
    pub fn timeout(&self, name: &str) -> Option<u32> {
        self.read(|functions| functions.get(name).copied().flatten())
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.read(|functions| functions.keys().cloned().collect())
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.read(BTreeMap::len)
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.read(BTreeMap::is_empty)
    }

    /// Announcement packets, one per function.
    ///
    /// `CAN_DO` carries the bare name; `CAN_DO_TIMEOUT` carries the name and
    /// the decimal timeout separated by NUL.
    pub fn packets(&self) -> Vec<OutboundPacket> {
        self.read(|functions| {
            functions
                .iter()
                .map(|(name, timeout)| match timeout {
                    None => OutboundPacket::new(PacketType::CAN_DO, name.clone().into_bytes()),
                    Some(secs) => {
                        let secs = secs.to_string();
                        OutboundPacket::with_args(
                            PacketType::CAN_DO_TIMEOUT,
                            &[name.as_bytes(), secs.as_bytes()],
                        )
                    }
                })
                .collect()
        })
    }

    fn read<T>(&self, f: impl FnOnce(&BTreeMap<String, Option<u32>>) -> T) -> T {
        let functions = self
            .functions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&functions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_unregister() {
        let caps = Capabilities::new();
        assert!(caps.is_empty());

        assert!(caps.register("reverse", None));
        assert!(!caps.register("reverse", Some(5)));
        assert_eq!(caps.len(), 1);
        assert_eq!(caps.timeout("reverse"), Some(5));

        assert!(caps.unregister("reverse"));
        assert!(!caps.unregister("reverse"));
        assert!(!caps.contains("reverse"));
    }

    #[test]
    fn test_clones_share_state() {
        let caps = Capabilities::new();
        let other = caps.clone();

        other.register("thumbnail", None);

        assert!(caps.contains("thumbnail"));
    }

    #[test]
    fn test_packets_encode_timeouts() {
        let caps = Capabilities::new();
        caps.register("reverse", None);
        caps.register("resize", Some(30));

        let packets = caps.packets();

        assert_eq!(packets.len(), 2);
        // sorted by name
        assert_eq!(packets[0].packet_type, PacketType::CAN_DO_TIMEOUT);
        assert_eq!(&packets[0].payload[..], b"resize\x0030");
        assert_eq!(packets[1].packet_type, PacketType::CAN_DO);
        assert_eq!(&packets[1].payload[..], b"reverse");
    }

    #[test]
    fn test_empty_registry_has_no_packets() {
        assert!(Capabilities::new().packets().is_empty());
    }
}
