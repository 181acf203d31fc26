//! Contributed tags for jsonteng
//!
//! This crate provides tags that are not part of the core engine.
//!
//! ## IPv4 tags
//!
//! Subnet arithmetic over CIDR network strings:
//!
//! ```json
//! {
//!   "subnet": ["#ipv4-subnet", "10.0.0.0/16", 4, 1],
//!   "host": ["#ipv4-host-ip", "10.0.0.0/24", 10],
//!   "gateway": ["#ipv4-host-gateway", "10.0.0.0/24"],
//!   "netmask": ["#ipv4-host-netmask", "10.0.0.0/24"]
//! }
//! ```
//!
//! resolves to
//!
//! ```json
//! {
//!   "subnet": "10.0.64.0/18",
//!   "host": "10.0.0.10",
//!   "gateway": "10.0.0.1",
//!   "netmask": "255.255.255.0"
//! }
//! ```

use std::sync::Arc;

use jsonteng_core::error::Result;
use jsonteng_core::tags::{register_global, Tag, TagRegistry};
use jsonteng_core::Error;

mod ipv4;

pub use ipv4::{Ipv4HostGatewayTag, Ipv4HostIpTag, Ipv4HostNetmaskTag, Ipv4SubnetTag};

/// Every contributed tag
pub fn tags() -> Vec<Arc<dyn Tag>> {
    vec![
        Arc::new(Ipv4SubnetTag),
        Arc::new(Ipv4HostIpTag),
        Arc::new(Ipv4HostGatewayTag),
        Arc::new(Ipv4HostNetmaskTag),
    ]
}

/// Names of every contributed tag
pub fn tag_names() -> Vec<String> {
    tags().iter().map(|t| t.name().to_string()).collect()
}

/// Register every contributed tag into `registry`
pub fn register(registry: &mut TagRegistry) {
    for tag in tags() {
        registry.register(tag);
    }
}

/// Register the named contributed tags into `registry`.
///
/// Fails on the first name that is not a contributed tag.
pub fn register_named<S: AsRef<str>>(registry: &mut TagRegistry, names: &[S]) -> Result<()> {
    let available = tags();
    for name in names {
        let name = name.as_ref();
        let tag = available
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| Error::unknown_tag(name))?;
        registry.register(Arc::clone(tag));
    }
    Ok(())
}

/// Register every contributed tag in the global registry.
///
/// Engines created afterwards can use them.
pub fn register_all() {
    for tag in tags() {
        // Use force=true to allow re-registration (e.g., during testing)
        let _ = register_global(tag, true);
    }
}
