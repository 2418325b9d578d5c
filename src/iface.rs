//! Interface inventory
//!
//! Read-only after startup: built from configuration, shared with the
//! datapath workers behind an `Arc`.

use crate::protocol::ipv6::is_link_local;
use crate::protocol::MacAddr;
use std::collections::HashMap;
use std::net::Ipv6Addr;

/// Sentinel interface id meaning "any interface in this vrf"
pub const IFACE_ID_UNDEF: u16 = u16::MAX;

/// A network interface and its IPv6 addresses
#[derive(Debug, Clone)]
pub struct Iface {
    pub id: u16,
    pub name: String,
    pub vrf_id: u16,
    pub mac: MacAddr,
    /// Assigned addresses with prefix length
    pub addrs: Vec<(Ipv6Addr, u8)>,
}

impl Iface {
    pub fn has_addr(&self, addr: &Ipv6Addr) -> bool {
        self.addrs.iter().any(|(a, _)| a == addr)
    }

    /// Select the source address for a packet toward `dst` (RFC 6724,
    /// reduced to the scope rule): link-local destinations get a link-local
    /// source, everything else prefers a global address.
    pub fn preferred_source(&self, dst: &Ipv6Addr) -> Option<Ipv6Addr> {
        let want_link_local = is_link_local(dst) || dst.is_multicast();
        self.addrs
            .iter()
            .find(|(a, _)| is_link_local(a) == want_link_local)
            .or_else(|| self.addrs.first())
            .map(|(a, _)| *a)
    }
}

/// Interface inventory indexed by id
#[derive(Debug, Default)]
pub struct IfaceTable {
    by_id: HashMap<u16, Iface>,
}

impl IfaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, iface: Iface) {
        self.by_id.insert(iface.id, iface);
    }

    pub fn from_id(&self, id: u16) -> Option<&Iface> {
        self.by_id.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Iface> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
