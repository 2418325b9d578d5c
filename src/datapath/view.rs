//! Published neighbor view
//!
//! The control thread owns the next-hop pool outright. What the datapath
//! workers need from it (flags and link-layer addresses) is published here
//! as an immutable snapshot behind an `ArcSwap`: readers load without
//! locking, the control thread republishes after each mutation batch.

use crate::nexthop::{NhFlags, NhIdx, NhPool};
use crate::protocol::MacAddr;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::sync::Arc;

/// Datapath-visible projection of one next-hop
#[derive(Debug, Clone, Copy)]
pub struct NhView {
    pub idx: NhIdx,
    pub vrf_id: u16,
    pub iface_id: u16,
    pub addr: Ipv6Addr,
    pub lladdr: MacAddr,
    pub flags: NhFlags,
}

/// Immutable snapshot of the live neighbor set
#[derive(Debug, Default)]
pub struct NeighborView {
    by_key: HashMap<(u16, u16, Ipv6Addr), NhView>,
    by_idx: HashMap<NhIdx, NhView>,
}

impl NeighborView {
    /// Project the current pool contents.
    pub fn snapshot(pool: &NhPool) -> Self {
        let mut view = Self::default();
        for (idx, nh) in pool.iter() {
            let entry = NhView {
                idx,
                vrf_id: nh.vrf_id,
                iface_id: nh.iface_id,
                addr: nh.addr,
                lladdr: nh.lladdr,
                flags: nh.flags,
            };
            view.by_key.insert((nh.vrf_id, nh.iface_id, nh.addr), entry);
            view.by_idx.insert(idx, entry);
        }
        view
    }

    pub fn lookup(&self, vrf_id: u16, iface_id: u16, addr: &Ipv6Addr) -> Option<&NhView> {
        self.by_key.get(&(vrf_id, iface_id, *addr))
    }

    pub fn get(&self, idx: NhIdx) -> Option<&NhView> {
        self.by_idx.get(&idx)
    }

    pub fn len(&self) -> usize {
        self.by_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_idx.is_empty()
    }
}

/// Handle shared between the control thread (writer) and workers (readers)
#[derive(Debug, Default)]
pub struct SharedNeighborView(ArcSwap<NeighborView>);

impl SharedNeighborView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Arc<NeighborView> {
        self.0.load_full()
    }

    pub fn publish(&self, view: NeighborView) {
        self.0.store(Arc::new(view));
    }
}
