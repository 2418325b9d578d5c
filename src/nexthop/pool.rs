//! Fixed-capacity next-hop arena
//!
//! Slot indices are stable for a record's lifetime, so datapath workers can
//! carry an index while a packet is in flight. Capacity is fixed at
//! construction, which also bounds what a flood of unresolvable
//! destinations can allocate.

use super::{AddrFamily, Nexthop, NhFlags, NhIdx, NhTunables};
use crate::iface::IFACE_ID_UNDEF;
use crate::{Error, Result};
use std::collections::HashMap;
use std::net::Ipv6Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct NhKey {
    vrf_id: u16,
    iface_id: u16,
    addr: Ipv6Addr,
}

/// Arena of next-hop records with a `(vrf, iface, addr)` index
#[derive(Debug)]
pub struct NhPool {
    af: AddrFamily,
    tunables: NhTunables,
    slots: Vec<Option<Nexthop>>,
    index: HashMap<NhKey, usize>,
    free: Vec<usize>,
}

impl NhPool {
    pub fn new(af: AddrFamily, tunables: NhTunables) -> Self {
        let capacity = tunables.max_nexthops;
        Self {
            af,
            tunables,
            slots: (0..capacity).map(|_| None).collect(),
            index: HashMap::new(),
            free: (0..capacity).rev().collect(),
        }
    }

    pub fn af(&self) -> AddrFamily {
        self.af
    }

    pub fn tunables(&self) -> &NhTunables {
        &self.tunables
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Allocate a record for a new `(vrf, iface, addr)` tuple.
    ///
    /// Initial state: empty flags, zero counters, empty hold queue.
    pub fn create(&mut self, vrf_id: u16, iface_id: u16, addr: Ipv6Addr) -> Result<NhIdx> {
        let key = NhKey {
            vrf_id,
            iface_id,
            addr,
        };
        if self.index.contains_key(&key) {
            return Err(Error::Exists);
        }
        let slot = self
            .free
            .pop()
            .ok_or_else(|| Error::Resource("next-hop pool full".into()))?;

        self.slots[slot] = Some(Nexthop::new(vrf_id, iface_id, addr));
        self.index.insert(key, slot);
        Ok(NhIdx(slot as u32))
    }

    /// Exact-tuple lookup. `IFACE_ID_UNDEF` as the query matches any
    /// interface in the vrf (used by API deletion); a record keyed with
    /// `IFACE_ID_UNDEF` (its interface not yet learned) matches any query.
    pub fn lookup(&self, vrf_id: u16, iface_id: u16, addr: &Ipv6Addr) -> Option<NhIdx> {
        if iface_id == IFACE_ID_UNDEF {
            return self
                .index
                .iter()
                .find(|(k, _)| k.vrf_id == vrf_id && k.addr == *addr)
                .map(|(_, &slot)| NhIdx(slot as u32));
        }
        let mut key = NhKey {
            vrf_id,
            iface_id,
            addr: *addr,
        };
        if let Some(&slot) = self.index.get(&key) {
            return Some(NhIdx(slot as u32));
        }
        key.iface_id = IFACE_ID_UNDEF;
        self.index.get(&key).map(|&slot| NhIdx(slot as u32))
    }

    pub fn get(&self, idx: NhIdx) -> Option<&Nexthop> {
        self.slots.get(idx.as_usize())?.as_ref()
    }

    pub fn get_mut(&mut self, idx: NhIdx) -> Option<&mut Nexthop> {
        self.slots.get_mut(idx.as_usize())?.as_mut()
    }

    /// Move a record to another interface, rekeying the index. Refuses
    /// when the target tuple is already taken by another record.
    pub fn set_iface(&mut self, idx: NhIdx, iface_id: u16) -> bool {
        let Some(nh) = self.slots.get(idx.as_usize()).and_then(|s| s.as_ref()) else {
            return false;
        };
        let old = NhKey {
            vrf_id: nh.vrf_id,
            iface_id: nh.iface_id,
            addr: nh.addr,
        };
        if old.iface_id == iface_id {
            return true;
        }
        let new = NhKey { iface_id, ..old };
        if self.index.contains_key(&new) {
            return false;
        }
        self.index.remove(&old);
        self.index.insert(new, idx.as_usize());
        self.slots[idx.as_usize()].as_mut().expect("live slot").iface_id = iface_id;
        true
    }

    pub fn incref(&mut self, idx: NhIdx) {
        if let Some(nh) = self.get_mut(idx) {
            nh.incref();
        }
    }

    /// Drop one reference. Returns `true` when the record reached zero
    /// references and carries no infrastructure flag: the caller must
    /// unwire any remaining routes and then call [`NhPool::release`].
    pub fn decref(&mut self, idx: NhIdx) -> bool {
        match self.get_mut(idx) {
            Some(nh) => nh.decref() == 0 && !nh.flags.intersects(NhFlags::INFRA),
            None => false,
        }
    }

    /// Clear a slot. Held packets go down with the record.
    pub fn release(&mut self, idx: NhIdx) -> Option<Nexthop> {
        let nh = self.slots.get_mut(idx.as_usize())?.take()?;
        self.index.remove(&NhKey {
            vrf_id: nh.vrf_id,
            iface_id: nh.iface_id,
            addr: nh.addr,
        });
        self.free.push(idx.as_usize());
        Some(nh)
    }

    /// Indices of every live record
    pub fn indices(&self) -> Vec<NhIdx> {
        self.index.values().map(|&s| NhIdx(s as u32)).collect()
    }

    /// Visit every live record exactly once.
    pub fn iter(&self) -> impl Iterator<Item = (NhIdx, &Nexthop)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|nh| (NhIdx(i as u32), nh)))
    }
}
