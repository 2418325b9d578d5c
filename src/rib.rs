//! IPv6 route table
//!
//! Longest-prefix-match over `(vrf, prefix)`, single writer (the control
//! thread). Every route owns a reference on the next-hop it points at;
//! removing the last route referencing a next-hop is what frees it.

use crate::iface::IFACE_ID_UNDEF;
use crate::nexthop::{NhIdx, NhPool};
use crate::protocol::ipv6::is_link_local;
use crate::{Error, Result};
use std::net::Ipv6Addr;

/// Upper bound on vrf ids accepted from the API
pub const MAX_VRFS: u16 = 256;

/// Prefix length of a host route
pub const HOST_PREFIX_LEN: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub vrf_id: u16,
    pub iface_id: u16,
    pub prefix: Ipv6Addr,
    pub prefix_len: u8,
    pub nh: NhIdx,
}

fn prefix_mask(prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - prefix_len as u32)
    }
}

fn prefix_contains(prefix: &Ipv6Addr, prefix_len: u8, addr: &Ipv6Addr) -> bool {
    let mask = prefix_mask(prefix_len);
    u128::from_be_bytes(prefix.octets()) & mask == u128::from_be_bytes(addr.octets()) & mask
}

/// Network base address for an interface address and prefix length
pub fn network_address(addr: &Ipv6Addr, prefix_len: u8) -> Ipv6Addr {
    Ipv6Addr::from(u128::from_be_bytes(addr.octets()) & prefix_mask(prefix_len))
}

/// Route table, kept sorted by prefix length (longest first) for LPM
#[derive(Debug, Default)]
pub struct Rib {
    routes: Vec<Route>,
}

impl Rib {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the route for `(vrf, prefix, len)`.
    ///
    /// Takes a reference on `nh`; a replaced route's next-hop loses its
    /// reference (and is freed when that was the last one).
    pub fn insert(
        &mut self,
        pool: &mut NhPool,
        vrf_id: u16,
        iface_id: u16,
        prefix: Ipv6Addr,
        prefix_len: u8,
        nh: NhIdx,
    ) -> Result<()> {
        if prefix_len > HOST_PREFIX_LEN {
            return Err(Error::Invalid(format!("prefix length {prefix_len}")));
        }

        if let Some(existing) = self
            .routes
            .iter_mut()
            .find(|r| r.vrf_id == vrf_id && r.prefix == prefix && r.prefix_len == prefix_len)
        {
            if existing.nh == nh {
                return Ok(());
            }
            let old = existing.nh;
            existing.nh = nh;
            existing.iface_id = iface_id;
            pool.incref(nh);
            self.unref(pool, old);
            return Ok(());
        }

        self.routes.push(Route {
            vrf_id,
            iface_id,
            prefix,
            prefix_len,
            nh,
        });
        self.routes.sort_by(|a, b| b.prefix_len.cmp(&a.prefix_len));
        pool.incref(nh);
        Ok(())
    }

    /// Remove the route for `(vrf, prefix, len)`. `IFACE_ID_UNDEF` matches
    /// any interface. Dropping the last reference frees the next-hop.
    pub fn delete(
        &mut self,
        pool: &mut NhPool,
        vrf_id: u16,
        iface_id: u16,
        prefix: Ipv6Addr,
        prefix_len: u8,
    ) -> Result<()> {
        let pos = self
            .routes
            .iter()
            .position(|r| {
                r.vrf_id == vrf_id
                    && r.prefix == prefix
                    && r.prefix_len == prefix_len
                    && (iface_id == IFACE_ID_UNDEF || r.iface_id == iface_id)
            })
            .ok_or(Error::NotFound)?;

        let route = self.routes.remove(pos);
        self.unref(pool, route.nh);
        Ok(())
    }

    fn unref(&mut self, pool: &mut NhPool, nh: NhIdx) {
        if pool.decref(nh) {
            // Last reference gone: unwire anything still pointing at the
            // record before the slot is cleared.
            self.routes.retain(|r| r.nh != nh);
            pool.release(nh);
        }
    }

    /// Longest-prefix-match lookup. Link-local prefixes are scoped to
    /// their interface; everything else matches on vrf alone.
    pub fn lookup(&self, vrf_id: u16, iface_id: u16, dst: &Ipv6Addr) -> Option<&Route> {
        self.routes.iter().find(|r| {
            r.vrf_id == vrf_id
                && prefix_contains(&r.prefix, r.prefix_len, dst)
                && (!is_link_local(&r.prefix)
                    || iface_id == IFACE_ID_UNDEF
                    || r.iface_id == iface_id)
        })
    }

    /// Number of routes pointing at a next-hop
    pub fn routes_to(&self, nh: NhIdx) -> usize {
        self.routes.iter().filter(|r| r.nh == nh).count()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
