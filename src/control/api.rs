//! Static next-hop API
//!
//! Add, delete, and list operations on administratively configured
//! next-hops. Requests and responses are plain serde types; the transport
//! that carries them is someone else's business.

use super::plane::ControlPlane;
use crate::iface::IFACE_ID_UNDEF;
use crate::nexthop::{NhFlags, TICKS_PER_SEC};
use crate::protocol::MacAddr;
use crate::rib::{HOST_PREFIX_LEN, MAX_VRFS};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;

/// A static next-hop as the API sees it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiNexthop {
    pub vrf_id: u16,
    pub iface_id: u16,
    pub ipv6: Ipv6Addr,
    pub mac: MacAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nh6AddRequest {
    pub nexthop: ApiNexthop,
    #[serde(default)]
    pub exist_ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nh6DelRequest {
    pub vrf_id: u16,
    pub host: Ipv6Addr,
    #[serde(default)]
    pub missing_ok: bool,
}

/// `vrf_id == u16::MAX` lists every vrf
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nh6ListRequest {
    pub vrf_id: u16,
}

/// One projected next-hop record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nh6Info {
    pub ipv6: Ipv6Addr,
    pub iface_id: u16,
    pub vrf_id: u16,
    pub mac: MacAddr,
    pub flags: u16,
    /// Seconds since the last reachability confirmation, 0 if never
    pub age_secs: u64,
    pub held_pkts: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Nh6ListResponse {
    pub nexthops: Vec<Nh6Info>,
}

impl ControlPlane {
    /// Create a static next-hop and its /128 host route.
    pub fn nh6_add(&mut self, req: &Nh6AddRequest) -> Result<()> {
        self.add_static_neighbor(
            req.nexthop.vrf_id,
            req.nexthop.iface_id,
            req.nexthop.ipv6,
            req.nexthop.mac,
            req.exist_ok,
        )
    }

    /// Delete a next-hop that nothing else references. Deletion goes
    /// through route removal, which drops the last reference and frees
    /// the record.
    pub fn nh6_del(&mut self, req: &Nh6DelRequest) -> Result<()> {
        if req.vrf_id >= MAX_VRFS {
            return Err(Error::Overflow(format!("vrf {}", req.vrf_id)));
        }

        let Some(idx) = self.pool.lookup(req.vrf_id, IFACE_ID_UNDEF, &req.host) else {
            if req.missing_ok {
                return Ok(());
            }
            return Err(Error::NotFound);
        };

        let nh = self.pool.get(idx).expect("live index");
        if nh.flags.intersects(NhFlags::INFRA) || nh.ref_count() > 1 {
            return Err(Error::Busy);
        }

        let ret = self.rib.delete(
            &mut self.pool,
            req.vrf_id,
            IFACE_ID_UNDEF,
            req.host,
            HOST_PREFIX_LEN,
        );
        self.publish();
        ret
    }

    /// Project the live next-hop set.
    pub fn nh6_list(&self, req: &Nh6ListRequest, now: u64) -> Nh6ListResponse {
        let mut resp = Nh6ListResponse::default();
        for (_, nh) in self.pool.iter() {
            if nh.vrf_id != req.vrf_id && req.vrf_id != u16::MAX {
                continue;
            }
            if nh.addr.is_multicast() {
                continue;
            }
            let age_secs = if nh.last_reply > 0 {
                now.saturating_sub(nh.last_reply) / TICKS_PER_SEC
            } else {
                0
            };
            resp.nexthops.push(Nh6Info {
                ipv6: nh.addr,
                iface_id: nh.iface_id,
                vrf_id: nh.vrf_id,
                mac: nh.lladdr,
                flags: nh.flags.bits(),
                age_secs,
                held_pkts: nh.held_count(),
            });
        }
        resp
    }
}
