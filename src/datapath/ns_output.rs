//! Neighbor solicitation output (probe emitter)
//!
//! Builds the NS probe for a next-hop. Runs on the control thread, which
//! owns the probe counters: while the peer has answered before and the
//! unicast budget holds, the probe is unicast to the known address;
//! afterwards it falls back to the solicited-node multicast group.

use super::packet::Packet;
use crate::iface::IfaceTable;
use crate::nexthop::{NhIdx, NhPool};
use crate::protocol::icmpv6::{self, NeighborSolicitation};
use crate::protocol::ipv6::{
    build_header, solicited_node_multicast, NDP_HOP_LIMIT, PROTO_ICMPV6,
};
use crate::{Error, Result};

pub const EDGE_ERROR: &str = "ndp_ns_output_error";

/// Build the next probe for `idx`, stamping the request time and counting
/// the probe against its budget.
pub fn emit_solicit(
    pool: &mut NhPool,
    idx: NhIdx,
    ifaces: &IfaceTable,
    now: u64,
) -> Result<Packet> {
    let tunables = *pool.tunables();
    let nh = pool.get_mut(idx).ok_or(Error::NotFound)?;
    let iface = ifaces.from_id(nh.iface_id).ok_or(Error::InterfaceNotFound {
        name: format!("id {}", nh.iface_id),
    })?;
    let src = iface.preferred_source(&nh.addr).ok_or(Error::Unreachable)?;

    let msg = NeighborSolicitation::new(nh.addr, Some(iface.mac)).to_bytes();

    let dst = if nh.last_reply != 0 && nh.ucast_probes < tunables.ucast_probes {
        nh.ucast_probes += 1;
        nh.addr
    } else {
        nh.bcast_probes += 1;
        solicited_node_multicast(&nh.addr)
    };

    let mut data = Vec::with_capacity(40 + msg.len());
    data.extend_from_slice(&build_header(
        &src,
        &dst,
        PROTO_ICMPV6,
        msg.len() as u16,
        NDP_HOP_LIMIT,
    ));
    data.extend_from_slice(&msg);
    icmpv6::set_checksum(&mut data[40..], &src, &dst);

    nh.last_request = now;

    let mut pkt = Packet::ipv6(data, nh.vrf_id, nh.iface_id);
    pkt.nh = Some(idx);
    Ok(pkt)
}
