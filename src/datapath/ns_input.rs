//! Neighbor solicitation input node
//!
//! Validates a received NS against the RFC 4861 §7.1.1 receive rules, then
//! forges the advertisement reply in place. When the sender attached its
//! link-layer address, a copy of the solicitation is handed to the control
//! thread so the peer can be learned without a probe of our own.

use super::packet::Packet;
use super::view::NeighborView;
use crate::iface::IfaceTable;
use crate::nexthop::NhFlags;
use crate::protocol::icmpv6::{
    self, Icmpv6Packet, NeighborAdvertisement, NeighborSolicitation, NDP_MSG_SIZE,
};
use crate::protocol::ipv6::{build_header, ALL_NODES, NDP_HOP_LIMIT, PROTO_ICMPV6};

pub const EDGE_INVAL: &str = "ndp_ns_input_inval";
pub const EDGE_IGNORE: &str = "ndp_ns_input_ignore";
pub const EDGE_ERROR: &str = "ndp_ns_input_error";

/// Outcome of the NS input node
#[derive(Debug)]
pub enum NsInputAction {
    /// Reply forged; forward it to `ip6_output`. `learn` carries the copy
    /// destined for the control thread, if the sender was learnable.
    Advertise {
        reply: Packet,
        learn: Option<Packet>,
    },
    /// The target is not one of our addresses
    Ignore,
    /// Receive rules failed
    Inval,
    /// Metadata missing or packet malformed beyond validation
    Error,
}

pub fn process(pkt: Packet, ifaces: &IfaceTable, neighbors: &NeighborView) -> NsInputAction {
    let Some(meta) = pkt.local else {
        return NsInputAction::Error;
    };
    let Ok(icmp) = Icmpv6Packet::parse(&pkt.data) else {
        return NsInputAction::Inval;
    };
    let Ok(ns) = NeighborSolicitation::parse(icmp.body()) else {
        return NsInputAction::Inval;
    };

    // Validation of Neighbor Solicitations
    // https://www.rfc-editor.org/rfc/rfc4861.html#section-7.1.1
    //
    // - The IP Hop Limit field has a value of 255, i.e., the packet
    //   could not possibly have been forwarded by a router.
    if meta.hop_limit != NDP_HOP_LIMIT {
        return NsInputAction::Inval;
    }
    // - ICMP Checksum is valid (checked on receive).
    //
    // - ICMP Code is 0.
    if icmp.code() != 0 {
        return NsInputAction::Inval;
    }
    // - ICMP length (derived from the IP length) is 24 or more octets.
    if (meta.len as usize) < NDP_MSG_SIZE {
        return NsInputAction::Inval;
    }
    // - Target Address is not a multicast address.
    if ns.target_addr.is_multicast() {
        return NsInputAction::Inval;
    }

    let local = match neighbors.lookup(pkt.vrf_id, pkt.iface_id, &ns.target_addr) {
        Some(v) if v.flags.contains(NhFlags::LOCAL) => *v,
        _ => return NsInputAction::Ignore,
    };
    let Some(iface) = ifaces.from_id(pkt.iface_id) else {
        return NsInputAction::Error;
    };

    let (na_dst, solicited, remote, learn) = if meta.src.is_unspecified() {
        // - If the IP source address is the unspecified address, the IP
        //   destination address is a solicited-node multicast address.
        if !meta.dst.is_multicast() {
            return NsInputAction::Inval;
        }
        // - If the IP source address is the unspecified address, there is
        //   no source link-layer address option in the message.
        if ns.source_link_addr.is_some() {
            return NsInputAction::Inval;
        }
        // The reply to an unspecified source is multicast to all-nodes
        // with the Solicited flag clear.
        (ALL_NODES, false, None, None)
    } else {
        let remote = neighbors
            .lookup(pkt.vrf_id, pkt.iface_id, &meta.src)
            .copied();
        let learn = ns.source_link_addr.map(|_| {
            // Copy the solicitation for the control plane, with the target
            // field overwritten by the sender's address. This spares the
            // control path from carrying the full IPv6 header.
            let mut copy = pkt.data.clone();
            icmpv6::set_ndp_target(&mut copy, &meta.src);
            Packet::local(copy, pkt.vrf_id, pkt.iface_id, meta)
        });
        (meta.src, true, remote, learn)
    };

    // Forge the advertisement in place of the solicitation.
    let na = NeighborAdvertisement {
        router_flag: true,
        solicited_flag: solicited,
        override_flag: true,
        target_addr: local.addr,
        target_link_addr: Some(iface.mac),
    };
    let mut msg = na.to_bytes();
    icmpv6::set_checksum(&mut msg, &local.addr, &na_dst);

    let mut data = Vec::with_capacity(40 + msg.len());
    data.extend_from_slice(&build_header(
        &local.addr,
        &na_dst,
        PROTO_ICMPV6,
        msg.len() as u16,
        NDP_HOP_LIMIT,
    ));
    data.extend_from_slice(&msg);

    let mut reply = Packet::ipv6(data, pkt.vrf_id, pkt.iface_id);
    // The output node needs a next-hop for the egress interface. Without a
    // known remote, the interface's own record stands in.
    reply.nh = Some(remote.map(|r| r.idx).unwrap_or(local.idx));

    NsInputAction::Advertise { reply, learn }
}
