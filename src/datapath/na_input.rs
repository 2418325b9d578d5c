//! Neighbor advertisement input node
//!
//! Applies the RFC 4861 §7.1.2 receive rules before the advertisement is
//! handed to the control thread for the state update.

use super::packet::Packet;
use crate::protocol::icmpv6::{Icmpv6Packet, NeighborAdvertisement, NDP_MSG_SIZE};
use crate::protocol::ipv6::NDP_HOP_LIMIT;

pub const EDGE_INVAL: &str = "ndp_na_input_inval";

/// Outcome of the NA input node
#[derive(Debug)]
pub enum NaInputAction {
    /// Valid advertisement: pass to the control thread
    Learn(Packet),
    /// Receive rules failed
    Inval,
}

pub fn process(pkt: Packet) -> NaInputAction {
    let Some(meta) = pkt.local else {
        return NaInputAction::Inval;
    };
    let Ok(icmp) = Icmpv6Packet::parse(&pkt.data) else {
        return NaInputAction::Inval;
    };
    let Ok(na) = NeighborAdvertisement::parse(icmp.body()) else {
        return NaInputAction::Inval;
    };

    // Validation of Neighbor Advertisements
    // https://www.rfc-editor.org/rfc/rfc4861.html#section-7.1.2
    if meta.hop_limit != NDP_HOP_LIMIT {
        return NaInputAction::Inval;
    }
    if icmp.code() != 0 {
        return NaInputAction::Inval;
    }
    if (meta.len as usize) < NDP_MSG_SIZE {
        return NaInputAction::Inval;
    }
    if na.target_addr.is_multicast() {
        return NaInputAction::Inval;
    }
    // - If the IP Destination Address is a multicast address the
    //   Solicited flag is zero.
    if meta.dst.is_multicast() && na.solicited_flag {
        return NaInputAction::Inval;
    }

    NaInputAction::Learn(pkt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datapath::packet::LocalMeta;
    use crate::protocol::ipv6::ALL_NODES;
    use crate::protocol::MacAddr;
    use std::net::Ipv6Addr;

    fn na_packet(solicited: bool, dst: Ipv6Addr, hop_limit: u8) -> Packet {
        let target: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let msg = NeighborAdvertisement {
            router_flag: false,
            solicited_flag: solicited,
            override_flag: true,
            target_addr: target,
            target_link_addr: Some(MacAddr([0x52, 0x54, 0x00, 0xaa, 0xbb, 0xcc])),
        }
        .to_bytes();
        let meta = LocalMeta {
            src: target,
            dst,
            hop_limit,
            len: msg.len() as u16,
        };
        Packet::local(msg, 0, 5, meta)
    }

    #[test]
    fn test_valid_na_passes() {
        let pkt = na_packet(true, "fe80::1".parse().unwrap(), 255);
        assert!(matches!(process(pkt), NaInputAction::Learn(_)));
    }

    #[test]
    fn test_hop_limit_enforced() {
        let pkt = na_packet(true, "fe80::1".parse().unwrap(), 64);
        assert!(matches!(process(pkt), NaInputAction::Inval));
    }

    #[test]
    fn test_solicited_to_multicast_rejected() {
        let pkt = na_packet(true, ALL_NODES, 255);
        assert!(matches!(process(pkt), NaInputAction::Inval));

        let pkt = na_packet(false, ALL_NODES, 255);
        assert!(matches!(process(pkt), NaInputAction::Learn(_)));
    }

    #[test]
    fn test_short_na_rejected() {
        let mut pkt = na_packet(true, "fe80::1".parse().unwrap(), 255);
        pkt.local.as_mut().unwrap().len = 20;
        assert!(matches!(process(pkt), NaInputAction::Inval));
    }
}
