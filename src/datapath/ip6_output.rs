//! IPv6 output node
//!
//! Frames a packet for its egress interface using the attached next-hop's
//! link-layer address. Multicast destinations are mapped directly to their
//! group MAC. A packet without a usable next-hop goes back to the control
//! thread for resolution; a stale next-hop still forwards but asks the
//! control thread to re-probe.

use super::packet::{Packet, TxFrame};
use super::view::NeighborView;
use crate::iface::IfaceTable;
use crate::nexthop::{NhFlags, NhIdx};
use crate::protocol::ethernet::{self, ETHERTYPE_IPV6};
use crate::protocol::ipv6::multicast_mac;

pub const EDGE_ERROR: &str = "ip6_output_error";

/// Outcome of the output node
#[derive(Debug)]
pub enum Ip6OutputAction {
    /// Framed and ready to transmit
    Tx(TxFrame),
    /// No usable next-hop: hand the packet to the control thread
    Unreachable(Packet),
    /// Dropped
    Error,
}

/// Result of one output pass. `probe` asks the control thread to solicit a
/// stale next-hop that was just used.
#[derive(Debug)]
pub struct Ip6Output {
    pub action: Ip6OutputAction,
    pub probe: Option<NhIdx>,
}

fn out(action: Ip6OutputAction) -> Ip6Output {
    Ip6Output {
        action,
        probe: None,
    }
}

pub fn process(pkt: Packet, ifaces: &IfaceTable, neighbors: &NeighborView) -> Ip6Output {
    let Some(dst) = pkt.dst_addr() else {
        return out(Ip6OutputAction::Error);
    };

    if dst.is_multicast() {
        let Some(iface) = ifaces.from_id(pkt.iface_id) else {
            return out(Ip6OutputAction::Error);
        };
        let frame = ethernet::frame(multicast_mac(&dst), iface.mac, ETHERTYPE_IPV6, &pkt.data);
        return out(Ip6OutputAction::Tx(TxFrame {
            iface_id: iface.id,
            data: frame,
        }));
    }

    let Some(view) = pkt.nh.and_then(|idx| neighbors.get(idx)) else {
        return out(Ip6OutputAction::Unreachable(pkt));
    };
    if view.flags.contains(NhFlags::FAILED) || view.lladdr.is_zero() {
        // Not resolved (or resolution gave up): the control thread decides
        // whether to park the packet and restart probing.
        return out(Ip6OutputAction::Unreachable(pkt));
    }
    if view.flags.contains(NhFlags::LOCAL) && view.addr != dst {
        // A local record standing in for a peer that has no entry yet.
        // Framing with our own MAC goes nowhere; resolve the real host.
        return out(Ip6OutputAction::Unreachable(pkt));
    }
    let Some(iface) = ifaces.from_id(view.iface_id) else {
        return out(Ip6OutputAction::Error);
    };

    // A stale entry still forwards, but its freshness gets re-probed.
    let probe = (view.flags.contains(NhFlags::STALE) && !view.flags.contains(NhFlags::PENDING))
        .then_some(view.idx);

    let frame = ethernet::frame(view.lladdr, iface.mac, ETHERTYPE_IPV6, &pkt.data);
    Ip6Output {
        action: Ip6OutputAction::Tx(TxFrame {
            iface_id: iface.id,
            data: frame,
        }),
        probe,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::Iface;
    use crate::nexthop::{AddrFamily, NhPool, NhTunables};
    use crate::protocol::ethernet::Frame;
    use crate::protocol::ipv6::{build_header, NDP_HOP_LIMIT, PROTO_ICMPV6};
    use crate::protocol::MacAddr;
    use std::net::Ipv6Addr;

    const IFACE_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    const PEER_MAC: MacAddr = MacAddr([0x52, 0x54, 0x00, 0xaa, 0xbb, 0xcc]);

    fn make_ifaces() -> IfaceTable {
        let mut table = IfaceTable::new();
        table.insert(Iface {
            id: 5,
            name: "eth0".into(),
            vrf_id: 0,
            mac: IFACE_MAC,
            addrs: vec![("fe80::1".parse().unwrap(), 64)],
        });
        table
    }

    fn ipv6_packet(dst: &str) -> Packet {
        let src: Ipv6Addr = "fe80::1".parse().unwrap();
        let dst: Ipv6Addr = dst.parse().unwrap();
        let hdr = build_header(&src, &dst, PROTO_ICMPV6, 0, NDP_HOP_LIMIT);
        Packet::ipv6(hdr.to_vec(), 0, 5)
    }

    fn pool_with(flags: NhFlags, lladdr: MacAddr) -> (NhPool, NhIdx) {
        let mut pool = NhPool::new(AddrFamily::V6, NhTunables::default());
        let idx = pool.create(0, 5, "2001:db8::1".parse().unwrap()).unwrap();
        let nh = pool.get_mut(idx).unwrap();
        nh.flags = flags;
        nh.lladdr = lladdr;
        (pool, idx)
    }

    #[test]
    fn test_multicast_maps_group_mac() {
        let ifaces = make_ifaces();
        let view = NeighborView::default();

        let result = process(ipv6_packet("ff02::1"), &ifaces, &view);
        let Ip6OutputAction::Tx(tx) = result.action else {
            panic!("expected tx");
        };

        let frame = Frame::parse(&tx.data).unwrap();
        assert_eq!(frame.dst_mac(), MacAddr([0x33, 0x33, 0, 0, 0, 1]));
        assert_eq!(frame.src_mac(), IFACE_MAC);
        assert_eq!(frame.ethertype(), ETHERTYPE_IPV6);
    }

    #[test]
    fn test_resolved_nexthop_frames_unicast() {
        let ifaces = make_ifaces();
        let (pool, idx) = pool_with(NhFlags::REACHABLE, PEER_MAC);
        let view = NeighborView::snapshot(&pool);

        let mut pkt = ipv6_packet("2001:db8::1");
        pkt.nh = Some(idx);

        let result = process(pkt, &ifaces, &view);
        let Ip6OutputAction::Tx(tx) = result.action else {
            panic!("expected tx");
        };
        assert!(result.probe.is_none());
        assert_eq!(Frame::parse(&tx.data).unwrap().dst_mac(), PEER_MAC);
    }

    #[test]
    fn test_stale_nexthop_requests_probe() {
        let ifaces = make_ifaces();
        let (pool, idx) = pool_with(NhFlags::STALE, PEER_MAC);
        let view = NeighborView::snapshot(&pool);

        let mut pkt = ipv6_packet("2001:db8::1");
        pkt.nh = Some(idx);

        let result = process(pkt, &ifaces, &view);
        assert!(matches!(result.action, Ip6OutputAction::Tx(_)));
        assert_eq!(result.probe, Some(idx));
    }

    #[test]
    fn test_stale_pending_not_reprobed() {
        let ifaces = make_ifaces();
        let (pool, idx) = pool_with(NhFlags::STALE | NhFlags::PENDING, PEER_MAC);
        let view = NeighborView::snapshot(&pool);

        let mut pkt = ipv6_packet("2001:db8::1");
        pkt.nh = Some(idx);

        let result = process(pkt, &ifaces, &view);
        assert!(matches!(result.action, Ip6OutputAction::Tx(_)));
        assert!(result.probe.is_none());
    }

    #[test]
    fn test_unresolved_goes_to_control() {
        let ifaces = make_ifaces();
        let (pool, idx) = pool_with(NhFlags::PENDING, MacAddr::ZERO);
        let view = NeighborView::snapshot(&pool);

        let mut pkt = ipv6_packet("2001:db8::1");
        pkt.nh = Some(idx);
        let result = process(pkt, &ifaces, &view);
        assert!(matches!(result.action, Ip6OutputAction::Unreachable(_)));

        // No next-hop attached at all
        let result = process(ipv6_packet("2001:db8::1"), &ifaces, &view);
        assert!(matches!(result.action, Ip6OutputAction::Unreachable(_)));
    }

    #[test]
    fn test_failed_nexthop_back_to_control() {
        let ifaces = make_ifaces();
        // A failed record can still carry the last known lladdr; it must
        // not be used for transmission.
        let (pool, idx) = pool_with(NhFlags::FAILED, PEER_MAC);
        let view = NeighborView::snapshot(&pool);

        let mut pkt = ipv6_packet("2001:db8::1");
        pkt.nh = Some(idx);
        let result = process(pkt, &ifaces, &view);
        assert!(matches!(result.action, Ip6OutputAction::Unreachable(_)));
    }
}
