//! Receive-side classification
//!
//! Strips the Ethernet and IPv6 headers off a received frame and decides
//! which node gets the payload. Only neighbor discovery is of interest
//! here; everything else falls through as `Ignore`.

use super::packet::{LocalMeta, Packet};
use crate::iface::Iface;
use crate::protocol::ethernet::{Frame, ETHERTYPE_IPV6};
use crate::protocol::icmpv6::{self, Icmpv6Type};
use crate::protocol::ipv6::{Ipv6Header, PROTO_ICMPV6};

/// Where a received frame goes next
#[derive(Debug)]
pub enum RxVerdict {
    NsInput(Packet),
    NaInput(Packet),
    /// Not neighbor discovery, or failed basic checks
    Ignore,
}

pub fn classify(frame: &[u8], iface: &Iface) -> RxVerdict {
    let Ok(eth) = Frame::parse(frame) else {
        return RxVerdict::Ignore;
    };
    if eth.ethertype() != ETHERTYPE_IPV6 {
        return RxVerdict::Ignore;
    }
    let Ok(ip) = Ipv6Header::parse(eth.payload()) else {
        return RxVerdict::Ignore;
    };
    if ip.next_header() != PROTO_ICMPV6 {
        return RxVerdict::Ignore;
    }

    let src = ip.src_addr();
    let dst = ip.dst_addr();
    let msg = ip.payload();
    if msg.len() < icmpv6::HEADER_SIZE {
        return RxVerdict::Ignore;
    }
    if !icmpv6::validate_checksum(&src, &dst, msg) {
        return RxVerdict::Ignore;
    }

    let meta = LocalMeta {
        src,
        dst,
        hop_limit: ip.hop_limit(),
        len: ip.payload_length(),
    };
    let pkt = Packet::local(msg.to_vec(), iface.vrf_id, iface.id, meta);

    match Icmpv6Type::from_u8(msg[0]) {
        Some(Icmpv6Type::NeighborSolicitation) => RxVerdict::NsInput(pkt),
        Some(Icmpv6Type::NeighborAdvertisement) => RxVerdict::NaInput(pkt),
        None => RxVerdict::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ethernet;
    use crate::protocol::icmpv6::NeighborSolicitation;
    use crate::protocol::ipv6::{build_header, NDP_HOP_LIMIT};
    use crate::protocol::MacAddr;
    use std::net::Ipv6Addr;

    fn make_iface() -> Iface {
        Iface {
            id: 5,
            name: "eth0".into(),
            vrf_id: 0,
            mac: MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            addrs: vec![("fe80::1".parse().unwrap(), 64)],
        }
    }

    fn ns_frame(valid_checksum: bool) -> Vec<u8> {
        let src: Ipv6Addr = "fe80::2".parse().unwrap();
        let dst: Ipv6Addr = "fe80::1".parse().unwrap();
        let mut msg = NeighborSolicitation::new(dst, None).to_bytes();
        if valid_checksum {
            icmpv6::set_checksum(&mut msg, &src, &dst);
        }

        let mut packet =
            build_header(&src, &dst, PROTO_ICMPV6, msg.len() as u16, NDP_HOP_LIMIT).to_vec();
        packet.extend_from_slice(&msg);
        ethernet::frame(
            MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]),
            ETHERTYPE_IPV6,
            &packet,
        )
    }

    #[test]
    fn test_ns_classified() {
        let iface = make_iface();
        let verdict = classify(&ns_frame(true), &iface);

        let RxVerdict::NsInput(pkt) = verdict else {
            panic!("expected NS verdict");
        };
        assert_eq!(pkt.iface_id, 5);
        let meta = pkt.local.unwrap();
        assert_eq!(meta.hop_limit, 255);
        assert_eq!(meta.src, "fe80::2".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn test_bad_checksum_ignored() {
        let iface = make_iface();
        assert!(matches!(classify(&ns_frame(false), &iface), RxVerdict::Ignore));
    }

    #[test]
    fn test_non_ipv6_ignored() {
        let iface = make_iface();
        let frame = ethernet::frame(
            MacAddr::BROADCAST,
            MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]),
            0x0800,
            &[0u8; 40],
        );
        assert!(matches!(classify(&frame, &iface), RxVerdict::Ignore));
    }
}
