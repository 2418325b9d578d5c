//! Packet buffers and per-packet metadata
//!
//! A `Packet` is a plain byte buffer plus the metadata that travels with it
//! between datapath nodes and the control thread. What `data` starts with
//! depends on the node a packet is addressed to: output nodes see a full
//! IPv6 packet, local protocol handlers see the upper-layer message with
//! the interesting IPv6 header fields lifted into `LocalMeta`.

use crate::nexthop::NhIdx;
use crate::protocol::ipv6::Ipv6Header;
use std::net::Ipv6Addr;

/// IPv6 header fields preserved when the header is stripped for local
/// delivery.
#[derive(Debug, Clone, Copy)]
pub struct LocalMeta {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub hop_limit: u8,
    /// Upper-layer message length derived from the IPv6 payload length
    pub len: u16,
}

/// A packet in flight through the forwarding graph or the control plane.
#[derive(Debug)]
pub struct Packet {
    pub data: Vec<u8>,
    pub vrf_id: u16,
    pub iface_id: u16,
    /// Resolved next-hop attached for output
    pub nh: Option<NhIdx>,
    /// Present when `data` is an upper-layer message
    pub local: Option<LocalMeta>,
}

impl Packet {
    /// A full IPv6 packet headed for (or coming from) the forwarding path.
    pub fn ipv6(data: Vec<u8>, vrf_id: u16, iface_id: u16) -> Self {
        Self {
            data,
            vrf_id,
            iface_id,
            nh: None,
            local: None,
        }
    }

    /// An upper-layer message delivered locally, header fields preserved.
    pub fn local(data: Vec<u8>, vrf_id: u16, iface_id: u16, meta: LocalMeta) -> Self {
        Self {
            data,
            vrf_id,
            iface_id,
            nh: None,
            local: Some(meta),
        }
    }

    /// Destination address, when `data` holds a full IPv6 packet.
    pub fn dst_addr(&self) -> Option<Ipv6Addr> {
        Ipv6Header::parse(&self.data).ok().map(|h| h.dst_addr())
    }
}

/// A framed packet ready for transmission on an interface.
#[derive(Debug)]
pub struct TxFrame {
    pub iface_id: u16,
    pub data: Vec<u8>,
}
