//! Control plane
//!
//! The single thread that owns the next-hop pool and the route table.
//! Everything reaches it through the message ring: resolution misses from
//! the workers, learn copies from the NDP input nodes, and its own probe
//! emissions re-entering the output path. After every mutation batch the
//! neighbor view is republished for the datapath.

use crate::datapath::{
    ip6_output, ns_output, Ip6OutputAction, NeighborView, Packet, SharedNeighborView, TxFrame,
};
use crate::iface::{IfaceTable, IFACE_ID_UNDEF};
use crate::nexthop::{self, AddrFamily, NhFlags, NhIdx, NhPool, NhTunables};
use crate::protocol::icmpv6::{self, Icmpv6Packet, Icmpv6Type, NdpOptionType};
use crate::rib::{network_address, Rib, HOST_PREFIX_LEN};
use crate::telemetry::MetricsRegistry;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::ring::{HandlerId, HandlerRegistry, Payload, RingReceiver, RingSender, StackMessage};

/// The ring handlers this subsystem registers at startup
#[derive(Debug, Clone, Copy)]
pub struct Handlers {
    /// Re-inject a packet with an attached next-hop
    pub ip6_output: HandlerId,
    /// Emit a solicitation for a next-hop
    pub ndp_ns_output: HandlerId,
    /// Datapath miss: resolve and hold
    pub ip6_unreachable: HandlerId,
    /// Learn from a received NS copy or NA
    pub ndp_probe_input: HandlerId,
}

impl Handlers {
    pub fn register(registry: &mut HandlerRegistry) -> Self {
        Self {
            ip6_output: registry.register("ip6_output"),
            ndp_ns_output: registry.register("ndp_ns_output"),
            ip6_unreachable: registry.register("ip6_unreachable"),
            ndp_probe_input: registry.register("ndp_probe_input"),
        }
    }
}

pub struct ControlPlane {
    pub(crate) pool: NhPool,
    pub(crate) rib: Rib,
    pub(crate) ifaces: Arc<IfaceTable>,
    view: Arc<SharedNeighborView>,
    ring: RingSender,
    handlers: Handlers,
    pub(crate) metrics: Arc<MetricsRegistry>,
}

impl ControlPlane {
    pub fn new(
        ifaces: Arc<IfaceTable>,
        tunables: NhTunables,
        ring: RingSender,
        handlers: Handlers,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            pool: NhPool::new(AddrFamily::V6, tunables),
            rib: Rib::new(),
            ifaces,
            view: Arc::new(SharedNeighborView::new()),
            ring,
            handlers,
            metrics,
        }
    }

    /// Shared read view for datapath workers.
    pub fn view(&self) -> Arc<SharedNeighborView> {
        self.view.clone()
    }

    pub fn handlers(&self) -> Handlers {
        self.handlers
    }

    pub fn pool(&self) -> &NhPool {
        &self.pool
    }

    pub fn rib(&self) -> &Rib {
        &self.rib
    }

    /// Wire up the configured interface addresses: each one gets a
    /// `LOCAL|LINK|REACHABLE` next-hop, a /128 host route, and the
    /// connected prefix route pointing at it.
    pub fn bring_up(&mut self) -> Result<()> {
        let ifaces = self.ifaces.clone();
        for iface in ifaces.iter() {
            for (addr, prefix_len) in &iface.addrs {
                let idx = match self.pool.lookup(iface.vrf_id, iface.id, addr) {
                    Some(idx) => idx,
                    None => self.pool.create(iface.vrf_id, iface.id, *addr)?,
                };
                {
                    let nh = self.pool.get_mut(idx).expect("slot just created");
                    nh.flags |= NhFlags::LOCAL | NhFlags::LINK | NhFlags::REACHABLE;
                    nh.lladdr = iface.mac;
                }
                self.rib
                    .insert(&mut self.pool, iface.vrf_id, iface.id, *addr, HOST_PREFIX_LEN, idx)?;
                self.rib.insert(
                    &mut self.pool,
                    iface.vrf_id,
                    iface.id,
                    network_address(addr, *prefix_len),
                    *prefix_len,
                    idx,
                )?;
            }
        }
        self.publish();
        Ok(())
    }

    /// Republish the datapath view.
    pub fn publish(&self) {
        self.view.publish(NeighborView::snapshot(&self.pool));
    }

    /// Drain whatever is queued on the ring right now.
    pub fn drain(&mut self, rx: &mut RingReceiver, now: u64) -> Vec<TxFrame> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.extend(self.dispatch(msg, now));
        }
        out
    }

    /// Handle one ring message. Returns any frames ready for transmission.
    pub fn dispatch(&mut self, msg: StackMessage, now: u64) -> Vec<TxFrame> {
        let mut out = Vec::new();
        match (msg.handler, msg.payload) {
            (h, Payload::Nexthop(idx)) if h == self.handlers.ndp_ns_output => {
                self.emit_probe(idx, now, &mut out);
            }
            (h, Payload::Packet(pkt)) if h == self.handlers.ip6_output => {
                self.run_output(pkt, now, &mut out);
            }
            (h, Payload::Packet(pkt)) if h == self.handlers.ip6_unreachable => {
                self.handle_unreachable(pkt, now);
            }
            (h, Payload::Packet(pkt)) if h == self.handlers.ndp_probe_input => {
                self.handle_probe_input(pkt, now);
            }
            (h, _) => warn!(handler = h.as_usize(), "message for unknown handler"),
        }
        self.publish();
        out
    }

    /// Periodic timer: probe retries, failures, stale transitions.
    pub fn tick(&mut self, now: u64) {
        for event in nexthop::probe_tick(&mut self.pool, now) {
            match event {
                nexthop::NhEvent::Solicit(idx) => self.solicit(idx),
                nexthop::NhEvent::Stale(idx) => {
                    if let Some(nh) = self.pool.get(idx) {
                        debug!(addr = %nh.addr, "neighbor went stale");
                    }
                }
                nexthop::NhEvent::Failed { nh, dropped } => {
                    self.metrics.resolutions_failed.inc();
                    self.metrics.held_dropped.add(dropped as u64);
                    if let Some(nh) = self.pool.get(nh) {
                        debug!(addr = %nh.addr, dropped, "neighbor resolution failed");
                    }
                }
            }
        }
        self.publish();
    }

    /// Ask for a solicitation to be emitted for `idx`.
    pub fn solicit(&mut self, idx: NhIdx) {
        if self
            .ring
            .post(self.handlers.ndp_ns_output, Payload::Nexthop(idx))
            .is_err()
        {
            self.metrics.ring_full_drops.inc();
        }
    }

    fn emit_probe(&mut self, idx: NhIdx, now: u64, out: &mut Vec<TxFrame>) {
        {
            let t = *self.pool.tunables();
            let Some(nh) = self.pool.get_mut(idx) else {
                return;
            };
            // Static entries are never probed.
            if nh.flags.contains(NhFlags::STATIC) {
                return;
            }
            // Rate limit: at most one probe per interval, however many
            // workers asked for one.
            if nh.flags.contains(NhFlags::PENDING)
                && nh.last_request != 0
                && now < nh.last_request + t.probe_interval
            {
                return;
            }
            // A stale entry being used again enters the probing state.
            if !nh.flags.contains(NhFlags::PENDING) {
                if !nh.flags.contains(NhFlags::STALE) {
                    return;
                }
                nh.flags.insert(NhFlags::PENDING);
            }
        }

        match ns_output::emit_solicit(&mut self.pool, idx, &self.ifaces, now) {
            Ok(probe) => {
                self.metrics.solicits_sent.inc();
                self.run_output(probe, now, out);
            }
            Err(e) => {
                debug!("cannot emit solicitation: {e}");
                self.metrics.edge_drop(ns_output::EDGE_ERROR);
            }
        }
    }

    fn run_output(&mut self, pkt: Packet, now: u64, out: &mut Vec<TxFrame>) {
        // The node reads the same snapshot the workers do.
        self.publish();
        let view = self.view.load();
        let result = ip6_output::process(pkt, &self.ifaces, &view);
        if let Some(idx) = result.probe {
            self.solicit(idx);
        }
        match result.action {
            Ip6OutputAction::Tx(frame) => out.push(frame),
            Ip6OutputAction::Unreachable(pkt) => self.handle_unreachable(pkt, now),
            Ip6OutputAction::Error => self.metrics.edge_drop(ip6_output::EDGE_ERROR),
        }
    }

    /// Datapath miss: a packet whose destination matched a connected route
    /// but has no resolved host next-hop yet.
    pub fn handle_unreachable(&mut self, mut pkt: Packet, now: u64) {
        let Some(dst) = pkt.dst_addr() else {
            self.metrics.edge_drop(ip6_output::EDGE_ERROR);
            return;
        };
        let Some(route) = self.rib.lookup(pkt.vrf_id, pkt.iface_id, &dst) else {
            // route to dst has disappeared
            debug!(%dst, "no route, dropping held candidate");
            return;
        };
        let mut nh_idx = route.nh;
        let Some(nh) = self.pool.get(nh_idx) else {
            return;
        };
        let (parent_vrf, parent_iface) = (nh.vrf_id, nh.iface_id);

        if nh.flags.contains(NhFlags::LINK) && nh.addr != dst {
            // The match is the connected subnet, not the host: find or
            // create the host record.
            let remote = match self.pool.lookup(parent_vrf, pkt.iface_id, &dst) {
                Some(remote) => {
                    let flags = self.pool.get(remote).expect("live index").flags;
                    let iface = self.pool.get(remote).expect("live index").iface_id;
                    if flags.contains(NhFlags::GATEWAY) && iface == IFACE_ID_UNDEF {
                        // Gateway record created before its output
                        // interface was known.
                        self.pool.set_iface(remote, parent_iface);
                    }
                    remote
                }
                None => match self.pool.create(parent_vrf, parent_iface, dst) {
                    Ok(remote) => remote,
                    Err(e) => {
                        error!("cannot allocate nexthop: {e}");
                        return;
                    }
                },
            };

            let remote_iface = self.pool.get(remote).expect("live index").iface_id;
            if remote_iface != parent_iface {
                panic!("{dst}: nexthop lookup gives wrong interface");
            }

            // A /128 host route so the next packets resolve in one lookup.
            if let Err(e) = self.rib.insert(
                &mut self.pool,
                parent_vrf,
                parent_iface,
                dst,
                HOST_PREFIX_LEN,
                remote,
            ) {
                error!("failed to insert route: {e}");
                return;
            }
            nh_idx = remote;
        }

        let max_held = self.pool.tunables().max_held_pkts;
        let reachable = self
            .pool
            .get(nh_idx)
            .is_some_and(|nh| nh.flags.contains(NhFlags::REACHABLE));
        if reachable {
            // Resolved while the packet was in flight: send it back out.
            pkt.nh = Some(nh_idx);
            if self
                .ring
                .post(self.handlers.ip6_output, Payload::Packet(pkt))
                .is_err()
            {
                self.metrics.ring_full_drops.inc();
            }
            return;
        }

        if self
            .pool
            .get(nh_idx)
            .is_some_and(|nh| nh.flags.contains(NhFlags::FAILED))
        {
            // Fresh traffic gives a failed next-hop another chance.
            nexthop::restart_resolution(&mut self.pool, nh_idx);
        }

        let mut kick_probe = false;
        {
            let Some(nh) = self.pool.get_mut(nh_idx) else {
                return;
            };
            pkt.nh = Some(nh_idx);
            if nh.hold(pkt, max_held) {
                self.metrics.held_enqueued.inc();
                if !nh.flags.contains(NhFlags::PENDING) {
                    nh.flags.insert(NhFlags::PENDING);
                    kick_probe = true;
                }
            } else {
                debug!(%dst, "hold queue full");
                self.metrics.held_dropped.inc();
            }
        }
        if kick_probe {
            self.solicit(nh_idx);
        }
    }

    /// Learn from a received probe: either an NA, or the copy of an NS
    /// whose target field carries the sender's address.
    pub fn handle_probe_input(&mut self, pkt: Packet, now: u64) {
        let Ok(icmp) = Icmpv6Packet::parse(&pkt.data) else {
            return;
        };
        let lladdr = match Icmpv6Type::from_u8(icmp.msg_type()) {
            Some(Icmpv6Type::NeighborSolicitation) => {
                icmpv6::get_lladdr_option(&pkt.data, NdpOptionType::SourceLinkLayerAddress)
            }
            Some(Icmpv6Type::NeighborAdvertisement) => {
                icmpv6::get_lladdr_option(&pkt.data, NdpOptionType::TargetLinkLayerAddress)
            }
            None => return,
        };
        let Some(lladdr) = lladdr else {
            return;
        };
        let Some(target) = icmpv6::ndp_target(&pkt.data) else {
            return;
        };

        let idx = match self.pool.lookup(pkt.vrf_id, pkt.iface_id, &target) {
            Some(idx) => idx,
            None => {
                // Unknown peer probing us: learn it now, it will likely
                // talk to us soon and that saves a solicitation of ours.
                let idx = match self.pool.create(pkt.vrf_id, pkt.iface_id, target) {
                    Ok(idx) => idx,
                    Err(e) => {
                        error!("cannot allocate nexthop: {e}");
                        return;
                    }
                };
                if let Err(e) = self.rib.insert(
                    &mut self.pool,
                    pkt.vrf_id,
                    pkt.iface_id,
                    target,
                    HOST_PREFIX_LEN,
                    idx,
                ) {
                    error!("failed to insert route: {e}");
                    self.pool.release(idx);
                    return;
                }
                idx
            }
        };

        // Static next hops never need updating.
        if self
            .pool
            .get(idx)
            .is_some_and(|nh| nh.flags.contains(NhFlags::STATIC))
        {
            return;
        }

        let flushed = nexthop::confirm_reachable(&mut self.pool, idx, pkt.iface_id, lladdr, now);
        self.metrics.neighbors_learned.inc();

        // Flush completes even when individual re-posts fail; those
        // packets are simply freed.
        for mut held in flushed {
            held.nh = Some(idx);
            match self.ring.post(self.handlers.ip6_output, Payload::Packet(held)) {
                Ok(()) => self.metrics.held_flushed.inc(),
                Err(_) => self.metrics.ring_full_drops.inc(),
            }
        }
    }

    /// Install a route through an already known next-hop.
    pub fn route_add(
        &mut self,
        vrf_id: u16,
        prefix: std::net::Ipv6Addr,
        prefix_len: u8,
        nh_addr: std::net::Ipv6Addr,
    ) -> Result<()> {
        let idx = self
            .pool
            .lookup(vrf_id, IFACE_ID_UNDEF, &nh_addr)
            .ok_or(Error::NotFound)?;
        let iface_id = self.pool.get(idx).expect("live index").iface_id;
        let ret = self
            .rib
            .insert(&mut self.pool, vrf_id, iface_id, prefix, prefix_len, idx);
        self.publish();
        ret
    }

    /// Remove a route.
    pub fn route_del(
        &mut self,
        vrf_id: u16,
        prefix: std::net::Ipv6Addr,
        prefix_len: u8,
    ) -> Result<()> {
        let ret = self
            .rib
            .delete(&mut self.pool, vrf_id, IFACE_ID_UNDEF, prefix, prefix_len);
        self.publish();
        ret
    }

    /// Validate and apply a statically configured neighbor.
    pub fn add_static_neighbor(
        &mut self,
        vrf_id: u16,
        iface_id: u16,
        addr: std::net::Ipv6Addr,
        mac: crate::protocol::MacAddr,
        exist_ok: bool,
    ) -> Result<()> {
        use crate::rib::MAX_VRFS;

        if addr.is_unspecified() || addr.is_multicast() {
            return Err(Error::Invalid(format!("bad neighbor address {addr}")));
        }
        if vrf_id >= MAX_VRFS {
            return Err(Error::Overflow(format!("vrf {vrf_id}")));
        }
        if self.ifaces.from_id(iface_id).is_none() {
            return Err(Error::NotFound);
        }

        if let Some(existing) = self.pool.lookup(vrf_id, iface_id, &addr) {
            let nh = self.pool.get(existing).expect("live index");
            if exist_ok && nh.iface_id == iface_id && nh.lladdr == mac {
                return Ok(());
            }
            return Err(Error::Exists);
        }

        let idx = self.pool.create(vrf_id, iface_id, addr)?;
        {
            let nh = self.pool.get_mut(idx).expect("slot just created");
            nh.lladdr = mac;
            nh.flags = NhFlags::STATIC | NhFlags::REACHABLE;
        }
        let ret = self
            .rib
            .insert(&mut self.pool, vrf_id, iface_id, addr, HOST_PREFIX_LEN, idx);
        self.publish();
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ring::ring;
    use crate::iface::Iface;
    use crate::protocol::ipv6::build_header;
    use crate::protocol::MacAddr;
    use std::net::Ipv6Addr;

    fn make_plane() -> (ControlPlane, RingReceiver) {
        let mut ifaces = IfaceTable::new();
        ifaces.insert(Iface {
            id: 5,
            name: "eth0".into(),
            vrf_id: 0,
            mac: MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            addrs: vec![("2001:db8::254".parse().unwrap(), 64)],
        });

        let mut registry = HandlerRegistry::new();
        let handlers = Handlers::register(&mut registry);
        let (tx, rx) = ring(64);
        let mut plane = ControlPlane::new(
            Arc::new(ifaces),
            NhTunables::default(),
            tx,
            handlers,
            Arc::new(MetricsRegistry::new()),
        );
        plane.bring_up().unwrap();
        (plane, rx)
    }

    fn data_packet(dst: Ipv6Addr) -> Packet {
        let src: Ipv6Addr = "2001:db8::254".parse().unwrap();
        Packet::ipv6(build_header(&src, &dst, 59, 0, 64).to_vec(), 0, 5)
    }

    #[test]
    fn gateway_without_iface_inherits_parent() {
        let (mut plane, _rx) = make_plane();
        let dst: Ipv6Addr = "2001:db8::7".parse().unwrap();

        // A gateway record created before its output interface was known
        let gw = plane.pool.create(0, IFACE_ID_UNDEF, dst).unwrap();
        plane.pool.get_mut(gw).unwrap().flags |= NhFlags::GATEWAY;

        plane.handle_unreachable(data_packet(dst), 1000);

        let nh = plane.pool.get(gw).unwrap();
        assert_eq!(nh.iface_id, 5);
        assert!(nh.flags.contains(NhFlags::PENDING));
        assert_eq!(nh.held_count(), 1);
        assert_eq!(plane.rib.lookup(0, 5, &dst).unwrap().prefix_len, 128);
    }

    #[test]
    #[should_panic(expected = "wrong interface")]
    fn mismatched_child_iface_aborts() {
        let (mut plane, _rx) = make_plane();
        let dst: Ipv6Addr = "2001:db8::7".parse().unwrap();

        // A non-gateway record with no interface: nothing may repair it,
        // so using it for forwarding is table corruption.
        plane.pool.create(0, IFACE_ID_UNDEF, dst).unwrap();

        plane.handle_unreachable(data_packet(dst), 1000);
    }
}
