//! Resolution state machine
//!
//! Drives each next-hop through incomplete, reachable, stale, probing, and
//! failed states. All entry points run on the control thread and take the
//! current tick explicitly; actions come back as [`NhEvent`] values for the
//! caller to execute.

use super::{NhFlags, NhIdx, NhPool};
use crate::datapath::Packet;
use crate::protocol::MacAddr;

/// Action requested by a state transition
#[derive(Debug)]
pub enum NhEvent {
    /// Emit a neighbor solicitation for this next-hop
    Solicit(NhIdx),
    /// Reachable lifetime expired
    Stale(NhIdx),
    /// Probe budget exhausted; the hold queue was dropped
    Failed { nh: NhIdx, dropped: usize },
}

/// Timer pass over the whole pool.
///
/// Pending next-hops get re-solicited every probe interval until the probe
/// budget runs out, then fail. Reachable next-hops whose confirmation aged
/// out go stale. Static next-hops are never touched.
pub fn probe_tick(pool: &mut NhPool, now: u64) -> Vec<NhEvent> {
    let t = *pool.tunables();
    let budget = t.ucast_probes as u32 + t.bcast_probes as u32;
    let mut events = Vec::new();

    for idx in pool.indices() {
        let Some(nh) = pool.get_mut(idx) else {
            continue;
        };
        if nh.flags.contains(NhFlags::STATIC) {
            continue;
        }

        if nh.flags.contains(NhFlags::PENDING) {
            if nh.last_request != 0 && now < nh.last_request + t.probe_interval {
                continue;
            }
            if nh.total_probes() < budget {
                events.push(NhEvent::Solicit(idx));
            } else {
                nh.flags.remove(NhFlags::PENDING | NhFlags::STALE);
                nh.flags.insert(NhFlags::FAILED);
                let dropped = nh.drain_held().len();
                events.push(NhEvent::Failed { nh: idx, dropped });
            }
        } else if nh.flags.contains(NhFlags::REACHABLE)
            && nh.last_reply != 0
            && now.saturating_sub(nh.last_reply) >= t.reachable_time
        {
            nh.flags.remove(NhFlags::REACHABLE);
            nh.flags.insert(NhFlags::STALE);
            events.push(NhEvent::Stale(idx));
        }
    }

    events
}

/// Apply a reachability confirmation (NA, or the learn copy of an NS).
///
/// Refreshes every field and returns the held packets to flush, in enqueue
/// order. Static next-hops never need updating; the caller filters them.
pub fn confirm_reachable(
    pool: &mut NhPool,
    idx: NhIdx,
    iface_id: u16,
    lladdr: MacAddr,
    now: u64,
) -> Vec<Packet> {
    pool.set_iface(idx, iface_id);
    let Some(nh) = pool.get_mut(idx) else {
        return Vec::new();
    };

    nh.last_reply = now;
    nh.flags.insert(NhFlags::REACHABLE);
    nh.flags
        .remove(NhFlags::STALE | NhFlags::PENDING | NhFlags::FAILED);
    nh.ucast_probes = 0;
    nh.bcast_probes = 0;
    nh.lladdr = lladdr;

    nh.drain_held()
}

/// A failed next-hop gets a fresh probe budget when traffic returns.
pub fn restart_resolution(pool: &mut NhPool, idx: NhIdx) {
    if let Some(nh) = pool.get_mut(idx) {
        nh.flags.remove(NhFlags::FAILED);
        nh.ucast_probes = 0;
        nh.bcast_probes = 0;
        nh.last_request = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nexthop::{AddrFamily, NhTunables, TICKS_PER_SEC};
    use std::net::Ipv6Addr;

    fn addr(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    fn make_pool() -> NhPool {
        NhPool::new(AddrFamily::V6, NhTunables::default())
    }

    fn pending_nh(pool: &mut NhPool) -> NhIdx {
        let idx = pool.create(0, 5, addr("2001:db8::1")).unwrap();
        pool.get_mut(idx).unwrap().flags |= NhFlags::PENDING;
        idx
    }

    #[test]
    fn test_pending_solicits_until_budget() {
        let mut pool = make_pool();
        let idx = pending_nh(&mut pool);
        let mut now = 0;

        // Six probes (3 unicast + 3 multicast budget), then failure
        for round in 0..6 {
            let events = probe_tick(&mut pool, now);
            assert!(
                matches!(events.as_slice(), [NhEvent::Solicit(i)] if *i == idx),
                "round {round}: expected a solicit"
            );
            // The probe emitter stamps the request and counts the probe
            let nh = pool.get_mut(idx).unwrap();
            nh.last_request = now;
            nh.bcast_probes += 1;
            now += TICKS_PER_SEC;
        }

        let events = probe_tick(&mut pool, now);
        assert!(matches!(
            events.as_slice(),
            [NhEvent::Failed { dropped: 0, .. }]
        ));
        let nh = pool.get(idx).unwrap();
        assert!(nh.flags.contains(NhFlags::FAILED));
        assert!(!nh.flags.contains(NhFlags::PENDING));
    }

    #[test]
    fn test_pending_not_due_before_interval() {
        let mut pool = make_pool();
        let idx = pending_nh(&mut pool);
        pool.get_mut(idx).unwrap().last_request = 100;

        // Half an interval after the last request: nothing to do
        let events = probe_tick(&mut pool, 100 + TICKS_PER_SEC / 2);
        assert!(events.is_empty());
    }

    #[test]
    fn test_failed_drops_held() {
        let mut pool = make_pool();
        let idx = pending_nh(&mut pool);
        {
            let nh = pool.get_mut(idx).unwrap();
            nh.ucast_probes = 3;
            nh.bcast_probes = 3;
            nh.hold(Packet::ipv6(vec![0u8; 40], 0, 5), 16);
            nh.hold(Packet::ipv6(vec![0u8; 40], 0, 5), 16);
        }

        let events = probe_tick(&mut pool, TICKS_PER_SEC);
        assert!(matches!(
            events.as_slice(),
            [NhEvent::Failed { dropped: 2, .. }]
        ));
        assert_eq!(pool.get(idx).unwrap().held_count(), 0);
    }

    #[test]
    fn test_reachable_goes_stale() {
        let mut pool = make_pool();
        let idx = pool.create(0, 5, addr("2001:db8::1")).unwrap();
        {
            let nh = pool.get_mut(idx).unwrap();
            nh.flags |= NhFlags::REACHABLE;
            nh.last_reply = TICKS_PER_SEC;
        }

        // Fresh: no transition
        assert!(probe_tick(&mut pool, 2 * TICKS_PER_SEC).is_empty());

        let events = probe_tick(&mut pool, TICKS_PER_SEC + 30 * TICKS_PER_SEC);
        assert!(matches!(events.as_slice(), [NhEvent::Stale(_)]));
        let nh = pool.get(idx).unwrap();
        assert!(nh.flags.contains(NhFlags::STALE));
        assert!(!nh.flags.contains(NhFlags::REACHABLE));
    }

    #[test]
    fn test_static_never_expires() {
        let mut pool = make_pool();
        let idx = pool.create(0, 5, addr("2001:db8::1")).unwrap();
        {
            let nh = pool.get_mut(idx).unwrap();
            nh.flags |= NhFlags::STATIC | NhFlags::REACHABLE | NhFlags::PENDING;
            nh.last_reply = 1;
        }

        let events = probe_tick(&mut pool, u64::MAX / 2);
        assert!(events.is_empty());
        assert!(pool.get(idx).unwrap().flags.contains(NhFlags::REACHABLE));
    }

    #[test]
    fn test_confirm_reachable_clears_and_flushes() {
        let mut pool = make_pool();
        let idx = pending_nh(&mut pool);
        {
            let nh = pool.get_mut(idx).unwrap();
            nh.flags |= NhFlags::STALE | NhFlags::FAILED;
            nh.ucast_probes = 2;
            let mut pkt = Packet::ipv6(vec![0u8; 40], 0, 5);
            pkt.data[0] = 1;
            nh.hold(pkt, 16);
            let mut pkt = Packet::ipv6(vec![0u8; 40], 0, 5);
            pkt.data[0] = 2;
            nh.hold(pkt, 16);
        }

        let mac = MacAddr([0x52, 0x54, 0x00, 0xaa, 0xbb, 0xcc]);
        let flushed = confirm_reachable(&mut pool, idx, 5, mac, 42);

        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].data[0], 1);
        assert_eq!(flushed[1].data[0], 2);

        let nh = pool.get(idx).unwrap();
        assert!(nh.flags.contains(NhFlags::REACHABLE));
        assert!(!nh
            .flags
            .intersects(NhFlags::STALE | NhFlags::PENDING | NhFlags::FAILED));
        assert_eq!(nh.lladdr, mac);
        assert_eq!(nh.last_reply, 42);
        assert_eq!(nh.total_probes(), 0);
    }

    #[test]
    fn test_restart_resolution() {
        let mut pool = make_pool();
        let idx = pool.create(0, 5, addr("2001:db8::1")).unwrap();
        {
            let nh = pool.get_mut(idx).unwrap();
            nh.flags |= NhFlags::FAILED;
            nh.ucast_probes = 3;
            nh.bcast_probes = 3;
            nh.last_request = 99;
        }

        restart_resolution(&mut pool, idx);

        let nh = pool.get(idx).unwrap();
        assert!(!nh.flags.contains(NhFlags::FAILED));
        assert_eq!(nh.total_probes(), 0);
        assert_eq!(nh.last_request, 0);
    }
}
