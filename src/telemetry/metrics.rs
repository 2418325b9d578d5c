//! Metrics collection for neighbor resolution.
//!
//! Thread-safe counters shared between the datapath workers and the
//! control thread. Datapath errors never surface as results; they land
//! here as per-edge drop counts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Global metrics registry.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Packets dropped per datapath edge, keyed by edge name.
    edge_drops: RwLock<HashMap<&'static str, Counter>>,

    // NDP metrics
    /// Neighbor solicitations emitted.
    pub solicits_sent: Counter,
    /// Neighbor advertisements emitted.
    pub advertisements_sent: Counter,
    /// Neighbors learned or refreshed from received probes.
    pub neighbors_learned: Counter,
    /// Next-hops that exhausted their probe budget.
    pub resolutions_failed: Counter,

    // Hold-queue metrics
    /// Packets parked awaiting resolution.
    pub held_enqueued: Counter,
    /// Held packets re-posted after resolution.
    pub held_flushed: Counter,
    /// Packets dropped because a hold queue was full.
    pub held_dropped: Counter,

    // Ring metrics
    /// Messages dropped because the control ring was full.
    pub ring_full_drops: Counter,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a packet dropped on a named datapath edge.
    pub fn edge_drop(&self, edge: &'static str) {
        {
            let drops = self.edge_drops.read().unwrap();
            if let Some(counter) = drops.get(edge) {
                counter.inc();
                return;
            }
        }
        let mut drops = self.edge_drops.write().unwrap();
        drops.entry(edge).or_default().inc();
    }

    /// Current drop count for a named edge.
    pub fn edge_drop_count(&self, edge: &str) -> u64 {
        self.edge_drops
            .read()
            .unwrap()
            .get(edge)
            .map(|c| c.get())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let c = Counter::new();
        c.inc();
        c.add(4);
        assert_eq!(c.get(), 5);
    }

    #[test]
    fn test_edge_drops() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.edge_drop_count("ndp_ns_input_inval"), 0);

        registry.edge_drop("ndp_ns_input_inval");
        registry.edge_drop("ndp_ns_input_inval");
        registry.edge_drop("ndp_ns_input_ignore");

        assert_eq!(registry.edge_drop_count("ndp_ns_input_inval"), 2);
        assert_eq!(registry.edge_drop_count("ndp_ns_input_ignore"), 1);
    }
}
