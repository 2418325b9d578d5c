//! Control/datapath message ring
//!
//! Lock-free handoff from the forwarding workers to the control thread:
//! multi-producer, single-consumer, bounded. Posting never blocks; a full
//! ring is a load-shedding boundary and the caller drops the packet.
//! Within one producer messages stay FIFO; across producers there is no
//! ordering.

use crate::datapath::Packet;
use crate::nexthop::NhIdx;
use crate::{Error, Result};
use tokio::sync::mpsc;

/// Dense handler id assigned at registration time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u8);

impl HandlerId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Message payload: a packet in flight or a next-hop to act on
#[derive(Debug)]
pub enum Payload {
    Packet(Packet),
    Nexthop(NhIdx),
}

/// One ring entry
#[derive(Debug)]
pub struct StackMessage {
    pub handler: HandlerId,
    pub payload: Payload,
}

/// Name-to-id registry, populated once at startup
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    names: Vec<&'static str>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler name, returning its id. Registering the same
    /// name twice returns the existing id.
    pub fn register(&mut self, name: &'static str) -> HandlerId {
        if let Some(pos) = self.names.iter().position(|n| *n == name) {
            return HandlerId(pos as u8);
        }
        self.names.push(name);
        HandlerId((self.names.len() - 1) as u8)
    }

    pub fn id_of(&self, name: &str) -> Option<HandlerId> {
        self.names
            .iter()
            .position(|n| *n == name)
            .map(|pos| HandlerId(pos as u8))
    }

    pub fn name_of(&self, id: HandlerId) -> Option<&'static str> {
        self.names.get(id.as_usize()).copied()
    }
}

/// Producer half, cloned into every worker
#[derive(Debug, Clone)]
pub struct RingSender {
    tx: mpsc::Sender<StackMessage>,
}

impl RingSender {
    /// Non-blocking post. On a full ring the message is returned to the
    /// caller as an error; the caller frees the packet.
    pub fn post(&self, handler: HandlerId, payload: Payload) -> Result<()> {
        self.tx
            .try_send(StackMessage { handler, payload })
            .map_err(|_| Error::Resource("control ring full".into()))
    }
}

/// Consumer half, held by the control thread
pub type RingReceiver = mpsc::Receiver<StackMessage>;

/// Create a bounded ring.
pub fn ring(capacity: usize) -> (RingSender, RingReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (RingSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_dense_ids() {
        let mut registry = HandlerRegistry::new();
        let a = registry.register("ip6_output");
        let b = registry.register("ndp_ns_output");

        assert_eq!(a.as_usize(), 0);
        assert_eq!(b.as_usize(), 1);
        assert_eq!(registry.register("ip6_output"), a);
        assert_eq!(registry.id_of("ndp_ns_output"), Some(b));
        assert_eq!(registry.name_of(a), Some("ip6_output"));
        assert_eq!(registry.id_of("nope"), None);
    }

    #[test]
    fn test_ring_fifo_per_producer() {
        let (tx, mut rx) = ring(8);
        let mut registry = HandlerRegistry::new();
        let h = registry.register("ndp_ns_output");

        for i in 0..3 {
            tx.post(h, Payload::Nexthop(crate::nexthop::NhIdx(i))).unwrap();
        }

        for i in 0..3usize {
            match rx.try_recv().unwrap().payload {
                Payload::Nexthop(idx) => assert_eq!(idx.as_usize(), i),
                other => panic!("unexpected payload {other:?}"),
            }
        }
    }

    #[test]
    fn test_ring_full_is_an_error() {
        let (tx, mut rx) = ring(1);
        let mut registry = HandlerRegistry::new();
        let h = registry.register("ndp_ns_output");

        tx.post(h, Payload::Nexthop(crate::nexthop::NhIdx(0))).unwrap();
        assert!(matches!(
            tx.post(h, Payload::Nexthop(crate::nexthop::NhIdx(1))),
            Err(Error::Resource(_))
        ));

        // Draining frees a slot again
        rx.try_recv().unwrap();
        assert!(tx.post(h, Payload::Nexthop(crate::nexthop::NhIdx(2))).is_ok());
    }
}
