//! Packet I/O
//!
//! A raw AF_PACKET socket per interface feeds the datapath workers.

mod af_packet;

pub use af_packet::AfPacketSocket;
