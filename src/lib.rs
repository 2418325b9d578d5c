//! Rudder - Software Router Core
//!
//! IPv6 neighbor discovery and next-hop resolution: the piece of a router
//! that answers "what MAC does this packet leave with?" while traffic
//! keeps flowing and the answer is still being learned.

pub mod capture;
pub mod config;
pub mod control;
pub mod datapath;
pub mod error;
pub mod iface;
pub mod nexthop;
pub mod protocol;
pub mod rib;
pub mod telemetry;

pub use error::{Error, Result};
