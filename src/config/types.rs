//! Configuration types

use crate::nexthop::{NhTunables, TICKS_PER_SEC};
use crate::protocol::MacAddr;
use crate::telemetry::LogConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::Ipv6Addr;

/// User-defined configuration (config.toml)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub interfaces: HashMap<String, InterfaceConfig>,
    #[serde(default)]
    pub neighbors: Vec<NeighborConfig>,
    #[serde(default)]
    pub ndp: NdpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceConfig {
    /// Stable interface id used by the control plane and API
    pub id: u16,
    #[serde(default)]
    pub vrf: u16,
    pub mac: MacAddr,
    /// IPv6 addresses in CIDR notation (e.g. "2001:db8::1/64")
    #[serde(default)]
    pub addrs: Vec<String>,
}

/// Statically configured neighbor, re-applied at startup
#[derive(Debug, Clone, Deserialize)]
pub struct NeighborConfig {
    #[serde(default)]
    pub vrf: u16,
    /// Interface name, referencing a key of `interfaces`
    pub iface: String,
    pub ipv6: Ipv6Addr,
    pub mac: MacAddr,
}

/// Neighbor discovery tunables
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NdpConfig {
    pub max_nexthops: usize,
    pub max_held_pkts: usize,
    pub ucast_probes: u8,
    pub bcast_probes: u8,
    pub probe_interval_secs: u64,
    pub reachable_time_secs: u64,
}

impl Default for NdpConfig {
    fn default() -> Self {
        Self {
            max_nexthops: 1024,
            max_held_pkts: 256,
            ucast_probes: 3,
            bcast_probes: 3,
            probe_interval_secs: 1,
            reachable_time_secs: 30,
        }
    }
}

impl NdpConfig {
    pub fn tunables(&self) -> NhTunables {
        NhTunables {
            max_nexthops: self.max_nexthops,
            max_held_pkts: self.max_held_pkts,
            ucast_probes: self.ucast_probes,
            bcast_probes: self.bcast_probes,
            probe_interval: self.probe_interval_secs * TICKS_PER_SEC,
            reachable_time: self.reachable_time_secs * TICKS_PER_SEC,
        }
    }
}
