//! Configuration management
//!
//! Loads and validates config.toml, and builds the interface inventory
//! from it.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::iface::{Iface, IfaceTable};
use crate::{Error, Result};
use std::net::Ipv6Addr;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    let config: Config = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
    Ok(config)
}

/// Parse IPv6 CIDR notation (e.g. "2001:db8::1/64")
pub fn parse_cidr6(cidr: &str) -> Result<(Ipv6Addr, u8)> {
    let (addr, len) = cidr
        .split_once('/')
        .ok_or_else(|| Error::Config(format!("{cidr}: missing prefix length")))?;
    let addr: Ipv6Addr = addr
        .parse()
        .map_err(|_| Error::Config(format!("{cidr}: bad address")))?;
    let len: u8 = len
        .parse()
        .map_err(|_| Error::Config(format!("{cidr}: bad prefix length")))?;
    if len > 128 {
        return Err(Error::Config(format!("{cidr}: prefix length > 128")));
    }
    Ok((addr, len))
}

/// Build the interface inventory from configuration.
pub fn build_ifaces(config: &Config) -> Result<IfaceTable> {
    let mut table = IfaceTable::new();
    for (name, cfg) in &config.interfaces {
        let mut addrs = Vec::with_capacity(cfg.addrs.len());
        for cidr in &cfg.addrs {
            addrs.push(parse_cidr6(cidr)?);
        }
        table.insert(Iface {
            id: cfg.id,
            name: name.clone(),
            vrf_id: cfg.vrf,
            mac: cfg.mac,
            addrs,
        });
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cidr6() {
        let (addr, len) = parse_cidr6("2001:db8::1/64").unwrap();
        assert_eq!(addr, "2001:db8::1".parse::<Ipv6Addr>().unwrap());
        assert_eq!(len, 64);

        assert!(parse_cidr6("2001:db8::1").is_err());
        assert!(parse_cidr6("zzz/64").is_err());
        assert!(parse_cidr6("2001:db8::1/129").is_err());
    }

    #[test]
    fn test_build_ifaces() {
        let config: Config = toml::from_str(
            r#"
            [interfaces.eth0]
            id = 5
            vrf = 1
            mac = "02:00:00:00:00:01"
            addrs = ["2001:db8::254/64"]
            "#,
        )
        .unwrap();

        let table = build_ifaces(&config).unwrap();
        let iface = table.from_id(5).unwrap();
        assert_eq!(iface.name, "eth0");
        assert_eq!(iface.vrf_id, 1);
        assert_eq!(iface.addrs.len(), 1);
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.ndp.max_held_pkts, 256);
        assert_eq!(config.ndp.ucast_probes, 3);
        assert_eq!(config.ndp.bcast_probes, 3);
        assert_eq!(config.ndp.probe_interval_secs, 1);
        assert_eq!(config.ndp.reachable_time_secs, 30);
        assert!(config.interfaces.is_empty());
        assert!(config.neighbors.is_empty());
    }
}
