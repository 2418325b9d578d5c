//! Configuration validation

use super::{parse_cidr6, Config};
use crate::iface::IFACE_ID_UNDEF;
use crate::rib::MAX_VRFS;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            eprintln!("[WARN] {}", warning);
        }
        for error in &self.errors {
            eprintln!("[ERROR] {}", error);
        }
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    let mut seen_ids = HashSet::new();
    for (name, iface) in &config.interfaces {
        if iface.id == IFACE_ID_UNDEF {
            result.error(format!("interface {name}: id {} is reserved", iface.id));
        }
        if !seen_ids.insert(iface.id) {
            result.error(format!("interface {name}: duplicate id {}", iface.id));
        }
        if iface.vrf >= MAX_VRFS {
            result.error(format!("interface {name}: vrf {} out of range", iface.vrf));
        }
        if iface.addrs.is_empty() {
            result.warn(format!("interface {name}: no IPv6 addresses"));
        }
        for addr in &iface.addrs {
            if let Err(e) = parse_cidr6(addr) {
                result.error(format!("interface {name}: {e}"));
            }
        }
    }

    for neighbor in &config.neighbors {
        if !config.interfaces.contains_key(&neighbor.iface) {
            result.error(format!(
                "neighbor {}: unknown interface {}",
                neighbor.ipv6, neighbor.iface
            ));
        }
        if neighbor.vrf >= MAX_VRFS {
            result.error(format!("neighbor {}: vrf {} out of range", neighbor.ipv6, neighbor.vrf));
        }
        if neighbor.ipv6.is_unspecified() || neighbor.ipv6.is_multicast() {
            result.error(format!("neighbor {}: not a unicast address", neighbor.ipv6));
        }
    }

    if config.ndp.max_nexthops == 0 {
        result.error("ndp: max_nexthops must be positive");
    }
    if config.ndp.max_held_pkts == 0 {
        result.warn("ndp: max_held_pkts is 0, packets will never be held");
    }
    if config.ndp.ucast_probes == 0 && config.ndp.bcast_probes == 0 {
        result.error("ndp: probe budget is 0, resolution can never succeed");
    }
    if config.ndp.probe_interval_secs == 0 {
        result.error("ndp: probe_interval_secs must be positive");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_valid_config() {
        let config = parse(
            r#"
            [interfaces.eth0]
            id = 5
            mac = "02:00:00:00:00:01"
            addrs = ["2001:db8::254/64", "fe80::1/64"]

            [[neighbors]]
            iface = "eth0"
            ipv6 = "2001:db8::9"
            mac = "52:54:00:aa:bb:cc"
            "#,
        );
        let result = validate(&config);
        assert!(!result.has_errors(), "errors: {:?}", result.errors);
    }

    #[test]
    fn test_duplicate_iface_id() {
        let config = parse(
            r#"
            [interfaces.eth0]
            id = 5
            mac = "02:00:00:00:00:01"
            addrs = ["fe80::1/64"]

            [interfaces.eth1]
            id = 5
            mac = "02:00:00:00:00:02"
            addrs = ["fe80::2/64"]
            "#,
        );
        assert!(validate(&config).has_errors());
    }

    #[test]
    fn test_bad_cidr() {
        let config = parse(
            r#"
            [interfaces.eth0]
            id = 5
            mac = "02:00:00:00:00:01"
            addrs = ["2001:db8::254"]
            "#,
        );
        assert!(validate(&config).has_errors());
    }

    #[test]
    fn test_neighbor_unknown_iface() {
        let config = parse(
            r#"
            [[neighbors]]
            iface = "eth9"
            ipv6 = "2001:db8::9"
            mac = "52:54:00:aa:bb:cc"
            "#,
        );
        assert!(validate(&config).has_errors());
    }

    #[test]
    fn test_zero_probe_budget() {
        let config = parse(
            r#"
            [ndp]
            ucast_probes = 0
            bcast_probes = 0
            "#,
        );
        assert!(validate(&config).has_errors());
    }
}
