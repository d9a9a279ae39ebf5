//! Deterministic address planning for cluster members
//!
//! Maps a requested node count and a CIDR onto a fixed id → IPv4 assignment.
//! Recovery heuristics elsewhere (the one-ahead backup ring) depend on this
//! assignment being stable, so ids are contiguous from 1 and IPs ascend with
//! the id.

use crate::common::{Error, Result};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Coordination member id → IPv4 address, in ascending id order.
pub type Ensemble = BTreeMap<u32, Ipv4Addr>;

/// Subnet layout for the dedicated cluster network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPlan {
    /// The validated CIDR string, e.g. `169.254.3.0/24`
    pub cidr: String,
    /// First three octets, shared by every member address
    pub prefix: String,
    /// Prefix length; only /16 and /24 are supported
    pub notation_bits: u8,
    /// Forced gateway for /24 networks; /16 leaves it to the runtime
    pub gateway: Option<Ipv4Addr>,
}

impl NetworkPlan {
    /// Validate a CIDR string and derive the subnet layout.
    ///
    /// Fails with `InvalidConfig` naming the offending token before any
    /// provisioning side effect can happen.
    pub fn parse(cidr: &str) -> Result<Self> {
        let parts: Vec<&str> = cidr.split('/').collect();
        if parts.len() != 2 {
            return Err(Error::InvalidConfig(format!(
                "missing required '/' in cidr, provided: {}",
                cidr
            )));
        }

        let notation_bits: u8 = parts[1].parse().map_err(|_| {
            Error::InvalidConfig(format!("non-numeric cidr notation, provided: {}", cidr))
        })?;
        if notation_bits != 16 && notation_bits != 24 {
            return Err(Error::InvalidConfig(format!(
                "only cidr notation of /16 or /24 is supported, provided: {}",
                cidr
            )));
        }

        let octets: Vec<&str> = parts[0].split('.').collect();
        if octets.len() != 4 || octets.iter().any(|o| o.parse::<u8>().is_err()) {
            return Err(Error::InvalidConfig(format!(
                "IPv4 format with 4 numbers expected, provided: {}",
                cidr
            )));
        }
        let prefix = octets[0..3].join(".");

        // The runtime picks a gateway on /16; on /24 we pin the top of the
        // host range so it never collides with a member address.
        let gateway = if notation_bits == 24 {
            Some(parse_ip(&format!("{}.254", prefix))?)
        } else {
            None
        };

        Ok(Self {
            cidr: cidr.to_string(),
            prefix,
            notation_bits,
            gateway,
        })
    }
}

/// Compute the network plan and member address assignment for a cluster.
///
/// Ids run 1..=node_count and member `i` gets `<prefix>.<i>`. Identical
/// inputs always produce identical output.
pub fn plan(node_count: u32, cidr: &str) -> Result<(NetworkPlan, Ensemble)> {
    let network = NetworkPlan::parse(cidr)?;

    if node_count < 3 {
        return Err(Error::InvalidConfig(format!(
            "node count must be at least 3, provided: {}",
            node_count
        )));
    }
    // Members always occupy <prefix>.1..=<prefix>.N. On /24 the gateway is
    // pinned to .254, so .253 is the last usable address; on /16 the final
    // octet itself caps the count.
    let max_members = if network.notation_bits == 24 { 253 } else { 255 };
    if node_count > max_members {
        return Err(Error::InvalidConfig(format!(
            "a /{} network holds at most {} members with this layout, provided: {}",
            network.notation_bits, max_members, node_count
        )));
    }

    let mut ensemble = Ensemble::new();
    for i in 1..=node_count {
        ensemble.insert(i, parse_ip(&format!("{}.{}", network.prefix, i))?);
    }

    Ok((network, ensemble))
}

/// Comma-joined `<ip>:<port>` list of coordination-service members.
pub fn external_storage_string(ensemble: &Ensemble, port: u16) -> String {
    ensemble
        .values()
        .map(|ip| format!("{}:{}", ip, port))
        .collect::<Vec<_>>()
        .join(",")
}

/// The `zk:`-prefixed connection string handed to storage clients.
pub fn external_storage_uri(ensemble: &Ensemble, port: u16) -> String {
    format!("zk:{}", external_storage_string(ensemble, port))
}

/// Space-joined peer list in the coordination service's own
/// `server.<id>=<ip>:2888:3888;2181` notation, used in the container
/// environment so every member knows the full ensemble.
pub fn ensemble_servers_string(ensemble: &Ensemble) -> String {
    ensemble
        .iter()
        .map(|(id, ip)| format!("server.{}={}:2888:3888;2181", id, ip))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_ip(s: &str) -> Result<Ipv4Addr> {
    s.parse()
        .map_err(|_| Error::InvalidConfig(format!("not an IPv4 address: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_assigns_contiguous_ids() {
        let (network, ensemble) = plan(4, "169.254.3.0/24").unwrap();
        assert_eq!(network.prefix, "169.254.3");
        assert_eq!(network.notation_bits, 24);
        assert_eq!(network.gateway, Some("169.254.3.254".parse().unwrap()));
        assert_eq!(ensemble.len(), 4);
        let ids: Vec<u32> = ensemble.keys().copied().collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(ensemble[&1], "169.254.3.1".parse::<Ipv4Addr>().unwrap());
        assert_eq!(ensemble[&4], "169.254.3.4".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let a = plan(5, "10.0.0.0/16").unwrap();
        let b = plan(5, "10.0.0.0/16").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_slash_16_has_no_forced_gateway() {
        let (network, _) = plan(3, "10.0.0.0/16").unwrap();
        assert_eq!(network.gateway, None);
    }

    #[test]
    fn test_invalid_cidrs_rejected() {
        for bad in [
            "169.254.3.0",       // missing '/'
            "169.254.3.0/8",     // unsupported notation
            "169.254.3.0/abc",   // non-numeric notation
            "169.254.3/24",      // too few octets
            "169.254.3.999/24",  // octet out of range
            "not-an-ip/24",
        ] {
            let err = plan(3, bad).unwrap_err();
            assert!(
                matches!(err, Error::InvalidConfig(_)),
                "expected InvalidConfig for {}",
                bad
            );
        }
    }

    #[test]
    fn test_too_few_nodes_rejected() {
        let err = plan(2, "169.254.3.0/24").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_member_capacity_bounds() {
        // /24 tops out at .253, the gateway sits at .254
        let err = plan(254, "169.254.3.0/24").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(plan(253, "169.254.3.0/24").is_ok());

        // /16 is bounded by the final octet; the rejection names the count
        assert!(plan(255, "10.0.0.0/16").is_ok());
        match plan(256, "10.0.0.0/16").unwrap_err() {
            Error::InvalidConfig(msg) => assert!(msg.contains("256")),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_connection_strings() {
        let (_, ensemble) = plan(3, "169.254.3.0/24").unwrap();
        assert_eq!(
            external_storage_string(&ensemble, 2181),
            "169.254.3.1:2181,169.254.3.2:2181,169.254.3.3:2181"
        );
        assert_eq!(
            external_storage_uri(&ensemble, 2181),
            "zk:169.254.3.1:2181,169.254.3.2:2181,169.254.3.3:2181"
        );
        assert_eq!(
            ensemble_servers_string(&ensemble),
            "server.1=169.254.3.1:2888:3888;2181 \
             server.2=169.254.3.2:2888:3888;2181 \
             server.3=169.254.3.3:2888:3888;2181"
        );
    }
}
