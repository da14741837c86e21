//! Static route definitions (desired-state representation)
//!
//! These are the values the synthesizer publishes on a VRF node and the
//! publisher later serializes for the load-balancer controller.

use lbgraph_common::Ipv4Prefix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Destination network of a static route
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpPrefix {
    /// Network address with host bits cleared (e.g., "10.133.0.0")
    pub network_address: String,

    /// Prefix length (0-32)
    pub mask_len: u8,
}

impl From<Ipv4Prefix> for IpPrefix {
    fn from(prefix: Ipv4Prefix) -> Self {
        Self {
            network_address: prefix.network().to_string(),
            mask_len: prefix.mask_len(),
        }
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network_address, self.mask_len)
    }
}

/// One pod-CIDR route: traffic for `prefix` goes to the owning node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaticRoute {
    /// `<cluster>-<route id prefix>-<index>`
    pub route_id: String,

    /// Pod CIDR block owned by the node
    pub prefix: IpPrefix,

    /// Node primary IPv4 address
    pub next_hop_address: String,
}

impl StaticRoute {
    pub fn new(route_id: String, prefix: Ipv4Prefix, next_hop: Ipv4Addr) -> Self {
        Self {
            route_id,
            prefix: prefix.into(),
            next_hop_address: next_hop.to_string(),
        }
    }
}

/// Build the deterministic route identifier for a node's `index`-th block
pub fn route_id(cluster_name: &str, route_id_prefix: &str, index: usize) -> String {
    format!("{}-{}-{}", cluster_name, route_id_prefix, index)
}
