//! CNI custom resources → raw CIDR blocks
//!
//! Both resources are read as `DynamicObject`s, so only the fields used
//! here need to exist:
//!
//! - Calico `BlockAffinity`: `spec.cidr`, `spec.node`, `spec.deleted`
//! - Cilium `CiliumNode`: `spec.ipam.podCIDRs[]`, `spec.addresses[]`
//!
//! A CIDR string is passed through untouched. Validation happens during
//! recompute, where a bad block is skipped instead of failing the object.

use crate::error::StateError;
use kube::core::DynamicObject;
use serde::Deserialize;
use std::net::Ipv4Addr;

pub const BLOCK_AFFINITY_KIND: &str = "BlockAffinity";
pub const CILIUM_NODE_KIND: &str = "CiliumNode";

/// One BlockAffinity event, flattened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockChange {
    /// Object name; the block's source id
    pub source: String,
    pub node: String,
    pub cidr: String,
    /// Calico marks released affinities instead of deleting them at once
    pub deleted: bool,
}

/// The blocks and address a CiliumNode reports for its node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiliumNodeBlocks {
    /// Object name, equal to the Kubernetes node name
    pub node: String,
    pub internal_ip: Option<Ipv4Addr>,
    pub pod_cidrs: Vec<String>,
}

#[derive(Deserialize)]
struct BlockAffinitySpec {
    #[serde(default)]
    cidr: String,
    node: String,
    #[serde(default)]
    deleted: Flag,
}

/// `spec.deleted` is a string in the Calico CRD but a bool in older objects
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

impl Default for Flag {
    fn default() -> Self {
        Flag::Bool(false)
    }
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(value) => *value,
            Flag::Text(text) => text.trim().eq_ignore_ascii_case("true"),
        }
    }
}

#[derive(Deserialize, Default)]
struct CiliumNodeSpec {
    #[serde(default)]
    ipam: CiliumIpam,
    #[serde(default)]
    addresses: Vec<CiliumAddress>,
}

#[derive(Deserialize, Default)]
struct CiliumIpam {
    #[serde(default, rename = "podCIDRs")]
    pod_cidrs: Vec<String>,
}

#[derive(Deserialize)]
struct CiliumAddress {
    #[serde(rename = "type")]
    kind: String,
    ip: String,
}

pub(crate) fn object_name(obj: &DynamicObject, kind: &'static str) -> Result<String, StateError> {
    match obj.metadata.name.as_deref() {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(StateError::invalid(kind, "<unnamed>", "metadata.name is missing")),
    }
}

/// Decode a Calico `BlockAffinity`
pub fn block_affinity_change(obj: &DynamicObject) -> Result<BlockChange, StateError> {
    let name = object_name(obj, BLOCK_AFFINITY_KIND)?;
    let spec = obj
        .data
        .get("spec")
        .ok_or_else(|| StateError::invalid(BLOCK_AFFINITY_KIND, &name, "spec is missing"))?;
    let spec: BlockAffinitySpec = serde_json::from_value(spec.clone())?;

    if spec.node.is_empty() {
        return Err(StateError::invalid(BLOCK_AFFINITY_KIND, &name, "spec.node is empty"));
    }

    Ok(BlockChange {
        source: name,
        node: spec.node,
        cidr: spec.cidr,
        deleted: spec.deleted.is_set(),
    })
}

/// Decode a Cilium `CiliumNode`
///
/// A missing spec yields no blocks and no address.
pub fn cilium_node_blocks(obj: &DynamicObject) -> Result<CiliumNodeBlocks, StateError> {
    let name = object_name(obj, CILIUM_NODE_KIND)?;
    let spec: CiliumNodeSpec = match obj.data.get("spec") {
        Some(spec) => serde_json::from_value(spec.clone())?,
        None => CiliumNodeSpec::default(),
    };

    let internal_ip = spec
        .addresses
        .iter()
        .filter(|address| address.kind == "InternalIP")
        .find_map(|address| address.ip.parse::<Ipv4Addr>().ok());

    Ok(CiliumNodeBlocks {
        node: name,
        internal_ip,
        pod_cidrs: spec.ipam.pod_cidrs,
    })
}
