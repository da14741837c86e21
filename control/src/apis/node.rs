//! Kubernetes `Node` → [`NodeInfo`]

use crate::config::CniPlugin;
use crate::error::StateError;
use crate::listers::NodeInfo;
use k8s_openapi::api::core::v1::Node;
use std::net::Ipv4Addr;

/// Annotation Calico sets to the node's address in CIDR form
pub const CALICO_IPV4_ANNOTATION: &str = "projectcalico.org/IPv4Address";

/// Build the synthesizer's view of a node
///
/// Calico nodes take their address from [`CALICO_IPV4_ANNOTATION`];
/// everything else, and Calico nodes without the annotation, use the first
/// IPv4 `InternalIP` status address.
pub fn node_info(node: &Node, plugin: CniPlugin) -> Result<NodeInfo, StateError> {
    let name = match node.metadata.name.as_deref() {
        Some(name) if !name.is_empty() => name,
        _ => return Err(StateError::invalid("Node", "<unnamed>", "metadata.name is missing")),
    };

    let annotated = match plugin {
        CniPlugin::Calico => calico_annotation_ip(node),
        CniPlugin::Cilium | CniPlugin::Other => None,
    };

    Ok(NodeInfo::new(name, annotated.or_else(|| internal_ipv4(node))))
}

fn calico_annotation_ip(node: &Node) -> Option<Ipv4Addr> {
    let value = node
        .metadata
        .annotations
        .as_ref()?
        .get(CALICO_IPV4_ANNOTATION)?;
    let address = value.split('/').next()?;
    address.trim().parse().ok()
}

fn internal_ipv4(node: &Node) -> Option<Ipv4Addr> {
    node.status
        .as_ref()?
        .addresses
        .as_ref()?
        .iter()
        .filter(|address| address.type_ == "InternalIP")
        .find_map(|address| address.address.parse().ok())
}

/// Pod CIDRs from the node spec, for clusters without a CNI resource
pub fn node_pod_cidrs(node: &Node) -> Vec<String> {
    let Some(spec) = node.spec.as_ref() else {
        return Vec::new();
    };
    match spec.pod_cidrs.as_ref() {
        Some(cidrs) if !cidrs.is_empty() => cidrs.clone(),
        _ => spec.pod_cidr.iter().cloned().collect(),
    }
}
