//! Kubernetes object events through to published static routes

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use k8s_openapi::api::core::v1::{Node, NodeAddress, NodeSpec, NodeStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use lbgraph_control::apis::CALICO_IPV4_ANNOTATION;
use lbgraph_control::{CniPlugin, StateConfig, StateError, StateRegistry, StaticRoute};
use serde_json::json;
use std::collections::BTreeMap;

fn registry(plugin: CniPlugin) -> StateRegistry {
    StateRegistry::new(StateConfig {
        cni_plugin: plugin,
        ..StateConfig::default()
    })
}

fn routes(registry: &StateRegistry) -> Vec<StaticRoute> {
    registry
        .graphs()
        .get(&registry.config().vrf_graph_key())
        .and_then(|graph| graph.vrf().cloned())
        .map(|vrf| vrf.static_routes().as_ref().clone())
        .unwrap_or_default()
}

fn dynamic(name: &str, data: serde_json::Value) -> DynamicObject {
    DynamicObject {
        types: None,
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        },
        data,
    }
}

fn node(name: &str, annotation: Option<&str>, internal_ip: Option<&str>, pod_cidrs: &[&str]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations: annotation.map(|value| {
                BTreeMap::from([(CALICO_IPV4_ANNOTATION.to_string(), value.to_string())])
            }),
            ..ObjectMeta::default()
        },
        spec: Some(NodeSpec {
            pod_cidrs: Some(pod_cidrs.iter().map(|c| c.to_string()).collect()),
            ..NodeSpec::default()
        }),
        status: Some(NodeStatus {
            addresses: internal_ip.map(|ip| {
                vec![NodeAddress {
                    address: ip.to_string(),
                    type_: "InternalIP".to_string(),
                }]
            }),
            ..NodeStatus::default()
        }),
    }
}

fn block_affinity(name: &str, node: &str, cidr: &str, deleted: &str) -> DynamicObject {
    dynamic(
        name,
        json!({"spec": {"cidr": cidr, "node": node, "state": "confirmed", "deleted": deleted}}),
    )
}

// =============================================================================
// Calico
// =============================================================================

#[test]
fn test_calico_block_affinity_flow() {
    let registry = registry(CniPlugin::Calico);
    let synth = registry.synthesizer();

    synth
        .handle_node(&node("node1", Some("10.1.1.2/24"), Some("192.168.0.5"), &[]), false)
        .unwrap();
    let summary = synth
        .handle_block_affinity(&block_affinity("node1-10-133-0-0-26", "node1", "10.133.0.0/26", "false"), false)
        .unwrap();
    assert_eq!(summary.route_count, 1);

    let published = routes(&registry);
    assert_eq!(published[0].route_id, "cluster-1-0");
    assert_eq!(published[0].next_hop_address, "10.1.1.2");

    // Calico marks the affinity deleted before removing it
    synth
        .handle_block_affinity(&block_affinity("node1-10-133-0-0-26", "node1", "10.133.0.0/26", "true"), false)
        .unwrap();
    assert!(routes(&registry).is_empty());
}

#[test]
fn test_calico_watch_delete_needs_only_name() {
    let registry = registry(CniPlugin::Calico);
    let synth = registry.synthesizer();
    synth
        .handle_node(&node("node1", Some("10.1.1.2/24"), None, &[]), false)
        .unwrap();
    synth
        .handle_block_affinity(&block_affinity("ba1", "node1", "10.133.0.0/26", "false"), false)
        .unwrap();

    let summary = synth
        .handle_block_affinity(&dynamic("ba1", json!({})), true)
        .unwrap();
    assert_eq!(summary.route_count, 0);
}

#[test]
fn test_malformed_block_affinity_is_soft() {
    let registry = registry(CniPlugin::Calico);
    let synth = registry.synthesizer();
    synth
        .handle_node(&node("node1", Some("10.1.1.2/24"), None, &[]), false)
        .unwrap();

    let summary = synth
        .handle_block_affinity(&block_affinity("ba1", "node1", "malformedIp", "false"), false)
        .unwrap();
    assert_eq!(summary.route_count, 0);
    assert_eq!(summary.skipped_blocks, 1);
}

#[test]
fn test_block_affinity_without_node_is_rejected() {
    let registry = registry(CniPlugin::Calico);
    let err = registry
        .synthesizer()
        .handle_block_affinity(&dynamic("ba1", json!({"spec": {"cidr": "10.133.0.0/26", "node": ""}})), false)
        .unwrap_err();
    assert!(matches!(err, StateError::InvalidObject { .. }));
    assert!(routes(&registry).is_empty());
}

// =============================================================================
// Cilium
// =============================================================================

#[test]
fn test_cilium_node_flow() {
    let registry = registry(CniPlugin::Cilium);
    let synth = registry.synthesizer();

    let cilium = dynamic(
        "node1",
        json!({"spec": {
            "addresses": [{"type": "InternalIP", "ip": "10.1.1.2"}],
            "ipam": {"podCIDRs": ["10.128.0.0/23", "10.128.2.0/23", "10.128.0.0/23"]}
        }}),
    );
    let summary = synth.handle_cilium_node(&cilium, false).unwrap();
    assert_eq!(summary.route_count, 2);

    let routes = routes(&registry);
    assert_eq!(routes[0].route_id, "cluster-1-0");
    assert_eq!(routes[1].route_id, "cluster-1-1");
    assert!(routes.iter().all(|route| route.next_hop_address == "10.1.1.2"));

    let summary = synth
        .handle_cilium_node(&dynamic("node1", json!({})), true)
        .unwrap();
    assert_eq!(summary.route_count, 0);
}

#[test]
fn test_cilium_node_updates_cidrs() {
    let registry = registry(CniPlugin::Cilium);
    let synth = registry.synthesizer();
    let with = |cidrs: serde_json::Value| {
        dynamic(
            "node1",
            json!({"spec": {
                "addresses": [{"type": "InternalIP", "ip": "10.1.1.2"}],
                "ipam": {"podCIDRs": cidrs}
            }}),
        )
    };

    synth
        .handle_cilium_node(&with(json!(["10.128.0.0/23", "10.128.2.0/23"])), false)
        .unwrap();
    synth
        .handle_cilium_node(&with(json!(["10.128.2.0/23"])), false)
        .unwrap();

    let routes = routes(&registry);
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].prefix.network_address, "10.128.2.0");
}

// =============================================================================
// Node spec fallback
// =============================================================================

#[test]
fn test_node_pod_cidrs_without_cni_resource() {
    let registry = registry(CniPlugin::Other);
    let synth = registry.synthesizer();

    let summary = synth
        .handle_node(&node("node1", None, Some("10.1.1.2"), &["10.244.1.0/24"]), false)
        .unwrap();
    assert_eq!(summary.route_count, 1);
    assert_eq!(routes(&registry)[0].prefix.network_address, "10.244.1.0");

    let summary = synth
        .handle_node(&node("node1", None, Some("10.1.1.2"), &[]), true)
        .unwrap();
    assert_eq!(summary.route_count, 0);
    assert!(registry.nodes().blocks_for_node("node1").is_empty());
}

#[test]
fn test_unnamed_node_rejected() {
    let registry = registry(CniPlugin::Other);
    let mut n = node("node1", None, Some("10.1.1.2"), &[]);
    n.metadata.name = None;
    assert!(registry.synthesizer().handle_node(&n, false).is_err());
    assert!(registry.synthesizer().handle_node(&n, true).is_err());
}
