//! Static-route synthesis end to end
//!
//! Drives the synthesizer through its trigger methods and reads the routes
//! back through the graph store, the way the publisher does.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use lbgraph_control::listers::NodeInfo;
use lbgraph_control::{StateConfig, StateRegistry, StaticRoute, VrfNode};
use proptest::prelude::*;
use std::net::Ipv4Addr;
use std::sync::Arc;

const N1_IP: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 2);
const N2_IP: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 3);

fn vrf(registry: &StateRegistry) -> Arc<VrfNode> {
    registry
        .graphs()
        .get(&registry.config().vrf_graph_key())
        .expect("VRF graph saved")
        .vrf()
        .cloned()
        .expect("graph carries a VRF node")
}

fn routes(registry: &StateRegistry) -> Vec<StaticRoute> {
    vrf(registry).static_routes().as_ref().clone()
}

fn route_ids(registry: &StateRegistry) -> Vec<String> {
    routes(registry).into_iter().map(|r| r.route_id).collect()
}

fn n1_with_block(registry: &StateRegistry) {
    let synth = registry.synthesizer();
    synth.node_updated(NodeInfo::new("n1", Some(N1_IP)));
    synth.block_applied("n1", "n1-10-133-0-0-26", "10.133.0.0/26");
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_scenario_single_block() {
    let registry = StateRegistry::default();
    n1_with_block(&registry);

    let prefix = vrf(&registry).route_id_prefix("n1").unwrap();
    let routes = routes(&registry);
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].route_id, format!("cluster-{}-0", prefix));
    assert_eq!(routes[0].next_hop_address, "10.1.1.2");
    assert_eq!(routes[0].prefix.network_address, "10.133.0.0");
    assert_eq!(routes[0].prefix.mask_len, 26);
}

#[test]
fn test_scenario_second_block_then_removed() {
    let registry = StateRegistry::default();
    n1_with_block(&registry);
    let synth = registry.synthesizer();

    synth.block_applied("n1", "n1-10-134-0-0-26", "10.134.0.0/26");
    let prefix = vrf(&registry).route_id_prefix("n1").unwrap();
    assert_eq!(
        route_ids(&registry),
        vec![format!("cluster-{}-0", prefix), format!("cluster-{}-1", prefix)]
    );

    synth.block_deleted("n1-10-134-0-0-26");
    assert_eq!(route_ids(&registry), vec![format!("cluster-{}-0", prefix)]);
    assert_eq!(routes(&registry)[0].prefix.network_address, "10.133.0.0");
}

#[test]
fn test_scenario_node_deleted() {
    let registry = StateRegistry::default();
    n1_with_block(&registry);

    let summary = registry.synthesizer().node_deleted("n1");
    assert_eq!(summary.route_count, 0);
    assert!(routes(&registry).is_empty());
    assert!(!vrf(&registry).node_static_routes().contains_key("n1"));
}

#[test]
fn test_scenario_first_seen_order() {
    let registry = StateRegistry::default();
    let synth = registry.synthesizer();

    // n2 produces a route first
    synth.node_updated(NodeInfo::new("n2", Some(N2_IP)));
    synth.block_applied("n2", "ba-n2", "10.134.0.0/26");
    synth.node_updated(NodeInfo::new("n1", Some(N1_IP)));
    synth.block_applied("n1", "ba-n1", "10.133.0.0/26");

    // n1 updated last, n2 still first
    synth.block_applied("n1", "ba-n1", "10.135.0.0/26");

    let routes = routes(&registry);
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0].next_hop_address, "10.1.1.3");
    assert_eq!(routes[1].next_hop_address, "10.1.1.2");
    assert_eq!(routes[1].prefix.network_address, "10.135.0.0");
    assert_eq!(vrf(&registry).node_order(), vec!["n2", "n1"]);
}

#[test]
fn test_scenario_empty_cidr_alongside_valid() {
    let registry = StateRegistry::default();
    n1_with_block(&registry);

    let summary = registry.synthesizer().block_applied("n1", "ba-empty", "");
    assert_eq!(summary.route_count, 1);
    assert_eq!(summary.skipped_blocks, 1);
    assert_eq!(vrf(&registry).node_static_routes()["n1"].route_count, 1);
}

// =============================================================================
// Soft failures
// =============================================================================

#[test]
fn test_malformed_blocks_do_not_disturb_siblings() {
    let registry = StateRegistry::default();
    n1_with_block(&registry);
    let synth = registry.synthesizer();
    synth.block_applied("n1", "ba-2", "10.134.0.0/26");
    let before = route_ids(&registry);

    for (source, cidr) in [
        ("ba-empty", ""),
        ("ba-ip", "malformedIp"),
        ("ba-mask", "10.135.0.0/nonintegermask"),
        ("ba-range", "10.136.0.0/33"),
        ("ba-v6", "fd00::/64"),
    ] {
        synth.block_applied("n1", source, cidr);
    }

    assert_eq!(route_ids(&registry), before);
}

#[test]
fn test_node_ip_restored_brings_routes_back() {
    let registry = StateRegistry::default();
    n1_with_block(&registry);
    let synth = registry.synthesizer();
    let prefix = vrf(&registry).route_id_prefix("n1").unwrap();

    synth.node_updated(NodeInfo::new("n1", None));
    assert!(routes(&registry).is_empty());
    assert_eq!(vrf(&registry).route_id_prefix("n1"), Some(prefix.clone()));

    synth.node_updated(NodeInfo::new("n1", Some(Ipv4Addr::new(10, 1, 1, 9))));
    let routes = routes(&registry);
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].route_id, format!("cluster-{}-0", prefix));
    assert_eq!(routes[0].next_hop_address, "10.1.1.9");
}

#[test]
fn test_blocks_before_node_is_known() {
    let registry = StateRegistry::default();
    let synth = registry.synthesizer();

    synth.block_applied("n1", "ba1", "10.133.0.0/26");
    assert!(routes(&registry).is_empty());

    synth.node_updated(NodeInfo::new("n1", Some(N1_IP)));
    assert_eq!(routes(&registry).len(), 1);
}

#[test]
fn test_cluster_name_from_config() {
    let config = StateConfig {
        cluster_name: "east".to_string(),
        ..StateConfig::default()
    };
    let registry = StateRegistry::new(config);
    n1_with_block(&registry);
    assert_eq!(route_ids(&registry), vec!["east-1-0"]);
}

#[test]
fn test_source_group_replaces_blocks() {
    let registry = StateRegistry::default();
    let synth = registry.synthesizer();
    synth.node_updated(NodeInfo::new("n1", Some(N1_IP)));

    let cidrs = vec!["10.128.0.0/23".to_string(), "10.128.2.0/23".to_string()];
    synth.source_group_synced("n1", "n1", &cidrs);
    assert_eq!(routes(&registry).len(), 2);

    synth.source_group_synced("n1", "n1", &cidrs[1..]);
    let routes_now = routes(&registry);
    assert_eq!(routes_now.len(), 1);
    assert_eq!(routes_now[0].prefix.network_address, "10.128.2.0");

    synth.source_group_deleted("n1");
    assert!(routes(&registry).is_empty());
}

#[test]
fn test_concurrent_triggers_converge() {
    let registry = StateRegistry::default();
    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                let synth = registry.synthesizer();
                let node = format!("n{}", i);
                synth.node_updated(NodeInfo::new(node.clone(), Some(Ipv4Addr::new(10, 1, 1, i + 1))));
                synth.block_applied(&node, &format!("ba-{}", i), &format!("10.{}.0.0/26", 100 + i));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let before = routes(&registry);
    assert_eq!(before.len(), 8);
    registry
        .synthesizer()
        .recompute(&registry.config().vrf_graph_key());
    assert_eq!(routes(&registry), before);

    let mut prefixes: Vec<String> = vrf(&registry)
        .node_static_routes()
        .into_values()
        .map(|details| details.route_id_prefix)
        .collect();
    prefixes.sort();
    prefixes.dedup();
    assert_eq!(prefixes.len(), 8);
}

// =============================================================================
// Properties
// =============================================================================

#[derive(Debug, Clone)]
enum Event {
    Node { node: u8, ip: Option<u8> },
    RemoveNode(u8),
    Block { node: u8, source: u8, cidr: String },
    RemoveBlock(u8),
}

fn cidr_text() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => (0u8..4, 24u8..=28).prop_map(|(net, mask)| format!("10.{}.0.0/{}", 130 + net, mask)),
        1 => Just(String::new()),
        1 => Just("malformedIp".to_string()),
        1 => Just("10.1.0.0/nonintegermask".to_string()),
    ]
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![
        2 => (0u8..4, proptest::option::of(1u8..250)).prop_map(|(node, ip)| Event::Node { node, ip }),
        1 => (0u8..4).prop_map(Event::RemoveNode),
        4 => (0u8..4, 0u8..8, cidr_text()).prop_map(|(node, source, cidr)| Event::Block { node, source, cidr }),
        2 => (0u8..8).prop_map(Event::RemoveBlock),
    ]
}

fn apply(registry: &StateRegistry, event: &Event) {
    let synth = registry.synthesizer();
    match event {
        Event::Node { node, ip } => {
            synth.node_updated(NodeInfo::new(
                format!("n{}", node),
                ip.map(|last| Ipv4Addr::new(10, 1, 1, last)),
            ));
        }
        Event::RemoveNode(node) => {
            synth.node_deleted(&format!("n{}", node));
        }
        Event::Block { node, source, cidr } => {
            synth.block_applied(&format!("n{}", node), &format!("ba-{}", source), cidr);
        }
        Event::RemoveBlock(source) => {
            synth.block_deleted(&format!("ba-{}", source));
        }
    }
}

proptest! {
    #[test]
    fn prop_recompute_is_idempotent(events in proptest::collection::vec(event(), 0..40)) {
        let registry = StateRegistry::default();
        for event in &events {
            apply(&registry, event);
        }
        let key = registry.config().vrf_graph_key();
        let first = registry.synthesizer().recompute(&key);
        let routes_first = routes(&registry);
        let second = registry.synthesizer().recompute(&key);

        prop_assert_eq!(routes(&registry), routes_first);
        prop_assert!(!second.changed);
        prop_assert_eq!(first.route_count, second.route_count);
    }

    #[test]
    fn prop_duplicate_blocks_yield_one_route(
        net in 0u8..200,
        mask in 16u8..=30,
        copies in 2usize..5,
    ) {
        let registry = StateRegistry::default();
        let synth = registry.synthesizer();
        synth.node_updated(NodeInfo::new("n1", Some(N1_IP)));
        for copy in 0..copies {
            synth.block_applied("n1", &format!("ba-{}", copy), &format!("10.{}.0.0/{}", net, mask));
        }

        let routes = routes(&registry);
        prop_assert_eq!(routes.len(), 1);
        prop_assert_eq!(routes[0].route_id.as_str(), "cluster-1-0");
    }

    #[test]
    fn prop_route_id_prefix_stable_while_present(
        events in proptest::collection::vec(event(), 0..40),
    ) {
        let registry = StateRegistry::default();
        let synth = registry.synthesizer();
        synth.node_updated(NodeInfo::new("anchor", Some(N1_IP)));
        synth.block_applied("anchor", "anchor-block", "10.200.0.0/26");
        let prefix = vrf(&registry).route_id_prefix("anchor");
        prop_assert!(prefix.is_some());

        for event in &events {
            apply(&registry, event);
            prop_assert_eq!(vrf(&registry).route_id_prefix("anchor"), prefix.clone());
        }
    }
}
