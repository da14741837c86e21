//! Static-route synthesizer
//!
//! Rebuilds a VRF node's static routes from the node inventory and the
//! per-node pod-CIDR blocks:
//!
//! ```text
//! NodeLister snapshot ──► synthesize() ──► Vec<StaticRoute> ──► VrfNode (swap)
//!                              │
//!                              └── node slots: first-seen order + route id prefix
//! ```
//!
//! Every recompute builds the whole list from scratch, so the output only
//! depends on the inputs and the slots. A node keeps its slot (position and
//! route id prefix) for as long as it is in the inventory, even while it has
//! no usable block or no address.
//!
//! Bad input is never an error here. Malformed blocks are skipped with a
//! warning and counted in `skipped_cidr_blocks_total`.

use crate::apis::{self, BlockChange};
use crate::config::{CniPlugin, StateConfig};
use crate::error::StateError;
use crate::graph::{GraphStore, NodeRouteDetails, VrfNode, VrfState, VsKey};
use crate::listers::{NodeInfo, NodeLister, NodeSnapshot};
use crate::metrics;
use crate::routes::{route_id, StaticRoute};
use k8s_openapi::api::core::v1::Node;
use kube::core::DynamicObject;
use lbgraph_common::{parse_ipv4_cidr, CidrError, Ipv4Prefix};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one recompute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeSummary {
    pub vs_key: VsKey,
    pub vrf_name: String,
    pub route_count: usize,
    /// Nodes holding a slot after the recompute
    pub node_count: usize,
    pub skipped_blocks: usize,
    /// Whether the published route list differs from the previous one
    pub changed: bool,
}

/// A block left out of the routes
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SkippedBlock {
    pub(crate) node: String,
    pub(crate) source: String,
    pub(crate) cidr: String,
    pub(crate) reason: CidrError,
}

#[derive(Debug, Default)]
pub(crate) struct Synthesis {
    pub(crate) routes: Vec<StaticRoute>,
    pub(crate) skipped: Vec<SkippedBlock>,
}

// =============================================================================
// Pure core
// =============================================================================

/// Recompute routes and slots for one VRF
///
/// Slots of nodes missing from `snapshot` are released. Nodes without a
/// slot get one, in name order, the first time they yield a valid route.
pub(crate) fn synthesize(
    state: &mut VrfState,
    snapshot: &NodeSnapshot,
    cluster_name: &str,
) -> Synthesis {
    let VrfState {
        node_order,
        node_static_routes,
        ..
    } = state;

    node_order.retain(|name| snapshot.nodes.contains_key(name));
    node_static_routes.retain(|name, _| snapshot.nodes.contains_key(name));

    let mut synthesis = Synthesis::default();

    for name in node_order.iter() {
        let Some(details) = node_static_routes.get_mut(name) else {
            continue;
        };
        details.route_count = match node_prefixes(snapshot, name, &mut synthesis.skipped) {
            Some((next_hop, prefixes)) => emit(
                &mut synthesis.routes,
                cluster_name,
                &details.route_id_prefix,
                next_hop,
                &prefixes,
            ),
            None => 0,
        };
    }

    let mut newcomers: Vec<&String> = snapshot
        .nodes
        .keys()
        .filter(|name| !node_static_routes.contains_key(*name))
        .collect();
    newcomers.sort();

    for name in newcomers {
        let Some((next_hop, prefixes)) = node_prefixes(snapshot, name, &mut synthesis.skipped)
        else {
            continue;
        };
        if prefixes.is_empty() {
            continue;
        }

        let route_id_prefix = next_route_id_prefix(node_static_routes);
        let route_count = emit(
            &mut synthesis.routes,
            cluster_name,
            &route_id_prefix,
            next_hop,
            &prefixes,
        );
        debug!(
            "StaticRouteSynthesizer: node {} reserved route id prefix {}",
            name, route_id_prefix
        );
        node_order.push(name.clone());
        node_static_routes.insert(
            name.clone(),
            NodeRouteDetails {
                route_id_prefix,
                route_count,
            },
        );
    }

    synthesis
}

/// Next hop and deduplicated valid prefixes of a node
///
/// `None` when the node has no address; its blocks are not even parsed.
fn node_prefixes(
    snapshot: &NodeSnapshot,
    name: &str,
    skipped: &mut Vec<SkippedBlock>,
) -> Option<(Ipv4Addr, Vec<Ipv4Prefix>)> {
    let next_hop = snapshot.nodes.get(name)?.primary_ipv4?;
    let blocks = snapshot.blocks_for(name);

    let mut prefixes: Vec<Ipv4Prefix> = Vec::with_capacity(blocks.len());
    for block in blocks {
        match parse_ipv4_cidr(&block.cidr) {
            Ok(prefix) if prefixes.contains(&prefix) => {
                debug!(
                    "StaticRouteSynthesizer: node {} block {} repeats {}",
                    name, block.source, prefix
                );
            }
            Ok(prefix) => prefixes.push(prefix),
            Err(reason) => skipped.push(SkippedBlock {
                node: name.to_string(),
                source: block.source.clone(),
                cidr: block.cidr.clone(),
                reason,
            }),
        }
    }
    Some((next_hop, prefixes))
}

fn emit(
    routes: &mut Vec<StaticRoute>,
    cluster_name: &str,
    route_id_prefix: &str,
    next_hop: Ipv4Addr,
    prefixes: &[Ipv4Prefix],
) -> usize {
    routes.extend(prefixes.iter().enumerate().map(|(index, prefix)| {
        StaticRoute::new(route_id(cluster_name, route_id_prefix, index), *prefix, next_hop)
    }));
    prefixes.len()
}

/// Smallest positive integer no live slot uses
fn next_route_id_prefix(slots: &HashMap<String, NodeRouteDetails>) -> String {
    let used: HashSet<u64> = slots
        .values()
        .filter_map(|details| details.route_id_prefix.parse().ok())
        .collect();
    let mut candidate = 1u64;
    while used.contains(&candidate) {
        candidate += 1;
    }
    candidate.to_string()
}

// =============================================================================
// StaticRouteSynthesizer
// =============================================================================

/// Keeps the VRF graph's static routes in step with nodes and CIDR blocks
///
/// Every trigger first updates the [`NodeLister`] and then recomputes the
/// VRF graph named by the configuration. Triggers are not coalesced; each
/// one re-runs the whole computation.
#[derive(Debug, Clone)]
pub struct StaticRouteSynthesizer {
    nodes: NodeLister,
    graphs: GraphStore,
    config: StateConfig,
}

impl StaticRouteSynthesizer {
    pub fn new(nodes: NodeLister, graphs: GraphStore, config: StateConfig) -> Self {
        Self {
            nodes,
            graphs,
            config,
        }
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    pub fn nodes(&self) -> &NodeLister {
        &self.nodes
    }

    /// Rebuild the static routes of the VRF node in `vs_key`'s graph
    ///
    /// A missing graph, or one without a VRF node, is replaced by a graph
    /// holding an empty VRF node first.
    pub fn recompute(&self, vs_key: &VsKey) -> RecomputeSummary {
        let start = Instant::now();
        let vrf = self.vrf_node(vs_key);

        // Inputs are read under the VRF lock so a slower recompute can
        // never publish an older view over a newer one.
        let mut state = vrf.write_state();
        let snapshot = self.nodes.snapshot();
        let previous = state.checksum;

        let synthesis = synthesize(&mut state, &snapshot, &self.config.cluster_name);
        for skip in &synthesis.skipped {
            warn!(
                "StaticRouteSynthesizer: skipping block {} ({:?}) on node {}: {}",
                skip.source, skip.cidr, skip.node, skip.reason
            );
            metrics::record_skipped_block(skip.reason.as_str());
        }

        let route_count = synthesis.routes.len();
        let skipped_blocks = synthesis.skipped.len();
        state.publish(vrf.name(), synthesis.routes);
        let changed = state.checksum != previous;
        let node_count = state.node_order.len();
        drop(state);

        metrics::record_static_route_recompute(
            vrf.name(),
            start.elapsed().as_secs_f64(),
            route_count,
            if changed { "changed" } else { "unchanged" },
        );
        info!(
            "StaticRouteSynthesizer: {} vrf {} has {} route(s) from {} node(s)",
            vs_key,
            vrf.name(),
            route_count,
            node_count
        );

        RecomputeSummary {
            vs_key: vs_key.clone(),
            vrf_name: vrf.name().to_string(),
            route_count,
            node_count,
            skipped_blocks,
            changed,
        }
    }

    fn vrf_node(&self, vs_key: &VsKey) -> Arc<VrfNode> {
        self.graphs.vrf_or_attach(vs_key, &self.config.vrf_name)
    }

    fn recompute_vrf(&self) -> RecomputeSummary {
        self.recompute(&self.config.vrf_graph_key())
    }

    // =========================================================================
    // Triggers
    // =========================================================================

    pub fn node_updated(&self, info: NodeInfo) -> RecomputeSummary {
        self.nodes.upsert_node(info);
        self.recompute_vrf()
    }

    pub fn node_deleted(&self, name: &str) -> RecomputeSummary {
        self.nodes.remove_node(name);
        self.recompute_vrf()
    }

    pub fn block_applied(&self, node: &str, source: &str, cidr: &str) -> RecomputeSummary {
        self.nodes.upsert_block(node, source, cidr);
        self.recompute_vrf()
    }

    pub fn block_deleted(&self, source: &str) -> RecomputeSummary {
        self.nodes.remove_block(source);
        self.recompute_vrf()
    }

    pub fn source_group_synced(&self, group: &str, node: &str, cidrs: &[String]) -> RecomputeSummary {
        self.nodes.sync_source_group(group, node, cidrs);
        self.recompute_vrf()
    }

    pub fn source_group_deleted(&self, group: &str) -> RecomputeSummary {
        self.nodes.remove_source_group(group);
        self.recompute_vrf()
    }

    // =========================================================================
    // Kubernetes object handlers
    // =========================================================================

    /// Apply a Calico `BlockAffinity` event
    ///
    /// `removed` is set for watch deletions. An affinity marked
    /// `spec.deleted` is treated the same way.
    pub fn handle_block_affinity(
        &self,
        obj: &DynamicObject,
        removed: bool,
    ) -> Result<RecomputeSummary, StateError> {
        if removed {
            let source = apis::cni::object_name(obj, apis::cni::BLOCK_AFFINITY_KIND)?;
            return Ok(self.block_deleted(&source));
        }

        let BlockChange {
            source,
            node,
            cidr,
            deleted,
        } = apis::block_affinity_change(obj)?;
        if deleted {
            return Ok(self.block_deleted(&source));
        }
        Ok(self.block_applied(&node, &source, &cidr))
    }

    /// Apply a Cilium `CiliumNode` event
    ///
    /// The object is a source group named after the node. With the Cilium
    /// plugin its `InternalIP` also becomes the node's next hop.
    pub fn handle_cilium_node(
        &self,
        obj: &DynamicObject,
        removed: bool,
    ) -> Result<RecomputeSummary, StateError> {
        if removed {
            let group = apis::cni::object_name(obj, apis::cni::CILIUM_NODE_KIND)?;
            return Ok(self.source_group_deleted(&group));
        }

        let blocks = apis::cilium_node_blocks(obj)?;
        if self.config.cni_plugin == CniPlugin::Cilium {
            if let Some(ip) = blocks.internal_ip {
                self.nodes
                    .upsert_node(NodeInfo::new(blocks.node.clone(), Some(ip)));
            }
        }
        Ok(self.source_group_synced(&blocks.node, &blocks.node, &blocks.pod_cidrs))
    }

    /// Apply a core `Node` event
    ///
    /// Without a CNI resource to read, the node's own `spec.podCIDRs` are
    /// its blocks.
    pub fn handle_node(&self, node: &Node, removed: bool) -> Result<RecomputeSummary, StateError> {
        let uses_node_spec = self.config.cni_plugin == CniPlugin::Other;

        if removed {
            let name = node.metadata.name.as_deref().unwrap_or_default();
            if name.is_empty() {
                return Err(StateError::invalid("Node", "<unnamed>", "metadata.name is missing"));
            }
            if uses_node_spec {
                self.nodes.remove_source_group(&node_spec_group(name));
            }
            return Ok(self.node_deleted(name));
        }

        let info = apis::node_info(node, self.config.cni_plugin)?;
        if uses_node_spec {
            let name = info.name.clone();
            self.nodes.upsert_node(info);
            return Ok(self.source_group_synced(
                &node_spec_group(&name),
                &name,
                &apis::node_pod_cidrs(node),
            ));
        }
        Ok(self.node_updated(info))
    }
}

fn node_spec_group(node: &str) -> String {
    format!("node/{}", node)
}
