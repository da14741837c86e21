//! GraphStore - one desired-state graph per virtual-service key

use super::{Graph, VrfNode, VsKey};
use crate::store::{RelationshipStore, StoreSample};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Holds the computed graph for every virtual service
///
/// Last `save` wins. There is no partial update API: callers replace the
/// whole graph, except for the VRF routes which the synthesizer rewrites
/// through the graph's own [`VrfNode`](super::VrfNode) lock.
#[derive(Clone)]
pub struct GraphStore {
    graphs: RelationshipStore<Arc<Graph>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            graphs: RelationshipStore::new("graph"),
        }
    }

    /// Store `graph` under its own key, replacing any previous graph
    pub fn save(&self, graph: Graph) -> Arc<Graph> {
        let key = graph.key().to_string();
        let graph = Arc::new(graph);
        self.graphs.put(key.clone(), Arc::clone(&graph));
        debug!("GraphStore: saved graph {}", key);
        graph
    }

    pub fn get(&self, key: &VsKey) -> Option<Arc<Graph>> {
        self.graphs.get(&key.to_string())
    }

    pub fn delete(&self, key: &VsKey) -> bool {
        let removed = self.graphs.delete(&key.to_string());
        if removed {
            debug!("GraphStore: deleted graph {}", key);
        }
        removed
    }

    /// Point-in-time copy of every graph, keyed by `tenant/name`
    pub fn get_all(&self) -> HashMap<String, Arc<Graph>> {
        self.graphs.snapshot()
    }

    pub fn keys(&self) -> Vec<String> {
        self.graphs.keys()
    }

    /// Return the saved graph, or save and return the one built by `f`
    pub fn get_or_insert_with(&self, key: &VsKey, f: impl FnOnce() -> Graph) -> Arc<Graph> {
        self.graphs
            .get_or_insert_with(&key.to_string(), || Arc::new(f()))
    }

    /// VRF node of the graph at `key`, attaching an empty one if needed
    ///
    /// A missing graph is created. When the graph has no VRF node, the
    /// check and the attach happen under one store write, so concurrent
    /// callers all receive the node that ends up saved.
    pub fn vrf_or_attach(&self, key: &VsKey, vrf_name: &str) -> Arc<VrfNode> {
        if let Some(vrf) = self.get(key).and_then(|graph| graph.vrf().cloned()) {
            return vrf;
        }

        let mut vrf = Arc::new(VrfNode::new(vrf_name));
        let mut attached = false;
        self.graphs.update(&key.to_string(), |current| {
            if let Some(existing) = current.and_then(|graph| graph.vrf()) {
                vrf = Arc::clone(existing);
                return current.cloned();
            }
            attached = current.is_some();
            Some(Arc::new(Graph::with_vrf_node(key.clone(), Arc::clone(&vrf))))
        });

        if attached {
            warn!("GraphStore: graph {} had no VRF node, attached {}", key, vrf_name);
        }
        vrf
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn collect_metrics(&self, out: &mut Vec<StoreSample>) {
        self.graphs.collect_metrics(out);
    }

    pub fn prometheus_metrics(&self) -> String {
        self.graphs.prometheus_metrics()
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphStore")
            .field("graphs", &self.graphs.len())
            .finish()
    }
}
