//! Desired-state graphs
//!
//! A [`Graph`] is the computed model for one virtual service, keyed by
//! `tenant/name`. Only the VRF slice is modelled in depth: the
//! [`VrfNode`] owns the per-node route bookkeeping and the published list of
//! [`StaticRoute`]s.

mod store;

pub use store::GraphStore;

use crate::routes::StaticRoute;
use crate::store::{safe_read, safe_write};
use lbgraph_common::{fnv1a_extend, FNV_OFFSET};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

// =============================================================================
// VsKey
// =============================================================================

/// Virtual-service key: (tenant, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VsKey {
    pub tenant: String,
    pub name: String,
}

impl VsKey {
    #[inline]
    pub fn new(tenant: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            name: name.into(),
        }
    }

    /// Parse `tenant/name`; both parts must be non-empty
    pub fn parse(key: &str) -> Option<Self> {
        let (tenant, name) = key.split_once('/')?;
        if tenant.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(tenant, name))
    }
}

impl fmt::Display for VsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.name)
    }
}

// =============================================================================
// VrfNode
// =============================================================================

/// Per-node bookkeeping on a VRF node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRouteDetails {
    /// Stable identifier reserved the first time the node produced a route
    pub route_id_prefix: String,
    /// Routes the node contributed in the last recompute
    pub route_count: usize,
}

/// State guarded by the VRF node's lock
#[derive(Debug, Default)]
pub(crate) struct VrfState {
    /// Nodes in first-seen order
    pub(crate) node_order: Vec<String>,
    pub(crate) node_static_routes: HashMap<String, NodeRouteDetails>,
    pub(crate) static_routes: Arc<Vec<StaticRoute>>,
    pub(crate) checksum: u64,
}

impl VrfState {
    /// Swap in a freshly built route list
    pub(crate) fn publish(&mut self, vrf_name: &str, routes: Vec<StaticRoute>) {
        self.checksum = vrf_checksum(vrf_name, &routes);
        self.static_routes = Arc::new(routes);
    }
}

/// Virtual routing context node
///
/// Readers get `Arc` snapshots of the route list; the list itself is only
/// ever replaced wholesale, never edited in place.
#[derive(Debug)]
pub struct VrfNode {
    name: String,
    state: RwLock<VrfState>,
}

impl VrfNode {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let state = VrfState {
            checksum: vrf_checksum(&name, &[]),
            ..VrfState::default()
        };
        Self {
            name,
            state: RwLock::new(state),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Currently published static routes
    pub fn static_routes(&self) -> Arc<Vec<StaticRoute>> {
        Arc::clone(&safe_read(&self.state).static_routes)
    }

    pub fn node_static_routes(&self) -> HashMap<String, NodeRouteDetails> {
        safe_read(&self.state).node_static_routes.clone()
    }

    pub fn route_id_prefix(&self, node_name: &str) -> Option<String> {
        safe_read(&self.state)
            .node_static_routes
            .get(node_name)
            .map(|details| details.route_id_prefix.clone())
    }

    /// Nodes holding a slot, in first-seen order
    pub fn node_order(&self) -> Vec<String> {
        safe_read(&self.state).node_order.clone()
    }

    pub fn checksum(&self) -> u64 {
        safe_read(&self.state).checksum
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, VrfState> {
        safe_write(&self.state)
    }
}

/// FNV-1a checksum over the VRF name and every route field, in order
pub fn vrf_checksum(vrf_name: &str, routes: &[StaticRoute]) -> u64 {
    let mut hash = fnv1a_extend(FNV_OFFSET, vrf_name.as_bytes());
    for route in routes {
        hash = fnv1a_extend(hash, b"|");
        hash = fnv1a_extend(hash, route.route_id.as_bytes());
        hash = fnv1a_extend(hash, b",");
        hash = fnv1a_extend(hash, route.prefix.network_address.as_bytes());
        hash = fnv1a_extend(hash, &[route.prefix.mask_len]);
        hash = fnv1a_extend(hash, route.next_hop_address.as_bytes());
    }
    hash
}

// =============================================================================
// Graph
// =============================================================================

/// Desired state for one virtual service
#[derive(Debug)]
pub struct Graph {
    key: VsKey,
    vrf: Option<Arc<VrfNode>>,
}

impl Graph {
    pub fn new(key: VsKey) -> Self {
        Self { key, vrf: None }
    }

    /// Graph carrying an empty VRF node
    pub fn with_vrf(key: VsKey, vrf_name: impl Into<String>) -> Self {
        Self::with_vrf_node(key, Arc::new(VrfNode::new(vrf_name)))
    }

    pub fn with_vrf_node(key: VsKey, vrf: Arc<VrfNode>) -> Self {
        Self {
            key,
            vrf: Some(vrf),
        }
    }

    #[inline]
    pub fn key(&self) -> &VsKey {
        &self.key
    }

    #[inline]
    pub fn tenant(&self) -> &str {
        &self.key.tenant
    }

    pub fn vrf(&self) -> Option<&Arc<VrfNode>> {
        self.vrf.as_ref()
    }

    pub fn is_vrf(&self) -> bool {
        self.vrf.is_some()
    }

    /// Checksum of the graph's published state
    pub fn checksum(&self) -> u64 {
        self.vrf.as_ref().map_or(FNV_OFFSET, |vrf| vrf.checksum())
    }
}
