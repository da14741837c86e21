//! lbgraph control-plane state layer
//!
//! In-memory state behind a Kubernetes load-balancer controller:
//!
//! - [`store`]: relationship-store framework (caches, 1:1 and 1:N indexes)
//! - [`listers`]: domain caches built on it (CRD rules, Gateway API,
//!   infra settings, services, nodes and their pod-CIDR blocks)
//! - [`graph`]: desired-state graphs and the VRF node's static routes
//! - [`synthesizer`]: rebuilds VRF static routes from nodes and blocks
//! - [`apis`]: decoding of Calico/Cilium resources and core `Node`s
//! - [`registry`]: one explicitly constructed instance of all of the above

pub mod apis;
pub mod config;
pub mod error;
pub mod graph;
pub mod listers;
pub mod metrics;
pub mod registry;
pub mod routes;
pub mod store;
pub mod synthesizer;

pub use config::{CniPlugin, StateConfig};
pub use error::StateError;
pub use graph::{Graph, GraphStore, NodeRouteDetails, VrfNode, VsKey};
pub use registry::StateRegistry;
pub use routes::{IpPrefix, StaticRoute};
pub use synthesizer::{RecomputeSummary, StaticRouteSynthesizer};
