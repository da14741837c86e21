//! Kubernetes object adapters
//!
//! Turn CNI custom resources and core `Node`s into the plain values the
//! node lister and synthesizer consume.

pub mod cni;
pub mod node;

pub use cni::{block_affinity_change, cilium_node_blocks, BlockChange, CiliumNodeBlocks};
pub use node::{node_info, node_pod_cidrs, CALICO_IPV4_ANNOTATION};
