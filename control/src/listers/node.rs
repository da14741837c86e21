//! Node inventory and per-node pod-CIDR blocks
//!
//! Blocks come from CNI objects. A Calico BlockAffinity is one source with
//! one block; a CiliumNode is a source group carrying several blocks. Either
//! way each block is tracked by a source id so that updates and deletes can
//! find it again:
//!
//! ```text
//! node   → [CidrBlock { source, cidr }]   (first-observed order)
//! source → node
//! group  → [source]
//! ```

use crate::store::{render_prometheus, safe_read, safe_write, RelationshipStore, StoreSample};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A cluster node as seen by the route synthesizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    /// Next hop for the node's pod CIDRs; `None` until the node reports one
    pub primary_ipv4: Option<Ipv4Addr>,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>, primary_ipv4: Option<Ipv4Addr>) -> Self {
        Self {
            name: name.into(),
            primary_ipv4,
        }
    }
}

/// One raw pod-CIDR block, unvalidated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrBlock {
    pub source: String,
    pub cidr: String,
}

/// Point-in-time copy of everything the synthesizer reads
#[derive(Debug, Clone, Default)]
pub struct NodeSnapshot {
    pub nodes: HashMap<String, NodeInfo>,
    pub blocks: HashMap<String, Vec<CidrBlock>>,
}

impl NodeSnapshot {
    pub fn blocks_for(&self, node: &str) -> &[CidrBlock] {
        self.blocks.get(node).map_or(&[], Vec::as_slice)
    }
}

pub struct NodeLister {
    lock: Arc<RwLock<()>>,
    nodes: RelationshipStore<NodeInfo>,
    blocks: RelationshipStore<Vec<CidrBlock>>,
    block_owner: RelationshipStore<String>,
    source_groups: RelationshipStore<Vec<String>>,
}

impl NodeLister {
    pub fn new() -> Self {
        Self {
            lock: Arc::new(RwLock::new(())),
            nodes: RelationshipStore::new("node_inventory"),
            blocks: RelationshipStore::new("node_blocks"),
            block_owner: RelationshipStore::new("block_owner"),
            source_groups: RelationshipStore::new("block_source_group"),
        }
    }

    // =========================================================================
    // Inventory
    // =========================================================================

    pub fn upsert_node(&self, info: NodeInfo) {
        let _guard = safe_write(&self.lock);
        debug!("NodeLister: node {} ip {:?}", info.name, info.primary_ipv4);
        self.nodes.put(info.name.clone(), info);
    }

    /// Remove a node from the inventory
    ///
    /// Its blocks stay: they belong to CNI objects with their own lifecycle
    /// and apply again if the node comes back.
    pub fn remove_node(&self, name: &str) -> bool {
        let _guard = safe_write(&self.lock);
        self.nodes.delete(name)
    }

    pub fn node(&self, name: &str) -> Option<NodeInfo> {
        self.nodes.get(name)
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes.keys()
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Record that `source` assigns `cidr` to `node`
    ///
    /// An existing source keeps its position when its CIDR changes. A
    /// source that moves to another node is appended there. Returns the
    /// nodes whose block list changed.
    pub fn upsert_block(&self, node: &str, source: &str, cidr: &str) -> Vec<String> {
        let _guard = safe_write(&self.lock);
        self.upsert_block_locked(node, source, cidr)
    }

    fn upsert_block_locked(&self, node: &str, source: &str, cidr: &str) -> Vec<String> {
        let mut affected = Vec::new();

        if let Some(previous) = self.block_owner.get(source) {
            if previous != node {
                self.detach_block(&previous, source);
                affected.push(previous);
            }
        }

        let mut changed = false;
        self.blocks.update(node, |current| {
            let mut blocks = current.cloned().unwrap_or_default();
            match blocks.iter_mut().find(|block| block.source == source) {
                Some(block) if block.cidr == cidr => {}
                Some(block) => {
                    block.cidr = cidr.to_string();
                    changed = true;
                }
                None => {
                    blocks.push(CidrBlock {
                        source: source.to_string(),
                        cidr: cidr.to_string(),
                    });
                    changed = true;
                }
            }
            Some(blocks)
        });
        self.block_owner.put(source, node.to_string());

        if changed {
            debug!("NodeLister: block {} ({}) on node {}", source, cidr, node);
            affected.push(node.to_string());
        }
        affected
    }

    /// Forget a block source; returns the node it was on
    pub fn remove_block(&self, source: &str) -> Option<String> {
        let _guard = safe_write(&self.lock);
        self.remove_block_locked(source)
    }

    fn remove_block_locked(&self, source: &str) -> Option<String> {
        let node = self.block_owner.get(source)?;
        self.block_owner.delete(source);
        self.detach_block(&node, source);
        debug!("NodeLister: removed block {} from node {}", source, node);
        Some(node)
    }

    fn detach_block(&self, node: &str, source: &str) {
        self.blocks.update(node, |current| {
            let mut blocks = current.cloned()?;
            blocks.retain(|block| block.source != source);
            (!blocks.is_empty()).then_some(blocks)
        });
    }

    pub fn blocks_for_node(&self, node: &str) -> Vec<CidrBlock> {
        self.blocks.get(node).unwrap_or_default()
    }

    pub fn node_for_block(&self, source: &str) -> Option<String> {
        self.block_owner.get(source)
    }

    // =========================================================================
    // Source groups
    // =========================================================================

    /// Make `group` assign exactly `cidrs` to `node`
    ///
    /// Blocks of the group that are no longer listed are removed; listed
    /// ones keep their source id (`group/cidr`) and position. Returns the
    /// nodes whose block list changed, sorted.
    pub fn sync_source_group(&self, group: &str, node: &str, cidrs: &[String]) -> Vec<String> {
        let _guard = safe_write(&self.lock);
        let mut affected = BTreeSet::new();

        let mut wanted: Vec<(String, &str)> = Vec::with_capacity(cidrs.len());
        for cidr in cidrs {
            let source = group_source(group, cidr);
            if !wanted.iter().any(|(existing, _)| *existing == source) {
                wanted.push((source, cidr));
            }
        }
        let previous = self.source_groups.get(group).unwrap_or_default();

        for source in previous
            .iter()
            .filter(|source| !wanted.iter().any(|(wanted, _)| wanted == *source))
        {
            affected.extend(self.remove_block_locked(source));
        }
        for (source, cidr) in &wanted {
            let on_node = self.block_owner.get(source).as_deref() == Some(node);
            if !on_node {
                affected.extend(self.upsert_block_locked(node, source, cidr));
            }
        }

        let sources: Vec<String> = wanted.into_iter().map(|(source, _)| source).collect();
        if sources.is_empty() {
            self.source_groups.delete(group);
        } else {
            self.source_groups.put(group, sources);
        }
        affected.into_iter().collect()
    }

    /// Remove every block a group contributed; returns the affected nodes
    pub fn remove_source_group(&self, group: &str) -> Vec<String> {
        let _guard = safe_write(&self.lock);
        let sources = self.source_groups.get(group).unwrap_or_default();
        self.source_groups.delete(group);

        let affected: BTreeSet<String> = sources
            .iter()
            .filter_map(|source| self.remove_block_locked(source))
            .collect();
        affected.into_iter().collect()
    }

    /// Consistent copy of inventory and blocks
    pub fn snapshot(&self) -> NodeSnapshot {
        let _guard = safe_read(&self.lock);
        NodeSnapshot {
            nodes: self.nodes.snapshot(),
            blocks: self.blocks.snapshot(),
        }
    }

    pub fn collect_metrics(&self, out: &mut Vec<StoreSample>) {
        self.nodes.collect_metrics(out);
        self.blocks.collect_metrics(out);
        self.block_owner.collect_metrics(out);
        self.source_groups.collect_metrics(out);
    }

    pub fn prometheus_metrics(&self) -> String {
        let mut samples = Vec::new();
        self.collect_metrics(&mut samples);
        render_prometheus(&samples)
    }
}

fn group_source(group: &str, cidr: &str) -> String {
    format!("{}/{}", group, cidr)
}

impl Default for NodeLister {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for NodeLister {
    fn clone(&self) -> Self {
        Self {
            lock: Arc::clone(&self.lock),
            nodes: self.nodes.clone(),
            blocks: self.blocks.clone(),
            block_owner: self.block_owner.clone(),
            source_groups: self.source_groups.clone(),
        }
    }
}

impl fmt::Debug for NodeLister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeLister")
            .field("nodes", &self.nodes.len())
            .field("block_sources", &self.block_owner.len())
            .finish()
    }
}
