//! Paired stores kept as mutual inverses
//!
//! [`BidirectionalIndex`] is the 1:1 variant (HostRule ↔ FQDN,
//! Namespace ↔ router). [`SetIndex`] is the 1:N variant (GatewayClass →
//! Gateways) whose reverse side maps each member back to its single set.
//!
//! Both take a coarse lock around every operation that touches the two
//! underlying stores, so a concurrent reader never sees a pair with only one
//! side written or only one side deleted.

use super::metrics::{render_prometheus, StoreSample};
use super::relationship::RelationshipStore;
use super::{safe_read, safe_write};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

// =============================================================================
// BidirectionalIndex (1:1)
// =============================================================================

/// 1:1 mapping `a ↔ b`
///
/// Invariant: `forward[a] == b` if and only if `reverse[b] == a`.
pub struct BidirectionalIndex {
    lock: Arc<RwLock<()>>,
    forward: RelationshipStore<String>,
    reverse: RelationshipStore<String>,
}

impl BidirectionalIndex {
    pub fn new(name: &str) -> Self {
        Self {
            lock: Arc::new(RwLock::new(())),
            forward: RelationshipStore::new(format!("{}_forward", name)),
            reverse: RelationshipStore::new(format!("{}_reverse", name)),
        }
    }

    /// Link `a` to `b`, replacing any previous partner of either side
    pub fn link(&self, a: &str, b: &str) {
        let _guard = safe_write(&self.lock);

        if let Some(old_b) = self.forward.get(a) {
            if old_b != b {
                self.reverse.delete(&old_b);
            }
        }
        if let Some(old_a) = self.reverse.get(b) {
            if old_a != a {
                self.forward.delete(&old_a);
            }
        }

        self.forward.put(a, b.to_string());
        self.reverse.put(b, a.to_string());
        debug!("{}: linked {} <-> {}", self.forward.name(), a, b);
    }

    /// Remove the pair owned by `a`
    ///
    /// Returns `true` if `a` was linked.
    pub fn unlink_by_a(&self, a: &str) -> bool {
        let _guard = safe_write(&self.lock);
        match self.forward.get(a) {
            Some(b) => {
                self.forward.delete(a);
                self.reverse.delete(&b);
                debug!("{}: unlinked {} <-> {}", self.forward.name(), a, b);
                true
            }
            None => false,
        }
    }

    /// Remove the pair owned by `b`
    pub fn unlink_by_b(&self, b: &str) -> bool {
        let _guard = safe_write(&self.lock);
        match self.reverse.get(b) {
            Some(a) => {
                self.reverse.delete(b);
                self.forward.delete(&a);
                debug!("{}: unlinked {} <-> {}", self.forward.name(), a, b);
                true
            }
            None => false,
        }
    }

    pub fn lookup_a(&self, a: &str) -> Option<String> {
        let _guard = safe_read(&self.lock);
        self.forward.get(a)
    }

    pub fn lookup_b(&self, b: &str) -> Option<String> {
        let _guard = safe_read(&self.lock);
        self.reverse.get(b)
    }

    /// Snapshot of `b → a`
    pub fn reverse_snapshot(&self) -> HashMap<String, String> {
        let _guard = safe_read(&self.lock);
        self.reverse.snapshot()
    }

    /// Snapshot of `a → b`
    pub fn forward_snapshot(&self) -> HashMap<String, String> {
        let _guard = safe_read(&self.lock);
        self.forward.snapshot()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn collect_metrics(&self, out: &mut Vec<StoreSample>) {
        self.forward.collect_metrics(out);
        self.reverse.collect_metrics(out);
    }

    pub fn prometheus_metrics(&self) -> String {
        let mut samples = Vec::new();
        self.collect_metrics(&mut samples);
        render_prometheus(&samples)
    }
}

impl Clone for BidirectionalIndex {
    fn clone(&self) -> Self {
        Self {
            lock: Arc::clone(&self.lock),
            forward: self.forward.clone(),
            reverse: self.reverse.clone(),
        }
    }
}

impl fmt::Debug for BidirectionalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BidirectionalIndex")
            .field("forward", &self.forward)
            .field("reverse", &self.reverse)
            .finish()
    }
}

// =============================================================================
// SetIndex (1:N)
// =============================================================================

/// 1:N mapping `set → [member]` with `member → set` reverse lookup
///
/// Members are unique within a set and belong to at most one set. A set that
/// loses its last member is deleted rather than kept as an empty list.
pub struct SetIndex {
    lock: Arc<RwLock<()>>,
    sets: RelationshipStore<Vec<String>>,
    owners: RelationshipStore<String>,
}

impl SetIndex {
    pub fn new(name: &str) -> Self {
        Self {
            lock: Arc::new(RwLock::new(())),
            sets: RelationshipStore::new(format!("{}_sets", name)),
            owners: RelationshipStore::new(format!("{}_owners", name)),
        }
    }

    /// Add `member` to `set`
    ///
    /// A member that belonged to a different set is moved. Returns `false`
    /// if the member was already in `set`.
    pub fn add_member(&self, set: &str, member: &str) -> bool {
        let _guard = safe_write(&self.lock);

        if let Some(old_set) = self.owners.get(member) {
            if old_set == set {
                return false;
            }
            self.sets.remove_item(&old_set, &member.to_string());
            debug!(
                "{}: moved {} from {} to {}",
                self.sets.name(),
                member,
                old_set,
                set
            );
        }

        self.sets.append_unique(set, member.to_string());
        self.owners.put(member, set.to_string());
        true
    }

    /// Remove `member` from `set`
    ///
    /// Returns `true` if the member was in that set.
    pub fn remove_member(&self, set: &str, member: &str) -> bool {
        let _guard = safe_write(&self.lock);
        let removed = self.sets.remove_item(set, &member.to_string());
        if removed {
            self.owners.delete(member);
        }
        removed
    }

    /// Remove `member` from whichever set holds it
    ///
    /// Returns the set it was removed from.
    pub fn remove_member_anywhere(&self, member: &str) -> Option<String> {
        let _guard = safe_write(&self.lock);
        let set = self.owners.get(member)?;
        self.owners.delete(member);
        self.sets.remove_item(&set, &member.to_string());
        Some(set)
    }

    /// Delete a set and release all of its members
    ///
    /// Returns the members that were released.
    pub fn remove_set(&self, set: &str) -> Vec<String> {
        let _guard = safe_write(&self.lock);
        let members = self.sets.get(set).unwrap_or_default();
        self.sets.delete(set);
        self.owners.batch_delete(&members);
        if !members.is_empty() {
            debug!(
                "{}: removed set {} ({} member(s))",
                self.sets.name(),
                set,
                members.len()
            );
        }
        members
    }

    /// Members of `set` in insertion order (empty if unknown)
    pub fn members(&self, set: &str) -> Vec<String> {
        let _guard = safe_read(&self.lock);
        self.sets.get(set).unwrap_or_default()
    }

    pub fn set_of(&self, member: &str) -> Option<String> {
        let _guard = safe_read(&self.lock);
        self.owners.get(member)
    }

    pub fn contains_set(&self, set: &str) -> bool {
        self.sets.contains(set)
    }

    pub fn sets(&self) -> Vec<String> {
        self.sets.keys()
    }

    /// Number of non-empty sets
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn collect_metrics(&self, out: &mut Vec<StoreSample>) {
        self.sets.collect_metrics(out);
        self.owners.collect_metrics(out);
    }

    pub fn prometheus_metrics(&self) -> String {
        let mut samples = Vec::new();
        self.collect_metrics(&mut samples);
        render_prometheus(&samples)
    }
}

impl Clone for SetIndex {
    fn clone(&self) -> Self {
        Self {
            lock: Arc::clone(&self.lock),
            sets: self.sets.clone(),
            owners: self.owners.clone(),
        }
    }
}

impl fmt::Debug for SetIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetIndex")
            .field("sets", &self.sets)
            .field("owners", &self.owners)
            .finish()
    }
}
