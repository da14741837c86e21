//! Namespace placement: Namespace → tenant, Tier-1 router → [Namespace]

use crate::store::{render_prometheus, RelationshipStore, SetIndex, StoreSample};
use std::fmt;

#[derive(Clone)]
pub struct NamespaceLister {
    tenant: RelationshipStore<String>,
    tier1_namespaces: SetIndex,
}

impl NamespaceLister {
    pub fn new() -> Self {
        Self {
            tenant: RelationshipStore::new("namespace_tenant"),
            tier1_namespaces: SetIndex::new("tier1_namespace"),
        }
    }

    pub fn update_namespace_tenant(&self, namespace: &str, tenant: &str) {
        self.tenant.put(namespace, tenant.to_string());
    }

    /// Tenant of `namespace`, falling back to `default_tenant`
    pub fn tenant_for_namespace(&self, namespace: &str, default_tenant: &str) -> String {
        self.tenant
            .get(namespace)
            .unwrap_or_else(|| default_tenant.to_string())
    }

    pub fn delete_namespace_tenant(&self, namespace: &str) -> bool {
        self.tenant.delete(namespace)
    }

    /// Attach `namespace` to a Tier-1 logical router
    pub fn update_tier1_namespace(&self, tier1: &str, namespace: &str) {
        self.tier1_namespaces.add_member(tier1, namespace);
    }

    pub fn namespaces_for_tier1(&self, tier1: &str) -> Vec<String> {
        self.tier1_namespaces.members(tier1)
    }

    pub fn tier1_for_namespace(&self, namespace: &str) -> Option<String> {
        self.tier1_namespaces.set_of(namespace)
    }

    pub fn remove_tier1_namespace(&self, namespace: &str) -> bool {
        self.tier1_namespaces
            .remove_member_anywhere(namespace)
            .is_some()
    }

    pub fn collect_metrics(&self, out: &mut Vec<StoreSample>) {
        self.tenant.collect_metrics(out);
        self.tier1_namespaces.collect_metrics(out);
    }

    pub fn prometheus_metrics(&self) -> String {
        let mut samples = Vec::new();
        self.collect_metrics(&mut samples);
        render_prometheus(&samples)
    }
}

impl Default for NamespaceLister {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NamespaceLister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceLister")
            .field("tenants", &self.tenant.len())
            .field("tier1_routers", &self.tier1_namespaces.len())
            .finish()
    }
}
