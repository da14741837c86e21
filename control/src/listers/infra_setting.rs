//! InfraSetting relationships
//!
//! An InfraSetting carries the shard size and tenant that every Ingress,
//! Route, Gateway or Service referencing it is placed under.

use crate::store::{render_prometheus, safe_write, RelationshipStore, SetIndex, StoreSample};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

pub struct InfraSettingLister {
    lock: Arc<RwLock<()>>,
    /// InfraSetting → [Ingress/Route `namespace/name`]
    ingress_routes: SetIndex,
    shard_size: RelationshipStore<String>,
    tenant: RelationshipStore<String>,
    /// Gateway or Service `namespace/name` → InfraSetting
    gateway_service: RelationshipStore<String>,
    scoped_namespaces: RelationshipStore<Vec<String>>,
}

impl InfraSettingLister {
    pub fn new() -> Self {
        Self {
            lock: Arc::new(RwLock::new(())),
            ingress_routes: SetIndex::new("infra_setting_ingress_routes"),
            shard_size: RelationshipStore::new("infra_setting_shard_size"),
            tenant: RelationshipStore::new("infra_setting_tenant"),
            gateway_service: RelationshipStore::new("infra_setting_gateway_service"),
            scoped_namespaces: RelationshipStore::new("infra_setting_namespaces"),
        }
    }

    // =========================================================================
    // Ingress / Route
    // =========================================================================

    /// Map an Ingress or Route to an InfraSetting and record its shard size
    pub fn update_ingress_route(&self, ingress_route: &str, infra_setting: &str, shard_size: &str) {
        let _guard = safe_write(&self.lock);
        if let Some(previous) = self.ingress_routes.set_of(ingress_route) {
            if previous != infra_setting {
                self.ingress_routes.remove_member(&previous, ingress_route);
                self.release_shard_size(&previous);
            }
        }
        self.ingress_routes.add_member(infra_setting, ingress_route);
        self.shard_size.put(infra_setting, shard_size.to_string());
    }

    pub fn infra_setting_for_ingress_route(&self, ingress_route: &str) -> Option<String> {
        self.ingress_routes.set_of(ingress_route)
    }

    /// Unmap an Ingress or Route
    ///
    /// The InfraSetting's shard size is forgotten once nothing maps to it.
    pub fn remove_ingress_route(&self, ingress_route: &str) -> bool {
        let _guard = safe_write(&self.lock);
        let Some(infra_setting) = self.ingress_routes.remove_member_anywhere(ingress_route) else {
            return false;
        };
        self.release_shard_size(&infra_setting);
        true
    }

    fn release_shard_size(&self, infra_setting: &str) {
        if !self.ingress_routes.contains_set(infra_setting) && self.shard_size.delete(infra_setting) {
            debug!(
                "InfraSettingLister: {} no longer referenced, dropped shard size",
                infra_setting
            );
        }
    }

    pub fn shard_size(&self, infra_setting: &str) -> Option<String> {
        self.shard_size.get(infra_setting)
    }

    // =========================================================================
    // Tenant
    // =========================================================================

    pub fn update_tenant(&self, infra_setting: &str, tenant: &str) {
        self.tenant.put(infra_setting, tenant.to_string());
    }

    pub fn tenant(&self, infra_setting: &str) -> Option<String> {
        self.tenant.get(infra_setting)
    }

    /// Distinct tenants across all InfraSettings, sorted
    pub fn all_tenants(&self) -> BTreeSet<String> {
        self.tenant.with_read(|map| map.values().cloned().collect())
    }

    // =========================================================================
    // Gateway / Service
    // =========================================================================

    pub fn update_gateway_service(&self, resource: &str, infra_setting: &str) {
        self.gateway_service.put(resource, infra_setting.to_string());
    }

    pub fn infra_setting_for_gateway_service(&self, resource: &str) -> Option<String> {
        self.gateway_service.get(resource)
    }

    pub fn remove_gateway_service(&self, resource: &str) -> bool {
        self.gateway_service.delete(resource)
    }

    // =========================================================================
    // Namespace scope
    // =========================================================================

    pub fn update_scoped_namespaces(&self, infra_setting: &str, namespaces: Vec<String>) {
        self.scoped_namespaces.put(infra_setting, namespaces);
    }

    pub fn scoped_namespaces(&self, infra_setting: &str) -> Vec<String> {
        self.scoped_namespaces
            .get(infra_setting)
            .unwrap_or_default()
    }

    pub fn delete_scoped_namespaces(&self, infra_setting: &str) -> bool {
        self.scoped_namespaces.delete(infra_setting)
    }

    pub fn collect_metrics(&self, out: &mut Vec<StoreSample>) {
        self.ingress_routes.collect_metrics(out);
        self.shard_size.collect_metrics(out);
        self.tenant.collect_metrics(out);
        self.gateway_service.collect_metrics(out);
        self.scoped_namespaces.collect_metrics(out);
    }

    pub fn prometheus_metrics(&self) -> String {
        let mut samples = Vec::new();
        self.collect_metrics(&mut samples);
        render_prometheus(&samples)
    }
}

impl Default for InfraSettingLister {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InfraSettingLister {
    fn clone(&self) -> Self {
        Self {
            lock: Arc::clone(&self.lock),
            ingress_routes: self.ingress_routes.clone(),
            shard_size: self.shard_size.clone(),
            tenant: self.tenant.clone(),
            gateway_service: self.gateway_service.clone(),
            scoped_namespaces: self.scoped_namespaces.clone(),
        }
    }
}

impl fmt::Debug for InfraSettingLister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfraSettingLister")
            .field("infra_settings", &self.ingress_routes.len())
            .field("tenants", &self.tenant.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_size_kept_while_referenced() {
        let lister = InfraSettingLister::new();
        lister.update_ingress_route("default/ing1", "infra1", "SMALL");
        lister.update_ingress_route("default/ing2", "infra1", "SMALL");

        assert!(lister.remove_ingress_route("default/ing1"));
        assert_eq!(lister.shard_size("infra1").as_deref(), Some("SMALL"));

        assert!(lister.remove_ingress_route("default/ing2"));
        assert!(lister.shard_size("infra1").is_none());
        assert!(!lister.remove_ingress_route("default/ing2"));
    }

    #[test]
    fn test_ingress_moves_between_infra_settings() {
        let lister = InfraSettingLister::new();
        lister.update_ingress_route("default/ing1", "infra1", "SMALL");
        lister.update_ingress_route("default/ing1", "infra2", "LARGE");

        assert_eq!(
            lister.infra_setting_for_ingress_route("default/ing1").as_deref(),
            Some("infra2")
        );
        assert!(lister.shard_size("infra1").is_none());
        assert_eq!(lister.shard_size("infra2").as_deref(), Some("LARGE"));
    }

    #[test]
    fn test_all_tenants_deduplicated() {
        let lister = InfraSettingLister::new();
        lister.update_tenant("infra1", "t1");
        lister.update_tenant("infra2", "t2");
        lister.update_tenant("infra3", "t1");

        let tenants: Vec<_> = lister.all_tenants().into_iter().collect();
        assert_eq!(tenants, vec!["t1", "t2"]);
        assert_eq!(lister.tenant("infra3").as_deref(), Some("t1"));
    }

    #[test]
    fn test_gateway_service_mapping() {
        let lister = InfraSettingLister::new();
        lister.update_gateway_service("default/gw", "infra1");
        assert_eq!(
            lister.infra_setting_for_gateway_service("default/gw").as_deref(),
            Some("infra1")
        );
        assert!(lister.remove_gateway_service("default/gw"));
        assert!(lister.infra_setting_for_gateway_service("default/gw").is_none());
    }

    #[test]
    fn test_scoped_namespaces() {
        let lister = InfraSettingLister::new();
        assert!(lister.scoped_namespaces("infra1").is_empty());
        lister.update_scoped_namespaces("infra1", vec!["red".into(), "blue".into()]);
        assert_eq!(lister.scoped_namespaces("infra1"), vec!["red", "blue"]);
        assert!(lister.delete_scoped_namespaces("infra1"));
    }
}
