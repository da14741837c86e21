//! Service relationships
//!
//! Per namespace: Service ↔ Ingress and Secret ↔ Ingress (both
//! many-to-many), Secret → hostnames (dropped one hostname at a time as
//! Ingresses stop using them) and Ingress → hosts with their paths. Cluster
//! wide: Service → shared VIP key, where the key is scoped as
//! `namespace/key` since only Services of one namespace can share a VIP.

use crate::store::{
    safe_read, safe_write, NamespaceContainer, RelationshipStore, SetIndex, StoreSample,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Hosts of one Ingress, each with its paths, split by TLS termination
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngressHosts {
    pub secure: BTreeMap<String, Vec<String>>,
    pub insecure: BTreeMap<String, Vec<String>>,
}

impl IngressHosts {
    /// Every hostname, secure first, without repeats
    pub fn hostnames(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.secure.keys().cloned().collect();
        for host in self.insecure.keys() {
            if !hosts.contains(host) {
                hosts.push(host.clone());
            }
        }
        hosts
    }

    pub fn is_empty(&self) -> bool {
        self.secure.is_empty() && self.insecure.is_empty()
    }
}

pub struct ServiceLister {
    lock: Arc<RwLock<()>>,
    service_ingress: NamespaceContainer<Vec<String>>,
    ingress_service: NamespaceContainer<Vec<String>>,
    secret_ingress: NamespaceContainer<Vec<String>>,
    ingress_secret: NamespaceContainer<Vec<String>>,
    secret_hostnames: NamespaceContainer<Vec<String>>,
    ingress_hosts: NamespaceContainer<IngressHosts>,
    shared_vip: SetIndex,
}

impl ServiceLister {
    pub fn new() -> Self {
        Self {
            lock: Arc::new(RwLock::new(())),
            service_ingress: NamespaceContainer::new("service_ingress"),
            ingress_service: NamespaceContainer::new("ingress_service"),
            secret_ingress: NamespaceContainer::new("secret_ingress"),
            ingress_secret: NamespaceContainer::new("ingress_secret"),
            secret_hostnames: NamespaceContainer::new("secret_hostnames"),
            ingress_hosts: NamespaceContainer::new("ingress_hosts"),
            shared_vip: SetIndex::new("shared_vip"),
        }
    }

    /// Ingress relationship view for one namespace
    pub fn ingress_mappings(&self, namespace: &str) -> IngressMappings {
        IngressMappings {
            namespace: namespace.to_string(),
            lock: Arc::clone(&self.lock),
            service_ingress: self.service_ingress.get_or_create(namespace),
            ingress_service: self.ingress_service.get_or_create(namespace),
            secret_ingress: self.secret_ingress.get_or_create(namespace),
            ingress_secret: self.ingress_secret.get_or_create(namespace),
            secret_hostnames: self.secret_hostnames.get_or_create(namespace),
            ingress_hosts: self.ingress_hosts.get_or_create(namespace),
        }
    }

    /// Drop every Ingress relationship recorded in `namespace`
    pub fn delete_namespace(&self, namespace: &str) -> bool {
        let _guard = safe_write(&self.lock);
        let removed = [
            self.service_ingress.delete_namespace(namespace),
            self.ingress_service.delete_namespace(namespace),
            self.secret_ingress.delete_namespace(namespace),
            self.ingress_secret.delete_namespace(namespace),
            self.secret_hostnames.delete_namespace(namespace),
            self.ingress_hosts.delete_namespace(namespace),
        ];
        let any = removed.iter().any(|removed| *removed);
        if any {
            info!("ServiceLister: removed ingress mappings for namespace {}", namespace);
        }
        any
    }

    // =========================================================================
    // Shared VIP
    // =========================================================================

    /// Place `service` in the shared-VIP group `key` of its namespace
    pub fn update_shared_vip(&self, namespace: &str, key: &str, service: &str) {
        let set = shared_vip_set(namespace, key);
        let member = format!("{}/{}", namespace, service);
        if self.shared_vip.add_member(&set, &member) {
            debug!("ServiceLister: service {} shares VIP {}", member, set);
        }
    }

    /// Services (`namespace/name`) sharing the VIP `key`
    pub fn services_for_shared_vip(&self, namespace: &str, key: &str) -> Vec<String> {
        self.shared_vip.members(&shared_vip_set(namespace, key))
    }

    /// The shared-VIP key of a Service, without its namespace scope
    pub fn shared_vip_for_service(&self, namespace: &str, service: &str) -> Option<String> {
        let set = self
            .shared_vip
            .set_of(&format!("{}/{}", namespace, service))?;
        set.split_once('/').map(|(_, key)| key.to_string())
    }

    pub fn remove_service_shared_vip(&self, namespace: &str, service: &str) -> bool {
        self.shared_vip
            .remove_member_anywhere(&format!("{}/{}", namespace, service))
            .is_some()
    }

    pub fn collect_metrics(&self, out: &mut Vec<StoreSample>) {
        self.shared_vip.collect_metrics(out);
    }

    pub fn prometheus_metrics(&self) -> String {
        self.shared_vip.prometheus_metrics()
    }
}

fn shared_vip_set(namespace: &str, key: &str) -> String {
    format!("{}/{}", namespace, key)
}

impl Default for ServiceLister {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ServiceLister {
    fn clone(&self) -> Self {
        Self {
            lock: Arc::clone(&self.lock),
            service_ingress: self.service_ingress.clone(),
            ingress_service: self.ingress_service.clone(),
            secret_ingress: self.secret_ingress.clone(),
            ingress_secret: self.ingress_secret.clone(),
            secret_hostnames: self.secret_hostnames.clone(),
            ingress_hosts: self.ingress_hosts.clone(),
            shared_vip: self.shared_vip.clone(),
        }
    }
}

impl fmt::Debug for ServiceLister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceLister")
            .field("namespaces", &self.ingress_service.namespaces().len())
            .field("shared_vips", &self.shared_vip.len())
            .finish()
    }
}

// =============================================================================
// IngressMappings
// =============================================================================

/// Ingress relationships of one namespace
///
/// Handles share the lister's lock, so a view obtained before a concurrent
/// update still sees both sides of a pair change together.
pub struct IngressMappings {
    namespace: String,
    lock: Arc<RwLock<()>>,
    service_ingress: RelationshipStore<Vec<String>>,
    ingress_service: RelationshipStore<Vec<String>>,
    secret_ingress: RelationshipStore<Vec<String>>,
    ingress_secret: RelationshipStore<Vec<String>>,
    secret_hostnames: RelationshipStore<Vec<String>>,
    ingress_hosts: RelationshipStore<IngressHosts>,
}

impl IngressMappings {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn update_ingress_service(&self, ingress: &str, service: &str) {
        let _guard = safe_write(&self.lock);
        self.service_ingress
            .append_unique(service, ingress.to_string());
        self.ingress_service
            .append_unique(ingress, service.to_string());
    }

    pub fn ingresses_for_service(&self, service: &str) -> Vec<String> {
        let _guard = safe_read(&self.lock);
        self.service_ingress.get(service).unwrap_or_default()
    }

    pub fn services_for_ingress(&self, ingress: &str) -> Vec<String> {
        let _guard = safe_read(&self.lock);
        self.ingress_service.get(ingress).unwrap_or_default()
    }

    /// Detach an Ingress from every Service it referenced
    pub fn remove_ingress_services(&self, ingress: &str) -> bool {
        let _guard = safe_write(&self.lock);
        unlink_all(&self.ingress_service, &self.service_ingress, ingress)
    }

    pub fn update_ingress_secret(&self, ingress: &str, secret: &str) {
        let _guard = safe_write(&self.lock);
        self.secret_ingress.append_unique(secret, ingress.to_string());
        self.ingress_secret.append_unique(ingress, secret.to_string());
        debug!(
            "IngressMappings: ingress {}/{} uses secret {}",
            self.namespace, ingress, secret
        );
    }

    pub fn ingresses_for_secret(&self, secret: &str) -> Vec<String> {
        let _guard = safe_read(&self.lock);
        self.secret_ingress.get(secret).unwrap_or_default()
    }

    pub fn secrets_for_ingress(&self, ingress: &str) -> Vec<String> {
        let _guard = safe_read(&self.lock);
        self.ingress_secret.get(ingress).unwrap_or_default()
    }

    /// Detach an Ingress from every Secret it referenced
    pub fn remove_ingress_secrets(&self, ingress: &str) -> bool {
        let _guard = safe_write(&self.lock);
        unlink_all(&self.ingress_secret, &self.secret_ingress, ingress)
    }

    // =========================================================================
    // Secret → hostname
    // =========================================================================

    /// Record that `hostname` terminates TLS with `secret`
    pub fn update_secret_hostname(&self, secret: &str, hostname: &str) {
        let _guard = safe_write(&self.lock);
        if self
            .secret_hostnames
            .append_unique(secret, hostname.to_string())
        {
            debug!(
                "IngressMappings: secret {}/{} serves {}",
                self.namespace, secret, hostname
            );
        }
    }

    /// Drop one hostname from a secret; returns the hostnames still using it
    ///
    /// The secret's entry goes away with its last hostname, so an empty
    /// result means nothing references the secret any more.
    pub fn decrement_secret_hostname(&self, secret: &str, hostname: &str) -> Vec<String> {
        let _guard = safe_write(&self.lock);
        self.secret_hostnames
            .remove_item(secret, &hostname.to_string());
        let remaining = self.secret_hostnames.get(secret).unwrap_or_default();
        debug!(
            "IngressMappings: secret {}/{} left with {} hostname(s)",
            self.namespace,
            secret,
            remaining.len()
        );
        remaining
    }

    pub fn hostnames_for_secret(&self, secret: &str) -> Vec<String> {
        let _guard = safe_read(&self.lock);
        self.secret_hostnames.get(secret).unwrap_or_default()
    }

    pub fn delete_secret_hostnames(&self, secret: &str) -> bool {
        let _guard = safe_write(&self.lock);
        self.secret_hostnames.delete(secret)
    }

    // =========================================================================
    // Ingress → hosts
    // =========================================================================

    /// Replace the hosts of an Ingress; an empty set removes the entry
    pub fn update_ingress_hosts(&self, ingress: &str, hosts: IngressHosts) {
        if hosts.is_empty() {
            self.ingress_hosts.delete(ingress);
        } else {
            self.ingress_hosts.put(ingress, hosts);
        }
    }

    /// Hosts of an Ingress (empty if unknown)
    pub fn hosts_for_ingress(&self, ingress: &str) -> IngressHosts {
        self.ingress_hosts.get(ingress).unwrap_or_default()
    }

    pub fn delete_ingress_hosts(&self, ingress: &str) -> bool {
        self.ingress_hosts.delete(ingress)
    }
}

/// Remove `key` from `forward` and from each reverse list it appeared in
fn unlink_all(
    forward: &RelationshipStore<Vec<String>>,
    reverse: &RelationshipStore<Vec<String>>,
    key: &str,
) -> bool {
    let Some(targets) = forward.get(key) else {
        return false;
    };
    let owned = key.to_string();
    for target in &targets {
        reverse.remove_item(target, &owned);
    }
    forward.delete(key)
}
