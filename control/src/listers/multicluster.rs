//! Multi-cluster ingress relationships, partitioned by namespace

use crate::store::{safe_write, NamespaceContainer};
use std::fmt;
use std::sync::{Arc, RwLock};

pub struct MultiClusterLister {
    lock: Arc<RwLock<()>>,
    service_import: NamespaceContainer<String>,
    import_service: NamespaceContainer<String>,
    ingress_services: NamespaceContainer<Vec<String>>,
}

impl MultiClusterLister {
    pub fn new() -> Self {
        Self {
            lock: Arc::new(RwLock::new(())),
            service_import: NamespaceContainer::new("mci_service_import"),
            import_service: NamespaceContainer::new("mci_import_service"),
            ingress_services: NamespaceContainer::new("mci_ingress_services"),
        }
    }

    // =========================================================================
    // Service ↔ ServiceImport
    // =========================================================================

    pub fn update_service_import(&self, namespace: &str, service: &str, service_import: &str) {
        let _guard = safe_write(&self.lock);
        let forward = self.service_import.get_or_create(namespace);
        let reverse = self.import_service.get_or_create(namespace);

        if let Some(old) = forward.get(service) {
            reverse.delete(&old);
        }
        if let Some(old) = reverse.get(service_import) {
            forward.delete(&old);
        }
        forward.put(service, service_import.to_string());
        reverse.put(service_import, service.to_string());
    }

    pub fn service_import_for_service(&self, namespace: &str, service: &str) -> Option<String> {
        self.service_import.get(namespace)?.get(service)
    }

    pub fn service_for_service_import(&self, namespace: &str, service_import: &str) -> Option<String> {
        self.import_service.get(namespace)?.get(service_import)
    }

    pub fn delete_service_import(&self, namespace: &str, service_import: &str) -> bool {
        let _guard = safe_write(&self.lock);
        let Some(reverse) = self.import_service.get(namespace) else {
            return false;
        };
        let Some(service) = reverse.get(service_import) else {
            return false;
        };
        reverse.delete(service_import);
        if let Some(forward) = self.service_import.get(namespace) {
            forward.delete(&service);
        }
        true
    }

    // =========================================================================
    // MultiClusterIngress → [Service]
    // =========================================================================

    pub fn update_ingress_services(&self, namespace: &str, ingress: &str, services: Vec<String>) {
        self.ingress_services
            .get_or_create(namespace)
            .put(ingress, services);
    }

    pub fn services_for_ingress(&self, namespace: &str, ingress: &str) -> Vec<String> {
        self.ingress_services
            .get(namespace)
            .and_then(|store| store.get(ingress))
            .unwrap_or_default()
    }

    pub fn delete_ingress(&self, namespace: &str, ingress: &str) -> bool {
        self.ingress_services
            .get(namespace)
            .is_some_and(|store| store.delete(ingress))
    }
}

impl Default for MultiClusterLister {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MultiClusterLister {
    fn clone(&self) -> Self {
        Self {
            lock: Arc::clone(&self.lock),
            service_import: self.service_import.clone(),
            import_service: self.import_service.clone(),
            ingress_services: self.ingress_services.clone(),
        }
    }
}

impl fmt::Debug for MultiClusterLister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiClusterLister")
            .field("namespaces", &self.service_import.namespaces())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_service_import_pairs() {
        let lister = MultiClusterLister::new();
        lister.update_service_import("default", "svc", "svc-import");

        assert_eq!(
            lister.service_import_for_service("default", "svc").as_deref(),
            Some("svc-import")
        );
        assert_eq!(
            lister.service_for_service_import("default", "svc-import").as_deref(),
            Some("svc")
        );
        assert!(lister.service_import_for_service("other", "svc").is_none());

        assert!(lister.delete_service_import("default", "svc-import"));
        assert!(lister.service_import_for_service("default", "svc").is_none());
        assert!(!lister.delete_service_import("default", "svc-import"));
    }

    #[test]
    fn test_service_import_relink() {
        let lister = MultiClusterLister::new();
        lister.update_service_import("default", "svc", "import-a");
        lister.update_service_import("default", "svc", "import-b");

        assert!(lister.service_for_service_import("default", "import-a").is_none());
        assert_eq!(
            lister.service_for_service_import("default", "import-b").as_deref(),
            Some("svc")
        );
    }

    #[test]
    fn test_ingress_services() {
        let lister = MultiClusterLister::new();
        assert!(lister.services_for_ingress("default", "mci").is_empty());

        lister.update_ingress_services("default", "mci", vec!["a".into(), "b".into()]);
        assert_eq!(lister.services_for_ingress("default", "mci"), vec!["a", "b"]);
        assert!(lister.delete_ingress("default", "mci"));
        assert!(!lister.delete_ingress("default", "mci"));
    }
}
