//! Hostname ownership by namespace
//!
//! A hostname requested by routes of several namespaces is served for one
//! namespace at a time. Routes of that namespace are *active*. Routes of
//! other namespaces wait as *inactive* until the last active route releases
//! the hostname; the namespace of the oldest waiting route then takes over.
//!
//! Routes are named `kind/namespace/name` or `namespace/name`.

use crate::store::{render_prometheus, RelationshipStore, StoreSample};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Routes competing for one hostname, with their creation timestamps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostnameRoutes {
    active: BTreeMap<String, i64>,
    inactive: BTreeMap<String, i64>,
}

impl HostnameRoutes {
    pub fn active(&self) -> Vec<String> {
        self.active.keys().cloned().collect()
    }

    pub fn inactive(&self) -> Vec<String> {
        self.inactive.keys().cloned().collect()
    }

    /// Namespace currently holding the hostname
    pub fn owner_namespace(&self) -> Option<&str> {
        self.active.keys().next().map(|route| route_namespace(route))
    }

    fn is_empty(&self) -> bool {
        self.active.is_empty() && self.inactive.is_empty()
    }

    fn admit(&mut self, route: &str, created: i64) -> HostnameClaim {
        if self.active.contains_key(route) {
            return HostnameClaim::admitted();
        }
        if self.inactive.contains_key(route) {
            return HostnameClaim::default();
        }

        let namespace = route_namespace(route);
        match self.owner_namespace() {
            Some(owner) if owner == namespace => {
                self.active.insert(route.to_string(), created);
                HostnameClaim::admitted()
            }
            Some(_) => {
                self.inactive.insert(route.to_string(), created);
                HostnameClaim::default()
            }
            None => {
                self.active.insert(route.to_string(), created);
                let activated = self.promote(namespace);
                HostnameClaim {
                    admitted: true,
                    activated,
                }
            }
        }
    }

    fn release(&mut self, route: &str) -> Vec<String> {
        if self.active.remove(route).is_none() {
            self.inactive.remove(route);
            return Vec::new();
        }
        if !self.active.is_empty() {
            return Vec::new();
        }

        // Oldest waiting route picks the next namespace; ties go by name
        let Some(namespace) = self
            .inactive
            .iter()
            .min_by_key(|(_, created)| **created)
            .map(|(oldest, _)| route_namespace(oldest).to_string())
        else {
            return Vec::new();
        };
        self.promote(&namespace)
    }

    /// Move every inactive route of `namespace` to the active set
    fn promote(&mut self, namespace: &str) -> Vec<String> {
        let promoted: Vec<String> = self
            .inactive
            .keys()
            .filter(|route| route_namespace(route) == namespace)
            .cloned()
            .collect();
        for route in &promoted {
            if let Some(created) = self.inactive.remove(route) {
                self.active.insert(route.clone(), created);
            }
        }
        promoted
    }
}

/// Outcome of a route asking for a hostname
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostnameClaim {
    /// The claiming route may be built
    pub admitted: bool,
    /// Other routes that became active with it and need building too
    pub activated: Vec<String>,
}

impl HostnameClaim {
    fn admitted() -> Self {
        Self {
            admitted: true,
            activated: Vec::new(),
        }
    }
}

/// Namespace part of `kind/namespace/name` or `namespace/name`
pub fn route_namespace(route: &str) -> &str {
    let mut parts = route.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(namespace), Some(_)) => namespace,
        (Some(namespace), Some(_), None) => namespace,
        _ => "",
    }
}

// =============================================================================
// UniqueHostNamespaceLister
// =============================================================================

#[derive(Clone)]
pub struct UniqueHostNamespaceLister {
    hostname_routes: RelationshipStore<HostnameRoutes>,
    route_hostnames: RelationshipStore<Vec<String>>,
}

impl UniqueHostNamespaceLister {
    pub fn new() -> Self {
        Self {
            hostname_routes: RelationshipStore::new("hostname_routes"),
            route_hostnames: RelationshipStore::new("route_hostnames"),
        }
    }

    /// Ask for `hostname` on behalf of `route` (created at `created`, Unix seconds)
    ///
    /// Call once per hostname of a route on add and update. A route that
    /// is already active stays admitted; one that is waiting stays out.
    pub fn claim_hostname(&self, hostname: &str, route: &str, created: i64) -> HostnameClaim {
        let mut claim = HostnameClaim::default();
        self.hostname_routes.update(hostname, |current| {
            let mut routes = current.cloned().unwrap_or_default();
            claim = routes.admit(route, created);
            Some(routes)
        });

        if claim.admitted {
            debug!(
                "UniqueHostNamespaceLister: {} admitted for {} (activated: {:?})",
                route, hostname, claim.activated
            );
        } else {
            info!(
                "UniqueHostNamespaceLister: {} waits for {}, held by another namespace",
                route, hostname
            );
        }
        claim
    }

    /// Give up `hostname` for `route`; returns the routes that became active
    ///
    /// The hostname is forgotten once no route wants it.
    pub fn release_hostname(&self, hostname: &str, route: &str) -> Vec<String> {
        let mut known = true;
        let mut activated = Vec::new();
        self.hostname_routes.update(hostname, |current| {
            let Some(current) = current else {
                known = false;
                return None;
            };
            let mut routes = current.clone();
            activated = routes.release(route);
            (!routes.is_empty()).then_some(routes)
        });

        if !known {
            warn!(
                "UniqueHostNamespaceLister: hostname {} not known, nothing to release for {}",
                hostname, route
            );
        } else if !activated.is_empty() {
            info!(
                "UniqueHostNamespaceLister: {} handed to {:?}",
                hostname, activated
            );
        }
        activated
    }

    /// Routes competing for `hostname` (empty if unknown)
    pub fn routes_for_hostname(&self, hostname: &str) -> HostnameRoutes {
        self.hostname_routes.get(hostname).unwrap_or_default()
    }

    // =========================================================================
    // Route → hostnames
    // =========================================================================

    pub fn update_route_hostnames(&self, route: &str, hostnames: Vec<String>) {
        self.route_hostnames.put(route, hostnames);
    }

    pub fn hostnames_for_route(&self, route: &str) -> Vec<String> {
        self.route_hostnames.get(route).unwrap_or_default()
    }

    pub fn delete_route_hostnames(&self, route: &str) -> bool {
        self.route_hostnames.delete(route)
    }

    pub fn collect_metrics(&self, out: &mut Vec<StoreSample>) {
        self.hostname_routes.collect_metrics(out);
        self.route_hostnames.collect_metrics(out);
    }

    pub fn prometheus_metrics(&self) -> String {
        let mut samples = Vec::new();
        self.collect_metrics(&mut samples);
        render_prometheus(&samples)
    }
}

impl Default for UniqueHostNamespaceLister {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UniqueHostNamespaceLister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueHostNamespaceLister")
            .field("hostnames", &self.hostname_routes.len())
            .field("routes", &self.route_hostnames.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_route_namespace() {
        assert_eq!(route_namespace("HTTPRoute/red/r1"), "red");
        assert_eq!(route_namespace("red/r1"), "red");
        assert_eq!(route_namespace("Route/red/r1/extra"), "red");
        assert_eq!(route_namespace("r1"), "");
    }

    #[test]
    fn test_first_namespace_owns_hostname() {
        let lister = UniqueHostNamespaceLister::new();

        assert!(lister.claim_hostname("foo.com", "red/r1", 10).admitted);
        assert!(lister.claim_hostname("foo.com", "red/r2", 20).admitted);
        assert!(!lister.claim_hostname("foo.com", "blue/r1", 5).admitted);

        let routes = lister.routes_for_hostname("foo.com");
        assert_eq!(routes.active(), vec!["red/r1", "red/r2"]);
        assert_eq!(routes.inactive(), vec!["blue/r1"]);
        assert_eq!(routes.owner_namespace(), Some("red"));

        // Repeated claims keep their side
        assert!(lister.claim_hostname("foo.com", "red/r1", 10).admitted);
        assert!(!lister.claim_hostname("foo.com", "blue/r1", 5).admitted);
    }

    #[test]
    fn test_release_hands_over_to_oldest_waiting_namespace() {
        let lister = UniqueHostNamespaceLister::new();
        lister.claim_hostname("foo.com", "red/r1", 10);
        lister.claim_hostname("foo.com", "blue/r1", 30);
        lister.claim_hostname("foo.com", "green/r1", 20);
        lister.claim_hostname("foo.com", "green/r2", 40);

        // Inactive release changes nothing
        assert!(lister.release_hostname("foo.com", "blue/r1").is_empty());
        lister.claim_hostname("foo.com", "blue/r1", 30);

        assert_eq!(
            lister.release_hostname("foo.com", "red/r1"),
            vec!["green/r1", "green/r2"]
        );
        let routes = lister.routes_for_hostname("foo.com");
        assert_eq!(routes.owner_namespace(), Some("green"));
        assert_eq!(routes.inactive(), vec!["blue/r1"]);
    }

    #[test]
    fn test_hostname_forgotten_after_last_release() {
        let lister = UniqueHostNamespaceLister::new();
        lister.claim_hostname("foo.com", "red/r1", 10);
        assert!(lister.release_hostname("foo.com", "red/r1").is_empty());
        assert_eq!(lister.routes_for_hostname("foo.com"), HostnameRoutes::default());

        // Unknown hostname is a no-op
        assert!(lister.release_hostname("foo.com", "red/r1").is_empty());
        assert!(lister.claim_hostname("foo.com", "blue/r1", 50).admitted);
    }

    #[test]
    fn test_route_hostnames() {
        let lister = UniqueHostNamespaceLister::new();
        lister.update_route_hostnames("red/r1", vec!["foo.com".into(), "bar.com".into()]);
        assert_eq!(lister.hostnames_for_route("red/r1"), vec!["foo.com", "bar.com"]);
        assert!(lister.delete_route_hostnames("red/r1"));
        assert!(lister.hostnames_for_route("red/r1").is_empty());
    }

    #[test]
    fn test_concurrent_claims_keep_one_owner() {
        let lister = UniqueHostNamespaceLister::new();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let lister = lister.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let route = format!("ns{}/r{}", t % 3, i % 4);
                        lister.claim_hostname("foo.com", &route, i64::from(t * 100 + i));
                        if i % 5 == 0 {
                            lister.release_hostname("foo.com", &route);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let routes = lister.routes_for_hostname("foo.com");
        let owner = routes.owner_namespace().map(str::to_string);
        for route in routes.active() {
            assert_eq!(Some(route_namespace(&route).to_string()), owner);
        }
        for route in routes.inactive() {
            assert_ne!(Some(route_namespace(&route).to_string()), owner);
        }
    }
}
