//! Gateway API relationships
//!
//! ```text
//! GatewayClass → controller-owned flag
//! GatewayClass → [Gateway]           (a Gateway sits in one class)
//! Gateway      → [Listener]
//! Gateway      ↔ [Service]           (many-to-many)
//! Route        ↔ [Gateway]           (attachment, plus the listeners used)
//! Route        ↔ [Service]           (backend refs)
//! Gateway      ↔ [Secret]            (listener certificates)
//! Gateway      → [hostname]          listener → hostname, gateway+route → [hostname]
//! Route        → [child VS]
//! ```
//!
//! Routes are keyed `kind/namespace/name` ([`RouteRef`]).

use crate::store::{
    render_prometheus, safe_read, safe_write, RelationshipStore, SetIndex, StoreSample,
};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

// =============================================================================
// GatewayKey
// =============================================================================

/// Key for Gateway lookup: (namespace, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GatewayKey {
    pub namespace: String,
    pub name: String,
}

impl GatewayKey {
    #[inline]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for GatewayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A Gateway API route: `kind/namespace/name`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl RouteRef {
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RouteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Route kind a listener admits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteKind {
    pub group: String,
    pub kind: String,
}

/// The parts of a Gateway listener that route attachment depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayListener {
    pub name: String,
    pub port: i32,
    pub protocol: String,
    pub hostname: Option<String>,
    /// `Same`, `All` or `Selector`
    pub allowed_route_namespaces: String,
    pub allowed_route_kinds: Vec<RouteKind>,
}

// =============================================================================
// GatewayLister
// =============================================================================

pub struct GatewayLister {
    lock: Arc<RwLock<()>>,
    class_owned: RelationshipStore<bool>,
    class_gateways: SetIndex,
    gateway_listeners: RelationshipStore<Vec<GatewayListener>>,
    gateway_services: RelationshipStore<Vec<String>>,
    service_gateways: RelationshipStore<Vec<String>>,
    route_gateways: RelationshipStore<Vec<String>>,
    gateway_routes: RelationshipStore<Vec<String>>,
    route_listeners: RelationshipStore<Vec<GatewayListener>>,
    route_services: RelationshipStore<Vec<String>>,
    service_routes: RelationshipStore<Vec<String>>,
    gateway_secrets: RelationshipStore<Vec<String>>,
    secret_gateways: RelationshipStore<Vec<String>>,
    gateway_hostnames: RelationshipStore<Vec<String>>,
    /// `namespace/gateway/listener` → hostname
    listener_hostname: RelationshipStore<String>,
    /// `namespace/gateway/kind/namespace/route` → hostnames in the parent VS
    gateway_route_hostnames: RelationshipStore<Vec<String>>,
    route_child_vs: RelationshipStore<Vec<String>>,
}

impl GatewayLister {
    pub fn new() -> Self {
        Self {
            lock: Arc::new(RwLock::new(())),
            class_owned: RelationshipStore::new("gateway_class"),
            class_gateways: SetIndex::new("gateway_class_gateways"),
            gateway_listeners: RelationshipStore::new("gateway_listeners"),
            gateway_services: RelationshipStore::new("gateway_services"),
            service_gateways: RelationshipStore::new("service_gateways"),
            route_gateways: RelationshipStore::new("route_gateways"),
            gateway_routes: RelationshipStore::new("gateway_routes"),
            route_listeners: RelationshipStore::new("route_listeners"),
            route_services: RelationshipStore::new("route_services"),
            service_routes: RelationshipStore::new("service_routes"),
            gateway_secrets: RelationshipStore::new("gateway_secrets"),
            secret_gateways: RelationshipStore::new("secret_gateways"),
            gateway_hostnames: RelationshipStore::new("gateway_hostnames"),
            listener_hostname: RelationshipStore::new("gateway_listener_hostname"),
            gateway_route_hostnames: RelationshipStore::new("gateway_route_hostnames"),
            route_child_vs: RelationshipStore::new("route_child_vs"),
        }
    }

    // =========================================================================
    // GatewayClass
    // =========================================================================

    /// Record a GatewayClass and whether this controller owns it
    pub fn update_gateway_class(&self, class: &str, owned: bool) {
        self.class_owned.put(class, owned);
    }

    /// `None` if the class is unknown, else whether we own it
    pub fn is_class_owned(&self, class: &str) -> Option<bool> {
        self.class_owned.get(class)
    }

    /// Forget a GatewayClass; its Gateways keep their class binding
    pub fn delete_gateway_class(&self, class: &str) -> bool {
        self.class_owned.delete(class)
    }

    // =========================================================================
    // Gateway → GatewayClass
    // =========================================================================

    /// Place a Gateway in `class`, moving it out of its previous class
    pub fn update_gateway_class_binding(&self, gateway: &GatewayKey, class: &str) {
        let _guard = safe_write(&self.lock);
        if self.class_gateways.add_member(class, &gateway.to_string()) {
            debug!("GatewayLister: gateway {} bound to class {}", gateway, class);
        }
    }

    pub fn gateways_for_class(&self, class: &str) -> Vec<String> {
        self.class_gateways.members(class)
    }

    pub fn class_for_gateway(&self, gateway: &GatewayKey) -> Option<String> {
        self.class_gateways.set_of(&gateway.to_string())
    }

    /// Whether the Gateway belongs to a class this controller owns
    pub fn is_gateway_managed(&self, gateway: &GatewayKey) -> bool {
        let _guard = safe_read(&self.lock);
        self.class_gateways
            .set_of(&gateway.to_string())
            .and_then(|class| self.class_owned.get(&class))
            .unwrap_or(false)
    }

    // =========================================================================
    // Gateway → Listener
    // =========================================================================

    pub fn update_gateway_listeners(&self, gateway: &GatewayKey, listeners: Vec<GatewayListener>) {
        self.gateway_listeners.put(gateway.to_string(), listeners);
    }

    /// Listeners of a Gateway (empty if unknown)
    pub fn gateway_listeners(&self, gateway: &GatewayKey) -> Vec<GatewayListener> {
        self.gateway_listeners
            .get(&gateway.to_string())
            .unwrap_or_default()
    }

    // =========================================================================
    // Gateway ↔ Service
    // =========================================================================

    /// Link a Gateway and a backend Service (`namespace/name`)
    pub fn update_gateway_service(&self, gateway: &GatewayKey, service: &str) {
        let _guard = safe_write(&self.lock);
        let gateway = gateway.to_string();
        self.gateway_services.append_unique(&gateway, service.to_string());
        self.service_gateways.append_unique(service, gateway);
    }

    /// Unlink one Gateway/Service pair; emptied entries are dropped
    pub fn delete_gateway_service(&self, gateway: &GatewayKey, service: &str) -> bool {
        let _guard = safe_write(&self.lock);
        let gateway = gateway.to_string();
        let removed = self
            .gateway_services
            .remove_item(&gateway, &service.to_string());
        self.service_gateways.remove_item(service, &gateway);
        removed
    }

    pub fn services_for_gateway(&self, gateway: &GatewayKey) -> Vec<String> {
        self.gateway_services
            .get(&gateway.to_string())
            .unwrap_or_default()
    }

    pub fn gateways_for_service(&self, service: &str) -> Vec<String> {
        self.service_gateways.get(service).unwrap_or_default()
    }

    // =========================================================================
    // Route ↔ Gateway
    // =========================================================================

    /// Attach `route` to a Gateway through `listeners`
    ///
    /// Listeners accumulate across calls; a listener already recorded for
    /// the route is not added twice.
    pub fn update_gateway_route(
        &self,
        gateway: &GatewayKey,
        listeners: &[GatewayListener],
        route: &RouteRef,
    ) {
        let _guard = safe_write(&self.lock);
        let gateway = gateway.to_string();
        let route = route.to_string();

        self.route_gateways.append_unique(&route, gateway.clone());
        for listener in listeners {
            self.route_listeners.append_unique(&route, listener.clone());
        }
        if self.gateway_routes.append_unique(&gateway, route.clone()) {
            debug!("GatewayLister: route {} attached to gateway {}", route, gateway);
        }
    }

    /// Detach one Route/Gateway pair
    pub fn delete_gateway_route(&self, route: &RouteRef, gateway: &GatewayKey) -> bool {
        let _guard = safe_write(&self.lock);
        let gateway = gateway.to_string();
        let route = route.to_string();
        self.gateway_routes.remove_item(&gateway, &route);
        self.route_gateways.remove_item(&route, &gateway)
    }

    pub fn gateways_for_route(&self, route: &RouteRef) -> Vec<String> {
        let _guard = safe_read(&self.lock);
        self.route_gateways
            .get(&route.to_string())
            .unwrap_or_default()
    }

    pub fn routes_for_gateway(&self, gateway: &GatewayKey) -> Vec<String> {
        let _guard = safe_read(&self.lock);
        self.gateway_routes
            .get(&gateway.to_string())
            .unwrap_or_default()
    }

    /// Listeners the route attached through, in attachment order
    pub fn listeners_for_route(&self, route: &RouteRef) -> Vec<GatewayListener> {
        self.route_listeners
            .get(&route.to_string())
            .unwrap_or_default()
    }

    // =========================================================================
    // Route ↔ Service
    // =========================================================================

    pub fn update_route_service(&self, route: &RouteRef, service: &str) {
        let _guard = safe_write(&self.lock);
        let route = route.to_string();
        self.route_services.append_unique(&route, service.to_string());
        self.service_routes.append_unique(service, route);
    }

    pub fn delete_route_service(&self, route: &RouteRef, service: &str) -> bool {
        let _guard = safe_write(&self.lock);
        let route = route.to_string();
        self.service_routes.remove_item(service, &route);
        self.route_services
            .remove_item(&route, &service.to_string())
    }

    pub fn services_for_route(&self, route: &RouteRef) -> Vec<String> {
        let _guard = safe_read(&self.lock);
        self.route_services
            .get(&route.to_string())
            .unwrap_or_default()
    }

    pub fn routes_for_service(&self, service: &str) -> Vec<String> {
        let _guard = safe_read(&self.lock);
        self.service_routes.get(service).unwrap_or_default()
    }

    // =========================================================================
    // Gateway ↔ Secret
    // =========================================================================

    /// Replace the certificate Secrets (`namespace/name`) of a Gateway
    ///
    /// Secrets missing from `secrets` no longer point back at the Gateway.
    pub fn update_gateway_secrets(&self, gateway: &GatewayKey, secrets: Vec<String>) {
        let _guard = safe_write(&self.lock);
        let gateway = gateway.to_string();

        let previous = self.gateway_secrets.get(&gateway).unwrap_or_default();
        for secret in previous.iter().filter(|secret| !secrets.contains(secret)) {
            self.secret_gateways.remove_item(secret, &gateway);
        }
        for secret in &secrets {
            self.secret_gateways.append_unique(secret, gateway.clone());
        }
        if secrets.is_empty() {
            self.gateway_secrets.delete(&gateway);
        } else {
            self.gateway_secrets.put(gateway, secrets);
        }
    }

    pub fn secrets_for_gateway(&self, gateway: &GatewayKey) -> Vec<String> {
        let _guard = safe_read(&self.lock);
        self.gateway_secrets
            .get(&gateway.to_string())
            .unwrap_or_default()
    }

    pub fn gateways_for_secret(&self, secret: &str) -> Vec<String> {
        let _guard = safe_read(&self.lock);
        self.secret_gateways.get(secret).unwrap_or_default()
    }

    // =========================================================================
    // Hostnames
    // =========================================================================

    /// Hostnames claimed by a Gateway's listeners, for overlap checks
    pub fn update_gateway_hostnames(&self, gateway: &GatewayKey, hostnames: Vec<String>) {
        self.gateway_hostnames.put(gateway.to_string(), hostnames);
    }

    pub fn gateway_hostnames(&self, gateway: &GatewayKey) -> Vec<String> {
        self.gateway_hostnames
            .get(&gateway.to_string())
            .unwrap_or_default()
    }

    pub fn update_listener_hostname(&self, gateway: &GatewayKey, listener: &str, hostname: &str) {
        self.listener_hostname
            .put(format!("{}/{}", gateway, listener), hostname.to_string());
    }

    pub fn listener_hostname(&self, gateway: &GatewayKey, listener: &str) -> Option<String> {
        self.listener_hostname.get(&format!("{}/{}", gateway, listener))
    }

    /// FQDNs a route contributes to the Gateway's parent VS
    pub fn update_gateway_route_hostnames(
        &self,
        gateway: &GatewayKey,
        route: &RouteRef,
        hostnames: Vec<String>,
    ) {
        self.gateway_route_hostnames
            .put(gateway_route(&gateway.to_string(), &route.to_string()), hostnames);
    }

    pub fn gateway_route_hostnames(&self, gateway: &GatewayKey, route: &RouteRef) -> Vec<String> {
        self.gateway_route_hostnames
            .get(&gateway_route(&gateway.to_string(), &route.to_string()))
            .unwrap_or_default()
    }

    // =========================================================================
    // Route → child VS
    // =========================================================================

    pub fn update_route_child_vs(&self, route: &RouteRef, child_vs: &str) {
        self.route_child_vs
            .append_unique(&route.to_string(), child_vs.to_string());
    }

    pub fn remove_route_child_vs(&self, route: &RouteRef, child_vs: &str) -> bool {
        self.route_child_vs
            .remove_item(&route.to_string(), &child_vs.to_string())
    }

    /// Forget every child VS of a route
    pub fn clear_route_child_vs(&self, route: &RouteRef) -> bool {
        self.route_child_vs.delete(&route.to_string())
    }

    pub fn child_vs_for_route(&self, route: &RouteRef) -> Vec<String> {
        self.route_child_vs
            .get(&route.to_string())
            .unwrap_or_default()
    }

    // =========================================================================
    // Cascade
    // =========================================================================

    /// Remove a Gateway from every relationship it takes part in
    ///
    /// Routes stay known; they only lose this Gateway as a parent.
    pub fn delete_gateway(&self, gateway: &GatewayKey) {
        let _guard = safe_write(&self.lock);
        let key = gateway.to_string();

        let services = self.gateway_services.get(&key).unwrap_or_default();
        for service in &services {
            self.service_gateways.remove_item(service, &key);
        }
        self.gateway_services.delete(&key);

        for secret in self.gateway_secrets.get(&key).unwrap_or_default() {
            self.secret_gateways.remove_item(&secret, &key);
        }
        self.gateway_secrets.delete(&key);

        let routes = self.gateway_routes.get(&key).unwrap_or_default();
        for route in &routes {
            self.route_gateways.remove_item(route, &key);
        }
        self.gateway_routes.delete(&key);

        self.gateway_listeners.delete(&key);
        self.gateway_hostnames.delete(&key);
        let prefix = format!("{}/", key);
        self.listener_hostname.batch_delete(&keys_with_prefix(&self.listener_hostname, &prefix));
        self.gateway_route_hostnames
            .batch_delete(&keys_with_prefix(&self.gateway_route_hostnames, &prefix));
        let class = self.class_gateways.remove_member_anywhere(&key);

        debug!(
            "GatewayLister: deleted gateway {} (class: {:?}, services: {}, routes: {})",
            gateway,
            class,
            services.len(),
            routes.len()
        );
    }

    /// Remove a route from its Gateways, listeners and Services
    ///
    /// A Gateway↔Service link that no remaining route of the Gateway
    /// backs is dropped as well. Child VS names are kept until
    /// [`clear_route_child_vs`](Self::clear_route_child_vs).
    pub fn delete_route(&self, route: &RouteRef) {
        let _guard = safe_write(&self.lock);
        let key = route.to_string();

        self.route_listeners.delete(&key);

        let gateways = self.route_gateways.get(&key).unwrap_or_default();
        for gateway in &gateways {
            self.gateway_routes.remove_item(gateway, &key);
            self.gateway_route_hostnames.delete(&gateway_route(gateway, &key));
        }
        self.route_gateways.delete(&key);

        let services = self.route_services.get(&key).unwrap_or_default();
        for service in &services {
            self.service_routes.remove_item(service, &key);
        }
        self.route_services.delete(&key);

        for gateway in &gateways {
            let gateway_routes = self.gateway_routes.get(gateway).unwrap_or_default();
            for service in &services {
                let service_routes = self.service_routes.get(service).unwrap_or_default();
                let still_backed = gateway_routes
                    .iter()
                    .any(|route| service_routes.contains(route));
                if !still_backed {
                    self.gateway_services.remove_item(gateway, service);
                    self.service_gateways.remove_item(service, gateway);
                }
            }
        }

        debug!(
            "GatewayLister: deleted route {} (gateways: {}, services: {})",
            route,
            gateways.len(),
            services.len()
        );
    }

    pub fn collect_metrics(&self, out: &mut Vec<StoreSample>) {
        self.class_owned.collect_metrics(out);
        self.class_gateways.collect_metrics(out);
        self.gateway_listeners.collect_metrics(out);
        self.gateway_services.collect_metrics(out);
        self.service_gateways.collect_metrics(out);
        self.route_gateways.collect_metrics(out);
        self.gateway_routes.collect_metrics(out);
        self.route_listeners.collect_metrics(out);
        self.route_services.collect_metrics(out);
        self.service_routes.collect_metrics(out);
        self.gateway_secrets.collect_metrics(out);
        self.secret_gateways.collect_metrics(out);
        self.gateway_hostnames.collect_metrics(out);
        self.listener_hostname.collect_metrics(out);
        self.gateway_route_hostnames.collect_metrics(out);
        self.route_child_vs.collect_metrics(out);
    }

    pub fn prometheus_metrics(&self) -> String {
        let mut samples = Vec::new();
        self.collect_metrics(&mut samples);
        render_prometheus(&samples)
    }
}

fn gateway_route(gateway: &str, route: &str) -> String {
    format!("{}/{}", gateway, route)
}

fn keys_with_prefix<V>(store: &RelationshipStore<V>, prefix: &str) -> Vec<String> {
    store.with_read(|map| {
        map.keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    })
}

impl Default for GatewayLister {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for GatewayLister {
    fn clone(&self) -> Self {
        Self {
            lock: Arc::clone(&self.lock),
            class_owned: self.class_owned.clone(),
            class_gateways: self.class_gateways.clone(),
            gateway_listeners: self.gateway_listeners.clone(),
            gateway_services: self.gateway_services.clone(),
            service_gateways: self.service_gateways.clone(),
            route_gateways: self.route_gateways.clone(),
            gateway_routes: self.gateway_routes.clone(),
            route_listeners: self.route_listeners.clone(),
            route_services: self.route_services.clone(),
            service_routes: self.service_routes.clone(),
            gateway_secrets: self.gateway_secrets.clone(),
            secret_gateways: self.secret_gateways.clone(),
            gateway_hostnames: self.gateway_hostnames.clone(),
            listener_hostname: self.listener_hostname.clone(),
            gateway_route_hostnames: self.gateway_route_hostnames.clone(),
            route_child_vs: self.route_child_vs.clone(),
        }
    }
}

impl fmt::Debug for GatewayLister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayLister")
            .field("classes", &self.class_owned.len())
            .field("gateways", &self.gateway_listeners.len())
            .field("routes", &self.route_gateways.len())
            .finish()
    }
}
