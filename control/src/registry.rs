//! State registry
//!
//! Owns one instance of every lister plus the graph store and the
//! synthesizer wired to them. Tests build isolated registries with
//! [`StateRegistry::new`]; the process uses [`StateRegistry::shared`].

use crate::config::StateConfig;
use crate::graph::GraphStore;
use crate::listers::{
    CrdLister, CtrlPropLister, GatewayLister, InfraSettingLister, MultiClusterLister,
    NamespaceLister, NodeLister, RuleSetLister, ServiceLister, UniqueHostNamespaceLister,
};
use crate::store::render_prometheus;
use crate::synthesizer::StaticRouteSynthesizer;
use std::sync::OnceLock;
use tracing::{info, warn};

static SHARED: OnceLock<StateRegistry> = OnceLock::new();

/// Every in-memory state store of the controller
#[derive(Debug, Clone)]
pub struct StateRegistry {
    config: StateConfig,
    crd: CrdLister,
    gateway: GatewayLister,
    infra_setting: InfraSettingLister,
    service: ServiceLister,
    multicluster: MultiClusterLister,
    rule_sets: RuleSetLister,
    ctrl_prop: CtrlPropLister,
    namespace: NamespaceLister,
    unique_hostname: UniqueHostNamespaceLister,
    graphs: GraphStore,
    synthesizer: StaticRouteSynthesizer,
}

impl StateRegistry {
    pub fn new(config: StateConfig) -> Self {
        let nodes = NodeLister::new();
        let graphs = GraphStore::new();
        let synthesizer = StaticRouteSynthesizer::new(nodes, graphs.clone(), config.clone());

        Self {
            config,
            crd: CrdLister::new(),
            gateway: GatewayLister::new(),
            infra_setting: InfraSettingLister::new(),
            service: ServiceLister::new(),
            multicluster: MultiClusterLister::new(),
            rule_sets: RuleSetLister::new(),
            ctrl_prop: CtrlPropLister::new(),
            namespace: NamespaceLister::new(),
            unique_hostname: UniqueHostNamespaceLister::new(),
            graphs,
            synthesizer,
        }
    }

    /// Process-wide registry, built from the environment on first use
    ///
    /// A bad environment falls back to the defaults so callers never see
    /// a half-initialised registry.
    pub fn shared() -> &'static StateRegistry {
        SHARED.get_or_init(|| {
            let config = StateConfig::from_env().unwrap_or_else(|e| {
                warn!("StateRegistry: {}, using default configuration", e);
                StateConfig::default()
            });
            info!(
                "StateRegistry: initialised (cluster={}, vrf={}/{}, cni={})",
                config.cluster_name, config.tenant, config.vrf_name, config.cni_plugin
            );
            StateRegistry::new(config)
        })
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    pub fn crd(&self) -> &CrdLister {
        &self.crd
    }

    pub fn gateway(&self) -> &GatewayLister {
        &self.gateway
    }

    pub fn infra_setting(&self) -> &InfraSettingLister {
        &self.infra_setting
    }

    pub fn service(&self) -> &ServiceLister {
        &self.service
    }

    pub fn multicluster(&self) -> &MultiClusterLister {
        &self.multicluster
    }

    pub fn rule_sets(&self) -> &RuleSetLister {
        &self.rule_sets
    }

    pub fn ctrl_prop(&self) -> &CtrlPropLister {
        &self.ctrl_prop
    }

    pub fn namespace(&self) -> &NamespaceLister {
        &self.namespace
    }

    pub fn unique_hostname(&self) -> &UniqueHostNamespaceLister {
        &self.unique_hostname
    }

    pub fn nodes(&self) -> &NodeLister {
        self.synthesizer.nodes()
    }

    pub fn graphs(&self) -> &GraphStore {
        &self.graphs
    }

    pub fn synthesizer(&self) -> &StaticRouteSynthesizer {
        &self.synthesizer
    }

    /// Store counters of every lister, in Prometheus text format
    ///
    /// Rows from all stores are gathered first so each metric family is
    /// announced once.
    pub fn prometheus_metrics(&self) -> String {
        let mut samples = Vec::new();
        self.crd.collect_metrics(&mut samples);
        self.gateway.collect_metrics(&mut samples);
        self.infra_setting.collect_metrics(&mut samples);
        self.service.collect_metrics(&mut samples);
        self.rule_sets.collect_metrics(&mut samples);
        self.namespace.collect_metrics(&mut samples);
        self.unique_hostname.collect_metrics(&mut samples);
        self.nodes().collect_metrics(&mut samples);
        self.graphs.collect_metrics(&mut samples);
        render_prometheus(&samples)
    }
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new(StateConfig::default())
    }
}
