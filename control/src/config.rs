//! Configuration for the state layer
//!
//! Only the settings the synthesizer and adapters read. Everything else
//! (informers, leader election, controller credentials) is configured by
//! the process embedding this crate.

use crate::error::StateError;
use crate::graph::VsKey;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

/// CNI plugin the cluster runs; decides where pod CIDRs and node IPs come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CniPlugin {
    /// BlockAffinity objects, node IP from the Calico annotation
    Calico,
    /// CiliumNode objects
    Cilium,
    /// `Node.spec.podCIDRs`
    #[default]
    Other,
}

impl CniPlugin {
    pub fn as_str(&self) -> &'static str {
        match self {
            CniPlugin::Calico => "calico",
            CniPlugin::Cilium => "cilium",
            CniPlugin::Other => "other",
        }
    }
}

impl fmt::Display for CniPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CniPlugin {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            // Canal runs Calico's IPAM
            "calico" | "canal" => Ok(CniPlugin::Calico),
            "cilium" => Ok(CniPlugin::Cilium),
            "" => Err(StateError::Config("CNI plugin must not be empty".to_string())),
            _ => Ok(CniPlugin::Other),
        }
    }
}

/// State-layer configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StateConfig {
    /// Lead segment of every static route id
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Name of the VRF node holding the static routes
    #[serde(default = "default_vrf_name")]
    pub vrf_name: String,

    /// Tenant owning the VRF graph
    #[serde(default = "default_tenant")]
    pub tenant: String,

    #[serde(default)]
    pub cni_plugin: CniPlugin,
}

fn default_cluster_name() -> String {
    "cluster".to_string()
}

fn default_vrf_name() -> String {
    "global".to_string()
}

fn default_tenant() -> String {
    "admin".to_string()
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            cluster_name: default_cluster_name(),
            vrf_name: default_vrf_name(),
            tenant: default_tenant(),
            cni_plugin: CniPlugin::default(),
        }
    }
}

impl StateConfig {
    /// Defaults overlaid with `LBGRAPH_*` environment variables
    pub fn from_env() -> Result<Self, StateError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns per variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("LBGRAPH_CLUSTER_NAME") {
            config.cluster_name = non_empty("LBGRAPH_CLUSTER_NAME", val)?;
        }
        if let Some(val) = lookup("LBGRAPH_VRF_NAME") {
            config.vrf_name = non_empty("LBGRAPH_VRF_NAME", val)?;
        }
        if let Some(val) = lookup("LBGRAPH_TENANT") {
            config.tenant = non_empty("LBGRAPH_TENANT", val)?;
        }
        if let Some(val) = lookup("LBGRAPH_CNI_PLUGIN") {
            config.cni_plugin = val.parse()?;
        }

        Ok(config)
    }

    /// Key of the graph that carries the VRF node
    pub fn vrf_graph_key(&self) -> VsKey {
        VsKey::new(self.tenant.clone(), self.vrf_name.clone())
    }
}

fn non_empty(var: &str, val: String) -> Result<String, StateError> {
    let trimmed = val.trim();
    if trimmed.is_empty() {
        return Err(StateError::Config(format!("{} must not be empty", var)));
    }
    Ok(trimmed.to_string())
}
