//! Domain listers
//!
//! Typed façades over the relationship stores, one per relationship family.
//! Every lister that updates more than one store as a unit owns a coarse
//! lock of its own, taken around the whole multi-store operation.

pub mod crd_rules;
pub mod ctrl_prop;
pub mod fqdn_match;
pub mod gateway;
pub mod infra_setting;
pub mod multicluster;
pub mod namespace;
pub mod node;
pub mod rule_sets;
pub mod service;
pub mod unique_hostname;

pub use crd_rules::{CrdLister, PathRules};
pub use ctrl_prop::CtrlPropLister;
pub use fqdn_match::{ContainsDirection, FqdnMatchType};
pub use gateway::{GatewayKey, GatewayListener, GatewayLister, RouteKind, RouteRef};
pub use infra_setting::InfraSettingLister;
pub use multicluster::MultiClusterLister;
pub use namespace::NamespaceLister;
pub use node::{CidrBlock, NodeInfo, NodeLister, NodeSnapshot};
pub use rule_sets::RuleSetLister;
pub use service::{IngressHosts, IngressMappings, ServiceLister};
pub use unique_hostname::{HostnameClaim, HostnameRoutes, UniqueHostNamespaceLister};
