//! Rule-to-rule references: L7Rule → [HostRule], HealthMonitor → [L4Rule]

use crate::store::{render_prometheus, SetIndex, StoreSample};
use std::fmt;

#[derive(Clone)]
pub struct RuleSetLister {
    l7_rule_hostrules: SetIndex,
    health_monitor_l4_rules: SetIndex,
}

impl RuleSetLister {
    pub fn new() -> Self {
        Self {
            l7_rule_hostrules: SetIndex::new("l7rule_hostrule"),
            health_monitor_l4_rules: SetIndex::new("healthmonitor_l4rule"),
        }
    }

    /// Record that `hostrule` references `l7_rule`
    ///
    /// A HostRule references one L7Rule; pointing it at another moves it.
    pub fn update_l7_rule_hostrule(&self, l7_rule: &str, hostrule: &str) {
        self.l7_rule_hostrules.add_member(l7_rule, hostrule);
    }

    pub fn hostrules_for_l7_rule(&self, l7_rule: &str) -> Vec<String> {
        self.l7_rule_hostrules.members(l7_rule)
    }

    pub fn l7_rule_for_hostrule(&self, hostrule: &str) -> Option<String> {
        self.l7_rule_hostrules.set_of(hostrule)
    }

    pub fn remove_hostrule(&self, hostrule: &str) -> bool {
        self.l7_rule_hostrules
            .remove_member_anywhere(hostrule)
            .is_some()
    }

    /// Record that `l4_rule` references `health_monitor`
    pub fn update_health_monitor_l4_rule(&self, health_monitor: &str, l4_rule: &str) {
        self.health_monitor_l4_rules
            .add_member(health_monitor, l4_rule);
    }

    pub fn l4_rules_for_health_monitor(&self, health_monitor: &str) -> Vec<String> {
        self.health_monitor_l4_rules.members(health_monitor)
    }

    pub fn remove_l4_rule(&self, l4_rule: &str) -> bool {
        self.health_monitor_l4_rules
            .remove_member_anywhere(l4_rule)
            .is_some()
    }

    /// Forget a HealthMonitor, returning the L4Rules that referenced it
    pub fn remove_health_monitor(&self, health_monitor: &str) -> Vec<String> {
        self.health_monitor_l4_rules.remove_set(health_monitor)
    }

    pub fn collect_metrics(&self, out: &mut Vec<StoreSample>) {
        self.l7_rule_hostrules.collect_metrics(out);
        self.health_monitor_l4_rules.collect_metrics(out);
    }

    pub fn prometheus_metrics(&self) -> String {
        let mut samples = Vec::new();
        self.collect_metrics(&mut samples);
        render_prometheus(&samples)
    }
}

impl Default for RuleSetLister {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RuleSetLister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSetLister")
            .field("l7_rules", &self.l7_rule_hostrules.len())
            .field("health_monitors", &self.health_monitor_l4_rules.len())
            .finish()
    }
}
