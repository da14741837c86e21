//! CRD rule relationships keyed by FQDN
//!
//! ```text
//! fqdn ↔ hostrule            (1:1)
//! fqdn → match type          (Exact / Contains / Wildcard)
//! fqdn → gslb fqdn
//! fqdn → { path → httprule } with httprule → fqdn
//! fqdn ↔ shared VS model     (1:1)
//! ```

use super::fqdn_match::{fqdn_matches, sort_by_specificity, ContainsDirection, FqdnMatchType};
use crate::store::{
    render_prometheus, safe_read, safe_write, BidirectionalIndex, RelationshipStore, StoreSample,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Path → HTTPRule name for one FQDN
pub type PathRules = BTreeMap<String, String>;

pub struct CrdLister {
    lock: Arc<RwLock<()>>,
    fqdn_hostrule: BidirectionalIndex,
    fqdn_type: RelationshipStore<FqdnMatchType>,
    fqdn_gs_fqdn: RelationshipStore<String>,
    fqdn_http_rules: RelationshipStore<PathRules>,
    http_rule_fqdn: RelationshipStore<String>,
    fqdn_shared_vs: BidirectionalIndex,
}

impl CrdLister {
    pub fn new() -> Self {
        Self {
            lock: Arc::new(RwLock::new(())),
            fqdn_hostrule: BidirectionalIndex::new("fqdn_hostrule"),
            fqdn_type: RelationshipStore::new("fqdn_type"),
            fqdn_gs_fqdn: RelationshipStore::new("fqdn_gs_fqdn"),
            fqdn_http_rules: RelationshipStore::new("fqdn_http_rules"),
            http_rule_fqdn: RelationshipStore::new("http_rule_fqdn"),
            fqdn_shared_vs: BidirectionalIndex::new("fqdn_shared_vs"),
        }
    }

    // =========================================================================
    // HostRule
    // =========================================================================

    pub fn update_fqdn_hostrule(&self, fqdn: &str, hostrule: &str) {
        let _guard = safe_write(&self.lock);
        self.fqdn_hostrule.link(fqdn, hostrule);
    }

    /// Exact FQDN → HostRule lookup
    pub fn hostrule_for_fqdn(&self, fqdn: &str) -> Option<String> {
        self.fqdn_hostrule.lookup_a(fqdn)
    }

    pub fn fqdn_for_hostrule(&self, hostrule: &str) -> Option<String> {
        self.fqdn_hostrule.lookup_b(hostrule)
    }

    /// HostRule whose registered FQDN pattern matches `fqdn`
    ///
    /// Each pattern is compared with its own match type; `Contains` means
    /// the candidate contains the pattern.
    pub fn hostrule_for_fqdn_with_type(&self, fqdn: &str) -> Option<String> {
        let _guard = safe_read(&self.lock);
        let table = self.fqdn_hostrule.forward_snapshot();

        let mut patterns: Vec<String> = table.keys().cloned().collect();
        sort_by_specificity(&mut patterns);

        patterns
            .into_iter()
            .find(|pattern| {
                let match_type = self.fqdn_type.get(pattern).unwrap_or_default();
                fqdn_matches(
                    match_type,
                    ContainsDirection::CandidateContainsPattern,
                    pattern,
                    fqdn,
                )
            })
            .and_then(|pattern| table.get(&pattern).cloned())
    }

    /// Drop a HostRule and the FQDN it was bound to
    pub fn delete_hostrule(&self, hostrule: &str) -> bool {
        let _guard = safe_write(&self.lock);
        self.fqdn_hostrule.unlink_by_b(hostrule)
    }

    // =========================================================================
    // Match types
    // =========================================================================

    pub fn set_fqdn_match_type(&self, fqdn: &str, match_type: FqdnMatchType) {
        self.fqdn_type.put(fqdn, match_type);
    }

    /// Match type of a pattern; untagged patterns are `Exact`
    pub fn fqdn_match_type(&self, fqdn: &str) -> FqdnMatchType {
        self.fqdn_type.get(fqdn).unwrap_or_default()
    }

    pub fn delete_fqdn_match_type(&self, fqdn: &str) -> bool {
        self.fqdn_type.delete(fqdn)
    }

    // =========================================================================
    // GSLB FQDN
    // =========================================================================

    pub fn update_gs_fqdn(&self, fqdn: &str, gs_fqdn: &str) {
        self.fqdn_gs_fqdn.put(fqdn, gs_fqdn.to_string());
    }

    pub fn gs_fqdn(&self, fqdn: &str) -> Option<String> {
        self.fqdn_gs_fqdn.get(fqdn)
    }

    pub fn delete_gs_fqdn(&self, fqdn: &str) -> bool {
        self.fqdn_gs_fqdn.delete(fqdn)
    }

    // =========================================================================
    // HTTPRule
    // =========================================================================

    /// Bind `path` under `fqdn` to `http_rule`
    ///
    /// An HTTPRule serves one FQDN; rebinding it to another FQDN releases
    /// its paths on the old one.
    pub fn update_fqdn_http_rule(&self, fqdn: &str, path: &str, http_rule: &str) {
        let _guard = safe_write(&self.lock);

        if let Some(old_fqdn) = self.http_rule_fqdn.get(http_rule) {
            if old_fqdn != fqdn {
                self.release_http_rule_paths(&old_fqdn, http_rule);
            }
        }

        self.http_rule_fqdn.put(http_rule, fqdn.to_string());
        self.fqdn_http_rules.update(fqdn, |current| {
            let mut rules = current.cloned().unwrap_or_default();
            rules.insert(path.to_string(), http_rule.to_string());
            Some(rules)
        });
        debug!("CrdLister: httprule {} serves {}{}", http_rule, fqdn, path);
    }

    pub fn http_rules_for_fqdn(&self, fqdn: &str) -> Option<PathRules> {
        self.fqdn_http_rules.get(fqdn)
    }

    pub fn fqdn_for_http_rule(&self, http_rule: &str) -> Option<String> {
        self.http_rule_fqdn.get(http_rule)
    }

    /// Remove an HTTPRule and every path it held
    ///
    /// The FQDN entry goes away once no path is left on it.
    pub fn remove_http_rule(&self, http_rule: &str) -> bool {
        let _guard = safe_write(&self.lock);
        let Some(fqdn) = self.http_rule_fqdn.get(http_rule) else {
            return false;
        };
        self.http_rule_fqdn.delete(http_rule);
        self.release_http_rule_paths(&fqdn, http_rule);
        true
    }

    fn release_http_rule_paths(&self, fqdn: &str, http_rule: &str) {
        self.fqdn_http_rules.update(fqdn, |current| {
            let mut rules = current.cloned()?;
            rules.retain(|_, rule| rule != http_rule);
            (!rules.is_empty()).then_some(rules)
        });
    }

    // =========================================================================
    // Shared VS model
    // =========================================================================

    pub fn update_fqdn_shared_vs_model(&self, fqdn: &str, model: &str) {
        let _guard = safe_write(&self.lock);
        self.fqdn_shared_vs.link(fqdn, model);
    }

    /// Shared VS models whose FQDN matches `fqdn`
    ///
    /// The match type is the one registered for `fqdn` itself. `Exact`
    /// yields at most one model; `Contains` collects every stored FQDN that
    /// contains `fqdn`, and `Wildcard` (`*suffix`) every stored FQDN ending in
    /// the suffix. Results follow most-specific-first order.
    pub fn shared_vs_models_for_fqdn(&self, fqdn: &str) -> Vec<String> {
        let _guard = safe_read(&self.lock);
        let match_type = self.fqdn_type.get(fqdn).unwrap_or_default();

        if match_type == FqdnMatchType::Exact {
            return self.fqdn_shared_vs.lookup_a(fqdn).into_iter().collect();
        }

        let table = self.fqdn_shared_vs.forward_snapshot();
        let mut stored: Vec<String> = table.keys().cloned().collect();
        sort_by_specificity(&mut stored);

        stored
            .iter()
            .filter(|value| {
                fqdn_matches(
                    match_type,
                    ContainsDirection::PatternContainsCandidate,
                    value,
                    fqdn,
                )
            })
            .filter_map(|value| table.get(value).cloned())
            .collect()
    }

    pub fn fqdn_for_shared_vs_model(&self, model: &str) -> Option<String> {
        self.fqdn_shared_vs.lookup_b(model)
    }

    pub fn delete_fqdn_shared_vs_model(&self, fqdn: &str) -> bool {
        let _guard = safe_write(&self.lock);
        self.fqdn_shared_vs.unlink_by_a(fqdn)
    }

    pub fn delete_shared_vs_model(&self, model: &str) -> bool {
        let _guard = safe_write(&self.lock);
        self.fqdn_shared_vs.unlink_by_b(model)
    }

    pub fn collect_metrics(&self, out: &mut Vec<StoreSample>) {
        self.fqdn_hostrule.collect_metrics(out);
        self.fqdn_type.collect_metrics(out);
        self.fqdn_gs_fqdn.collect_metrics(out);
        self.fqdn_http_rules.collect_metrics(out);
        self.http_rule_fqdn.collect_metrics(out);
        self.fqdn_shared_vs.collect_metrics(out);
    }

    pub fn prometheus_metrics(&self) -> String {
        let mut samples = Vec::new();
        self.collect_metrics(&mut samples);
        render_prometheus(&samples)
    }
}

impl Default for CrdLister {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CrdLister {
    fn clone(&self) -> Self {
        Self {
            lock: Arc::clone(&self.lock),
            fqdn_hostrule: self.fqdn_hostrule.clone(),
            fqdn_type: self.fqdn_type.clone(),
            fqdn_gs_fqdn: self.fqdn_gs_fqdn.clone(),
            fqdn_http_rules: self.fqdn_http_rules.clone(),
            http_rule_fqdn: self.http_rule_fqdn.clone(),
            fqdn_shared_vs: self.fqdn_shared_vs.clone(),
        }
    }
}

impl fmt::Debug for CrdLister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrdLister")
            .field("hostrules", &self.fqdn_hostrule.len())
            .field("http_rules", &self.http_rule_fqdn.len())
            .field("shared_vs_models", &self.fqdn_shared_vs.len())
            .finish()
    }
}
