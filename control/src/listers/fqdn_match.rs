//! FQDN pattern matching shared by the HostRule and SharedVS lookups
//!
//! Every registered pattern carries one [`FqdnMatchType`] (untagged patterns
//! are `Exact`). When several patterns match, the most specific wins:
//! longest pattern first, then lexicographically smallest.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// How a registered FQDN pattern is compared against a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FqdnMatchType {
    #[default]
    Exact,
    Contains,
    Wildcard,
}

impl FqdnMatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FqdnMatchType::Exact => "Exact",
            FqdnMatchType::Contains => "Contains",
            FqdnMatchType::Wildcard => "Wildcard",
        }
    }
}

impl fmt::Display for FqdnMatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FqdnMatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            // HostRule CRDs leave the field empty for exact FQDNs
            "" | "exact" => Ok(FqdnMatchType::Exact),
            "contains" => Ok(FqdnMatchType::Contains),
            "wildcard" => Ok(FqdnMatchType::Wildcard),
            other => Err(format!("unknown FQDN match type: {}", other)),
        }
    }
}

/// Which side of a `Contains` comparison must hold the other
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainsDirection {
    /// The candidate FQDN contains the registered pattern (HostRule lookup)
    CandidateContainsPattern,
    /// The registered value contains the candidate (SharedVS lookup)
    PatternContainsCandidate,
}

/// Suffix of a `*suffix` wildcard, `None` if `pattern` is not a wildcard
#[inline]
pub fn wildcard_suffix(pattern: &str) -> Option<&str> {
    pattern.strip_prefix('*')
}

/// Compare `candidate` against one registered `pattern`
///
/// For [`ContainsDirection::PatternContainsCandidate`] the wildcard sits on
/// the candidate side as well: `*suffix` matches stored values ending in
/// `suffix`.
pub fn fqdn_matches(
    match_type: FqdnMatchType,
    direction: ContainsDirection,
    pattern: &str,
    candidate: &str,
) -> bool {
    match match_type {
        FqdnMatchType::Exact => pattern == candidate,
        FqdnMatchType::Contains => match direction {
            ContainsDirection::CandidateContainsPattern => candidate.contains(pattern),
            ContainsDirection::PatternContainsCandidate => pattern.contains(candidate),
        },
        FqdnMatchType::Wildcard => match direction {
            ContainsDirection::CandidateContainsPattern => {
                wildcard_suffix(pattern).is_some_and(|suffix| candidate.ends_with(suffix))
            }
            ContainsDirection::PatternContainsCandidate => {
                wildcard_suffix(candidate).is_some_and(|suffix| pattern.ends_with(suffix))
            }
        },
    }
}

/// Most-specific-first ordering: longer patterns, then lexicographic
#[inline]
pub fn by_specificity(a: &str, b: &str) -> Ordering {
    b.len().cmp(&a.len()).then_with(|| a.cmp(b))
}

/// Sort patterns so iteration is deterministic and most specific first
pub fn sort_by_specificity(patterns: &mut [String]) {
    patterns.sort_by(|a, b| by_specificity(a, b));
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    const HOSTRULE: ContainsDirection = ContainsDirection::CandidateContainsPattern;
    const SHARED_VS: ContainsDirection = ContainsDirection::PatternContainsCandidate;

    #[test]
    fn test_parse_match_type() {
        assert_eq!("Exact".parse::<FqdnMatchType>().unwrap(), FqdnMatchType::Exact);
        assert_eq!("".parse::<FqdnMatchType>().unwrap(), FqdnMatchType::Exact);
        assert_eq!("contains".parse::<FqdnMatchType>().unwrap(), FqdnMatchType::Contains);
        assert_eq!("WILDCARD".parse::<FqdnMatchType>().unwrap(), FqdnMatchType::Wildcard);
        assert!("regex".parse::<FqdnMatchType>().is_err());
        assert_eq!(FqdnMatchType::default(), FqdnMatchType::Exact);
    }

    #[test]
    fn test_exact_ignores_direction() {
        for direction in [HOSTRULE, SHARED_VS] {
            assert!(fqdn_matches(FqdnMatchType::Exact, direction, "foo.com", "foo.com"));
            assert!(!fqdn_matches(FqdnMatchType::Exact, direction, "foo.com", "bar.foo.com"));
        }
    }

    #[test]
    fn test_contains_direction_per_call_site() {
        // HostRule: candidate holds the pattern
        assert!(fqdn_matches(FqdnMatchType::Contains, HOSTRULE, "foo", "app.foo.com"));
        assert!(!fqdn_matches(FqdnMatchType::Contains, HOSTRULE, "app.foo.com", "foo"));

        // SharedVS: stored value holds the candidate
        assert!(fqdn_matches(FqdnMatchType::Contains, SHARED_VS, "app.foo.com", "foo"));
        assert!(!fqdn_matches(FqdnMatchType::Contains, SHARED_VS, "foo", "app.foo.com"));
    }

    #[test]
    fn test_wildcard_pattern_side() {
        assert!(fqdn_matches(FqdnMatchType::Wildcard, HOSTRULE, "*.foo.com", "app.foo.com"));
        assert!(!fqdn_matches(FqdnMatchType::Wildcard, HOSTRULE, "*.foo.com", "app.bar.com"));
        // Not a wildcard pattern at all
        assert!(!fqdn_matches(FqdnMatchType::Wildcard, HOSTRULE, "foo.com", "app.foo.com"));
    }

    #[test]
    fn test_wildcard_candidate_side() {
        assert!(fqdn_matches(FqdnMatchType::Wildcard, SHARED_VS, "app.foo.com", "*.foo.com"));
        assert!(!fqdn_matches(FqdnMatchType::Wildcard, SHARED_VS, "app.bar.com", "*.foo.com"));
        assert!(!fqdn_matches(FqdnMatchType::Wildcard, SHARED_VS, "app.foo.com", "foo.com"));
    }

    #[test]
    fn test_specificity_order() {
        let mut patterns = vec![
            "foo".to_string(),
            "b.foo".to_string(),
            "a.foo".to_string(),
            "app.foo".to_string(),
        ];
        sort_by_specificity(&mut patterns);
        assert_eq!(patterns, vec!["app.foo", "a.foo", "b.foo", "foo"]);
    }
}
