//! Lock-free per-store counters
//!
//! Counting happens on every lookup, so it uses relaxed atomics rather than
//! the prometheus registry. Formatting only happens when metrics are scraped.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free metrics for one [`RelationshipStore`](super::RelationshipStore)
#[derive(Debug, Default)]
pub struct StoreMetrics {
    /// Total get/contains calls
    lookups: AtomicU64,
    /// Lookups that found the key
    hits: AtomicU64,
    /// Total put/update calls that stored a value
    puts: AtomicU64,
    /// Keys actually removed
    deletes: AtomicU64,
}

impl StoreMetrics {
    /// Create new metrics (all counters at zero)
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a lookup operation
    #[inline(always)]
    pub fn record_lookup(&self, hit: bool) {
        // Relaxed ordering is fine for counters - we don't need synchronization
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline(always)]
    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_deletes(&self, removed: u64) {
        if removed > 0 {
            self.deletes.fetch_add(removed, Ordering::Relaxed);
        }
    }

    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.lookups();
        if lookups == 0 {
            return 0.0;
        }
        self.hits() as f64 / lookups as f64
    }

    /// Snapshot the counters as one sample row
    pub fn sample(&self, store: &str, size: usize) -> StoreSample {
        StoreSample {
            store: store.to_string(),
            lookups: self.lookups(),
            hits: self.hits(),
            puts: self.puts(),
            deletes: self.deletes(),
            size: size as u64,
        }
    }

    /// Format metrics in Prometheus exposition format
    ///
    /// Only called on scrape - not on hot path!
    pub fn to_prometheus(&self, store: &str, size: usize) -> String {
        render_prometheus(&[self.sample(store, size)])
    }
}

// =============================================================================
// Exposition
// =============================================================================

/// Counter values of one named store at scrape time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSample {
    pub store: String,
    pub lookups: u64,
    pub hits: u64,
    pub puts: u64,
    pub deletes: u64,
    pub size: u64,
}

type Family = (&'static str, &'static str, &'static str, fn(&StoreSample) -> u64);

const FAMILIES: [Family; 5] = [
    (
        "relationship_store_lookups_total",
        "Total relationship store lookups",
        "counter",
        |s| s.lookups,
    ),
    (
        "relationship_store_hits_total",
        "Relationship store lookups that found the key",
        "counter",
        |s| s.hits,
    ),
    (
        "relationship_store_puts_total",
        "Total relationship store writes",
        "counter",
        |s| s.puts,
    ),
    (
        "relationship_store_deletes_total",
        "Keys removed from a relationship store",
        "counter",
        |s| s.deletes,
    ),
    (
        "relationship_store_size",
        "Current number of keys in a relationship store",
        "gauge",
        |s| s.size,
    ),
];

/// Render samples of many stores as one exposition block
///
/// Each family gets a single HELP/TYPE pair followed by one line per
/// store. Every line, the last included, ends in a newline.
pub fn render_prometheus(samples: &[StoreSample]) -> String {
    let mut output = String::new();
    for (name, help, kind, value) in FAMILIES {
        output.push_str(&format!("# HELP {} {}\n# TYPE {} {}\n", name, help, name, kind));
        for sample in samples {
            output.push_str(&format!(
                "{}{{store=\"{}\"}} {}\n",
                name,
                sample.store,
                value(sample)
            ));
        }
    }
    output
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let metrics = StoreMetrics::new();
        assert_eq!(metrics.hit_rate(), 0.0);

        metrics.record_lookup(true);
        assert!((metrics.hit_rate() - 1.0).abs() < 0.001);

        metrics.record_lookup(false);
        assert!((metrics.hit_rate() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_zero_deletes_not_counted() {
        let metrics = StoreMetrics::new();
        metrics.record_deletes(0);
        metrics.record_deletes(3);
        assert_eq!(metrics.deletes(), 3);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = StoreMetrics::new();
        metrics.record_put();
        let text = metrics.to_prometheus("fqdn_hostrule", 1);

        assert!(text.contains("relationship_store_puts_total{store=\"fqdn_hostrule\"} 1"));
        assert!(text.contains("relationship_store_size{store=\"fqdn_hostrule\"} 1"));
        assert!(text.contains("# TYPE relationship_store_size gauge"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_render_emits_each_family_once() {
        let a = StoreMetrics::new();
        let b = StoreMetrics::new();
        a.record_lookup(true);
        b.record_deletes(2);

        let text = render_prometheus(&[a.sample("a", 1), b.sample("b", 0)]);
        assert_eq!(text.matches("# HELP relationship_store_lookups_total ").count(), 1);
        assert_eq!(text.matches("# TYPE relationship_store_size gauge").count(), 1);
        assert!(text.contains("relationship_store_hits_total{store=\"a\"} 1\n"));
        assert!(text.contains("relationship_store_deletes_total{store=\"b\"} 2\n"));
        assert_eq!(text.lines().count(), 5 * 4);
    }

    #[test]
    fn test_render_without_samples_keeps_headers() {
        let text = render_prometheus(&[]);
        assert_eq!(text.lines().filter(|l| l.starts_with("# HELP")).count(), 5);
        assert!(text.lines().all(|l| l.starts_with('#')));
    }
}
