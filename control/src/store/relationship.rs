//! RelationshipStore - typed, thread-safe key → value cache
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    RelationshipStore<V>                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Data (Arc<RwLock<HashMap>>)      │  Metrics (Atomics)           │
//! │  ┌────────────────────────────┐   │  ┌────────────────────────┐  │
//! │  │ key → V                    │   │  │ lookups / hits         │  │
//! │  │ readers share, writers     │   │  │ puts / deletes         │  │
//! │  │ exclusive                  │   │  └────────────────────────┘  │
//! │  └────────────────────────────┘   │                              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cloning a store hands out another handle to the same map. Missing keys
//! are `None`/`false`, never errors.

use super::metrics::{StoreMetrics, StoreSample};
use super::{safe_read, safe_write};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Thread-safe string-keyed cache holding one value type
pub struct RelationshipStore<V> {
    /// Store name, used for metrics labels and logs
    name: Arc<str>,
    inner: Arc<RwLock<HashMap<String, V>>>,
    /// Lock-free metrics (shared across clones)
    metrics: Arc<StoreMetrics>,
}

impl<V> RelationshipStore<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            inner: Arc::new(RwLock::new(HashMap::new())),
            metrics: Arc::new(StoreMetrics::new()),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unconditional upsert; an existing value is replaced silently
    pub fn put(&self, key: impl Into<String>, value: V) {
        let mut inner = safe_write(&self.inner);
        inner.insert(key.into(), value);
        self.metrics.record_put();
    }

    /// Remove a key
    ///
    /// Returns `true` if the key was present.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = safe_write(&self.inner);
        let was_present = inner.remove(key).is_some();
        self.metrics.record_deletes(u64::from(was_present));
        was_present
    }

    /// Remove every key in `keys` under a single write lock
    ///
    /// Returns the number of keys that were actually present.
    pub fn batch_delete<K: AsRef<str>>(&self, keys: &[K]) -> usize {
        let mut inner = safe_write(&self.inner);
        let removed = keys
            .iter()
            .filter(|key| inner.remove(key.as_ref()).is_some())
            .count();
        self.metrics.record_deletes(removed as u64);
        if removed > 0 {
            debug!(
                "{}: batch removed {} of {} keys (total: {})",
                self.name,
                removed,
                keys.len(),
                inner.len()
            );
        }
        removed
    }

    /// Read-modify-write a single key under one exclusive lock
    ///
    /// `f` sees the current value (if any). Returning `Some` stores the new
    /// value, returning `None` removes the key. Returns whether the key holds
    /// a value afterwards.
    pub fn update<F>(&self, key: &str, f: F) -> bool
    where
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        let mut inner = safe_write(&self.inner);
        match f(inner.get(key)) {
            Some(value) => {
                inner.insert(key.to_string(), value);
                self.metrics.record_put();
                true
            }
            None => {
                let removed = inner.remove(key).is_some();
                self.metrics.record_deletes(u64::from(removed));
                false
            }
        }
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        let inner = safe_read(&self.inner);
        let hit = inner.contains_key(key);
        self.metrics.record_lookup(hit);
        hit
    }

    /// Point-in-time copy of all keys (unordered)
    pub fn keys(&self) -> Vec<String> {
        let inner = safe_read(&self.inner);
        inner.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        safe_read(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` against the map under the shared lock
    ///
    /// For scans that only need a derived result and should not clone
    /// every value.
    pub fn with_read<R>(&self, f: impl FnOnce(&HashMap<String, V>) -> R) -> R {
        let inner = safe_read(&self.inner);
        f(&inner)
    }

    /// Get metrics reference (for testing/debugging)
    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Append this store's sample row for a combined scrape
    pub fn collect_metrics(&self, out: &mut Vec<StoreSample>) {
        out.push(self.metrics.sample(&self.name, self.len()));
    }

    /// Format metrics in Prometheus exposition format
    pub fn prometheus_metrics(&self) -> String {
        self.metrics.to_prometheus(&self.name, self.len())
    }
}

impl<V: Clone> RelationshipStore<V> {
    /// Look up a key; `None` when absent
    pub fn get(&self, key: &str) -> Option<V> {
        let inner = safe_read(&self.inner);
        let value = inner.get(key).cloned();
        self.metrics.record_lookup(value.is_some());
        value
    }

    /// Point-in-time copy of the whole map
    ///
    /// Returns a snapshot - modifications after the call won't be seen.
    pub fn snapshot(&self) -> HashMap<String, V> {
        safe_read(&self.inner).clone()
    }

    pub fn values(&self) -> Vec<V> {
        safe_read(&self.inner).values().cloned().collect()
    }

    /// Return the value under `key`, inserting `f()` first if absent
    pub fn get_or_insert_with(&self, key: &str, f: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(key) {
            return value;
        }
        let mut inner = safe_write(&self.inner);
        // Another writer may have won the race between the two locks
        if let Some(value) = inner.get(key) {
            return value.clone();
        }
        let value = f();
        inner.insert(key.to_string(), value.clone());
        self.metrics.record_put();
        value
    }
}

impl<T: PartialEq> RelationshipStore<Vec<T>> {
    /// Append `item` to the list under `key` unless already present
    ///
    /// Creates the list on first use. Returns `true` if the item was added.
    pub fn append_unique(&self, key: &str, item: T) -> bool {
        let mut inner = safe_write(&self.inner);
        let list = inner.entry(key.to_string()).or_default();
        if list.contains(&item) {
            return false;
        }
        list.push(item);
        self.metrics.record_put();
        true
    }

    /// Remove `item` from the list under `key`
    ///
    /// The key is dropped entirely once its list is empty. Returns `true` if
    /// the item was present.
    pub fn remove_item(&self, key: &str, item: &T) -> bool {
        let mut inner = safe_write(&self.inner);
        let Some(list) = inner.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|existing| existing != item);
        let removed = list.len() != before;
        if list.is_empty() {
            inner.remove(key);
            self.metrics.record_deletes(1);
        }
        removed
    }
}

// Implement Clone to share the same underlying data
impl<V> Clone for RelationshipStore<V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            inner: Arc::clone(&self.inner),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<V> fmt::Debug for RelationshipStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationshipStore")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}

impl<V> fmt::Display for RelationshipStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.len();
        if count == 0 {
            write!(f, "RelationshipStore({}): empty", self.name)
        } else {
            write!(f, "RelationshipStore({}): {} key(s)", self.name, count)
        }
    }
}

// =============================================================================
// NamespaceContainer
// =============================================================================

/// Namespace → [`RelationshipStore`] map
///
/// Per-namespace stores are created on first access and only removed by an
/// explicit [`delete_namespace`](Self::delete_namespace).
pub struct NamespaceContainer<V> {
    name: Arc<str>,
    namespaces: Arc<RwLock<HashMap<String, RelationshipStore<V>>>>,
}

impl<V> NamespaceContainer<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            namespaces: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the store for `namespace`, creating it if needed
    ///
    /// Idempotent: every call for the same namespace returns a handle to the
    /// same store until the namespace is deleted.
    pub fn get_or_create(&self, namespace: &str) -> RelationshipStore<V> {
        if let Some(store) = safe_read(&self.namespaces).get(namespace) {
            return store.clone();
        }
        let mut namespaces = safe_write(&self.namespaces);
        namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| RelationshipStore::new(format!("{}/{}", self.name, namespace)))
            .clone()
    }

    /// Get the store for `namespace` without creating it
    pub fn get(&self, namespace: &str) -> Option<RelationshipStore<V>> {
        safe_read(&self.namespaces).get(namespace).cloned()
    }

    /// Drop a namespace's whole store
    ///
    /// Handles obtained earlier keep pointing at the detached store; writes
    /// through them are no longer visible from this container.
    pub fn delete_namespace(&self, namespace: &str) -> bool {
        let removed = safe_write(&self.namespaces).remove(namespace).is_some();
        if removed {
            info!("{}: deleted namespace store {}", self.name, namespace);
        }
        removed
    }

    pub fn namespaces(&self) -> Vec<String> {
        safe_read(&self.namespaces).keys().cloned().collect()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<V> Clone for NamespaceContainer<V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            namespaces: Arc::clone(&self.namespaces),
        }
    }
}

impl<V> fmt::Debug for NamespaceContainer<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceContainer")
            .field("name", &self.name)
            .field("namespaces", &self.namespaces())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let store: RelationshipStore<String> = RelationshipStore::new("test");

        assert_eq!(store.get("foo.com"), None);
        store.put("foo.com", "hr1".to_string());
        assert_eq!(store.get("foo.com"), Some("hr1".to_string()));

        // Put replaces silently
        store.put("foo.com", "hr2".to_string());
        assert_eq!(store.get("foo.com"), Some("hr2".to_string()));
        assert_eq!(store.len(), 1);

        assert!(store.delete("foo.com"));
        assert!(!store.delete("foo.com"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store: RelationshipStore<u32> = RelationshipStore::new("test");
        store.put("a", 1);
        let snapshot = store.snapshot();
        store.put("b", 2);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_batch_delete_counts_present_keys() {
        let store: RelationshipStore<u32> = RelationshipStore::new("test");
        store.put("a", 1);
        store.put("b", 2);
        store.put("c", 3);

        assert_eq!(store.batch_delete(&["a", "c", "missing"]), 2);
        assert_eq!(store.keys(), vec!["b".to_string()]);
        assert_eq!(store.metrics().deletes(), 2);
    }

    #[test]
    fn test_update_inserts_and_removes() {
        let store: RelationshipStore<u32> = RelationshipStore::new("test");

        assert!(store.update("count", |current| Some(current.copied().unwrap_or(0) + 1)));
        assert!(store.update("count", |current| Some(current.copied().unwrap_or(0) + 1)));
        assert_eq!(store.get("count"), Some(2));

        assert!(!store.update("count", |_| None));
        assert_eq!(store.get("count"), None);
    }

    #[test]
    fn test_append_unique_and_remove_item() {
        let store: RelationshipStore<Vec<String>> = RelationshipStore::new("test");

        assert!(store.append_unique("class", "ns/gw1".to_string()));
        assert!(!store.append_unique("class", "ns/gw1".to_string()));
        assert!(store.append_unique("class", "ns/gw2".to_string()));
        assert_eq!(store.get("class").unwrap().len(), 2);

        assert!(store.remove_item("class", &"ns/gw1".to_string()));
        assert!(!store.remove_item("class", &"ns/gw1".to_string()));

        // Last member removed drops the key entirely
        assert!(store.remove_item("class", &"ns/gw2".to_string()));
        assert!(!store.contains("class"));
    }

    #[test]
    fn test_clone_shares_state_and_metrics() {
        let store1: RelationshipStore<u32> = RelationshipStore::new("test");
        let store2 = store1.clone();

        store1.put("a", 1);
        assert_eq!(store2.get("a"), Some(1));
        assert_eq!(store1.metrics().lookups(), 1);
        assert_eq!(store1.metrics().hits(), 1);
    }

    #[test]
    fn test_display() {
        let store: RelationshipStore<u32> = RelationshipStore::new("vip");
        assert_eq!(format!("{}", store), "RelationshipStore(vip): empty");
        store.put("a", 1);
        assert_eq!(format!("{}", store), "RelationshipStore(vip): 1 key(s)");
    }

    #[test]
    fn test_namespace_container_lazy_and_idempotent() {
        let container: NamespaceContainer<String> = NamespaceContainer::new("svc_ing");
        assert!(container.get("default").is_none());

        let first = container.get_or_create("default");
        first.put("svc1", "ing1".to_string());

        let second = container.get_or_create("default");
        assert_eq!(second.get("svc1"), Some("ing1".to_string()));
        assert_eq!(second.name(), "svc_ing/default");
        assert_eq!(container.namespaces(), vec!["default".to_string()]);
    }

    #[test]
    fn test_namespace_isolation() {
        let container: NamespaceContainer<String> = NamespaceContainer::new("svc_ing");
        container.get_or_create("a").put("svc", "ing-a".to_string());
        container.get_or_create("b").put("svc", "ing-b".to_string());

        assert_eq!(container.get_or_create("a").get("svc"), Some("ing-a".to_string()));
        assert_eq!(container.get_or_create("b").get("svc"), Some("ing-b".to_string()));
    }

    #[test]
    fn test_delete_namespace() {
        let container: NamespaceContainer<String> = NamespaceContainer::new("svc_ing");
        container.get_or_create("default").put("svc1", "ing1".to_string());

        assert!(container.delete_namespace("default"));
        assert!(!container.delete_namespace("default"));

        // Recreated lazily, empty
        assert!(container.get_or_create("default").is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let store: RelationshipStore<usize> = RelationshipStore::new("test");

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    store.put(format!("key-{}", i), i);
                    for j in 0..10 {
                        let _ = store.get(&format!("key-{}", j));
                    }
                    store.delete(&format!("key-{}", i));
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Thread should not panic");
        }

        assert!(store.is_empty());
        assert_eq!(store.metrics().puts(), 10);
        assert_eq!(store.metrics().deletes(), 10);
    }
}
