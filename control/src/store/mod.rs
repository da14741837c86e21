//! Relationship-store framework
//!
//! Thread-safe building blocks reused by every domain lister:
//!
//! - [`RelationshipStore`]: string key → typed value cache
//! - [`NamespaceContainer`]: namespace → [`RelationshipStore`], created lazily
//! - [`BidirectionalIndex`]: 1:1 mapping kept consistent in both directions
//! - [`SetIndex`]: 1:N mapping (set key → members, member → set key)
//!
//! Every store owns a `RwLock`; indexes that touch two stores add a coarse
//! lock on top so a multi-store update is never observed half-applied.

mod bidirectional;
mod metrics;
mod relationship;

pub use bidirectional::{BidirectionalIndex, SetIndex};
pub use metrics::{render_prometheus, StoreMetrics, StoreSample};
pub use relationship::{NamespaceContainer, RelationshipStore};

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Safe RwLock read helper that recovers from poisoning
#[inline]
pub(crate) fn safe_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned during read, recovering (data is still valid)");
        poisoned.into_inner()
    })
}

/// Safe RwLock write helper that recovers from poisoning
#[inline]
pub(crate) fn safe_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned during write, recovering (data is still valid)");
        poisoned.into_inner()
    })
}
