//! Load-balancer controller connection properties
//!
//! Holds credentials, so values never reach a log line; only key counts do.

use crate::store::RelationshipStore;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[derive(Clone)]
pub struct CtrlPropLister {
    props: RelationshipStore<String>,
}

impl CtrlPropLister {
    pub fn new() -> Self {
        Self {
            props: RelationshipStore::new("ctrl_prop"),
        }
    }

    /// Replace every property with `props`
    pub fn replace_all(&self, props: HashMap<String, String>) {
        let stale: Vec<String> = self
            .props
            .keys()
            .into_iter()
            .filter(|key| !props.contains_key(key))
            .collect();
        self.props.batch_delete(&stale);
        let count = props.len();
        for (key, value) in props {
            self.props.put(key, value);
        }
        debug!("CtrlPropLister: replaced properties ({} keys)", count);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.props.get(key)
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.props.snapshot()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}

impl Default for CtrlPropLister {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CtrlPropLister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CtrlPropLister")
            .field("keys", &self.props.len())
            .finish()
    }
}
