//! Named store registry.
//!
//! Applications that juggle several collections register each opened
//! [`Store`] under a name and look them up where needed. Purely explicit;
//! nothing here is process-global.

use crate::store::Store;
use docstore_core::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct StoreRegistry {
    stores: RwLock<HashMap<String, Store>>,
}

impl StoreRegistry {
    pub fn new() -> StoreRegistry {
        StoreRegistry::default()
    }

    /// Register a store under `name`, replacing any previous entry
    pub fn register(&self, name: impl Into<String>, store: Store) {
        self.stores.write().insert(name.into(), store);
    }

    /// Look up a registered store; stores are cheap clones of one handle
    pub fn get(&self, name: &str) -> Result<Store> {
        self.stores
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Backend(format!("no store registered as {name:?}")))
    }

    /// Drop a registration; `true` when an entry was removed
    pub fn unregister(&self, name: &str) -> bool {
        self.stores.write().remove(name).is_some()
    }

    /// Registered names, unordered
    pub fn names(&self) -> Vec<String> {
        self.stores.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use serde_json::json;

    #[test]
    fn register_get_unregister() {
        let registry = StoreRegistry::new();
        let store = Store::open(StoreConfig::in_memory()).unwrap();
        registry.register("tasks", store);

        let handle = registry.get("tasks").unwrap();
        handle.create("k1", json!({"n": 1}), None, false).unwrap();
        // both handles share the same collection
        assert_eq!(registry.get("tasks").unwrap().len().unwrap(), 1);

        assert!(registry.get("missing").is_err());
        assert!(registry.unregister("tasks"));
        assert!(!registry.unregister("tasks"));
        assert!(registry.names().is_empty());
    }
}
