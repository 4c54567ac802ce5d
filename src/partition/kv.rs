use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Result, SyncError};

/// Local durable key-value storage for partition blobs and small preferences.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Save (or overwrite) the value for `key`.
    fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove `key`. Returns true if it existed.
    fn remove(&self, key: &str) -> Result<bool>;

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-memory key-value store backed by `Arc<RwLock<HashMap>>`.
///
/// Clone-friendly (cloning shares the same underlying storage), which lets a
/// test reopen a `PartitionStore` over the same bytes.
#[derive(Clone, Default)]
pub struct InMemoryKeyValueStore {
    storage: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let storage = self
            .storage
            .read()
            .map_err(|_| SyncError::Storage("kv read lock poisoned".into()))?;
        Ok(storage.get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut storage = self
            .storage
            .write()
            .map_err(|_| SyncError::Storage("kv write lock poisoned".into()))?;
        storage.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut storage = self
            .storage
            .write()
            .map_err(|_| SyncError::Storage("kv write lock poisoned".into()))?;
        Ok(storage.remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let storage = self
            .storage
            .read()
            .map_err(|_| SyncError::Storage("kv read lock poisoned".into()))?;
        let mut keys: Vec<String> = storage
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let store = InMemoryKeyValueStore::new();
        store.set("a", vec![1, 2]).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(vec![1, 2]));
        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn prefix_listing() {
        let store = InMemoryKeyValueStore::new();
        store.set("binder:partition:b1", vec![]).unwrap();
        store.set("binder:partition:b2", vec![]).unwrap();
        store.set("binder:pref:game", vec![]).unwrap();
        assert_eq!(
            store.keys_with_prefix("binder:partition:").unwrap(),
            vec!["binder:partition:b1", "binder:partition:b2"]
        );
    }

    #[test]
    fn clone_shares_storage() {
        let store = InMemoryKeyValueStore::new();
        let clone = store.clone();
        store.set("k", vec![7]).unwrap();
        assert_eq!(clone.get("k").unwrap(), Some(vec![7]));
    }
}
