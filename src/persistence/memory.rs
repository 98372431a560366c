//! In-memory cache backend.

use crate::error::{LdictError, Result};
use crate::persistence::Cache;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Cache held in process memory.
///
/// Values are stored as `Arc<[u8]>` so sharing one `MemoryCache` between
/// many containers costs a refcount per read, not a copy of the map.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Total bytes stored across all entries.
    pub fn byte_count(&self) -> usize {
        self.entries
            .read()
            .map(|m| m.values().map(|v| v.len()).sum())
            .unwrap_or(0)
    }
}

fn poisoned() -> LdictError {
    LdictError::Cache("memory cache lock poisoned".into())
}

impl Cache for MemoryCache {
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().map_err(|_| poisoned())?.contains_key(key))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).map(|v| v.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), Arc::from(value));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(entries.remove(key).is_some())
    }

    fn describe(&self) -> String {
        format!("memory({} entries)", self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let cache = MemoryCache::new();
        assert!(!cache.contains("k").unwrap());
        cache.set("k", b"value").unwrap();
        assert!(cache.contains("k").unwrap());
        assert_eq!(cache.get("k").unwrap().as_deref(), Some(&b"value"[..]));
        assert_eq!(cache.byte_count(), 5);
        assert!(cache.delete("k").unwrap());
        assert!(!cache.delete("k").unwrap());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_keys_sorted() {
        let cache = MemoryCache::new();
        cache.set("b", b"2").unwrap();
        cache.set("a", b"1").unwrap();
        assert_eq!(cache.keys(), vec!["a".to_string(), "b".to_string()]);
    }
}
