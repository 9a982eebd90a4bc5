//! Durable keyed storage for heatmap snapshots and settings.

pub mod debounce;
pub mod file;
pub mod snapshot;

use std::collections::BTreeMap;

pub use debounce::WriteDebouncer;
pub use file::JsonFileStore;
pub use snapshot::SnapshotStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// String key-value capability the snapshot layer persists through.
/// Values are opaque to the store.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;
    fn keys(&self) -> Vec<String>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn keys(&self) -> Vec<String> {
        (**self).keys()
    }
}

/// In-process store. Used with `--memory-store`, as the fallback when the
/// file store cannot be opened, and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_overwrites() {
        let mut s = MemoryStore::new();
        s.set("a", "1".into()).unwrap();
        s.set("a", "2".into()).unwrap();
        assert_eq!(s.get("a").as_deref(), Some("2"));
        assert_eq!(s.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn boxed_store_delegates() {
        let mut s: Box<dyn KeyValueStore> = Box::new(MemoryStore::new());
        s.set("k", "v".into()).unwrap();
        assert_eq!(s.get("k").as_deref(), Some("v"));
        assert!(s.get("missing").is_none());
    }
}
