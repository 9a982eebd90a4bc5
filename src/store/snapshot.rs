use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{KeyValueStore, StoreError};
use crate::heatmap::{Grid, Snapshot};

/// Namespace for per-surface heat snapshots.
pub const SNAPSHOT_PREFIX: &str = "heatmapData_";

/// Heat snapshots (and small JSON side records) on top of a key-value store.
/// Last write wins; there is no versioning.
pub struct SnapshotStore<S> {
    backend: S,
}

impl<S: KeyValueStore> SnapshotStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    #[cfg(test)]
    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn key_for(page: &str) -> String {
        format!("{SNAPSHOT_PREFIX}{page}")
    }

    /// Overwrite the snapshot for `page`.
    pub fn save(&mut self, page: &str, grid: &Grid) -> Result<(), StoreError> {
        self.put_json(&Self::key_for(page), &grid.to_snapshot())
    }

    /// Snapshot for `page`, or `None` if absent or malformed.
    pub fn load(&self, page: &str) -> Option<Snapshot> {
        self.load_key(&Self::key_for(page))
    }

    /// Snapshot stored under a full key.
    pub fn load_key(&self, key: &str) -> Option<Snapshot> {
        self.get_json(key)
    }

    /// Every snapshot key in the namespace.
    pub fn list_keys(&self) -> BTreeSet<String> {
        self.backend
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(SNAPSHOT_PREFIX))
            .collect()
    }

    /// Sum snapshots cell-by-cell into a grid sized to the largest rows and
    /// columns among them. Unreadable entries are skipped; `None` when
    /// nothing was readable.
    pub fn aggregate<'a>(&self, keys: impl IntoIterator<Item = &'a String>) -> Option<Grid> {
        let snapshots: Vec<Snapshot> = keys.into_iter().filter_map(|k| self.load_key(k)).collect();
        if snapshots.is_empty() {
            return None;
        }

        let rows = snapshots.iter().map(Snapshot::rows).max().unwrap_or(0);
        let cols = snapshots.iter().map(Snapshot::cols).max().unwrap_or(0);
        let mut total = Grid::new(rows, cols);
        for snap in &snapshots {
            for (r, row) in snap.0.iter().enumerate() {
                for c in 0..row.len() {
                    if let Some(v) = snap.get(r, c) {
                        total.set(r, c, total.get(r, c) + v);
                    }
                }
            }
        }
        Some(total)
    }

    /// Serialize any record under `key`.
    pub fn put_json<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), StoreError> {
        let text = serde_json::to_string(value)?;
        self.backend.set(key, text)
    }

    /// Deserialize the record under `key`; malformed data is logged and
    /// reads as absent.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let text = self.backend.get(key)?;
        match serde_json::from_str(&text) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("Ignoring malformed store entry {key}: {e}");
                None
            }
        }
    }
}
