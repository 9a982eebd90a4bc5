use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{KeyValueStore, StoreError};

/// Key-value store backed by a single JSON object file.
///
/// The whole map is rewritten on every `set` via a temp file + rename, so a
/// crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file is an empty store. A corrupt file is moved aside to
    /// `<name>.corrupt` (never overwritten) and the store starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let entries = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(map) => map,
                Err(e) => {
                    let aside = quarantine_path(&path);
                    fs::rename(&path, &aside)?;
                    log::warn!(
                        "Store file {} is unreadable ({e}); moved to {}, starting empty",
                        path.display(),
                        aside.display()
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        log::info!("Opened store {} ({} keys)", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    fn write_out(&self) -> Result<(), StoreError> {
        let text = serde_json::to_string(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// First free `<path>.corrupt`, `<path>.corrupt.1`, ... so earlier
/// quarantined copies survive.
fn quarantine_path(path: &Path) -> PathBuf {
    let with_suffix = |suffix: &str| {
        let mut name: OsString = path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    };
    let mut candidate = with_suffix(".corrupt");
    let mut n = 1;
    while candidate.exists() {
        candidate = with_suffix(&format!(".corrupt.{n}"));
        n += 1;
    }
    candidate
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_owned(), value);
        self.write_out()
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let mut s = JsonFileStore::open(&path).unwrap();
        assert!(s.keys().is_empty());
        s.set("heatmapData_/a", "[[1.0]]".into()).unwrap();
        s.set("other", "x".into()).unwrap();

        let s = JsonFileStore::open(&path).unwrap();
        assert_eq!(s.get("heatmapData_/a").as_deref(), Some("[[1.0]]"));
        assert_eq!(s.keys().len(), 2);
    }

    #[test]
    fn corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{not json").unwrap();

        let mut s = JsonFileStore::open(&path).unwrap();
        assert!(s.keys().is_empty());
        s.set("k", "v".into()).unwrap();

        let s = JsonFileStore::open(&path).unwrap();
        assert_eq!(s.get("k").as_deref(), Some("v"));
        let aside = dir.path().join("store.json.corrupt");
        assert_eq!(fs::read_to_string(aside).unwrap(), "{not json");
    }

    #[test]
    fn truncated_write_keeps_other_pages_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut s = JsonFileStore::open(&path).unwrap();
        s.set("heatmapData_/a", "[[1.0]]".into()).unwrap();
        s.set("heatmapData_/b", "[[2.0]]".into()).unwrap();
        let full = fs::read_to_string(&path).unwrap();
        fs::write(&path, &full[..full.len() - 1]).unwrap();

        let mut s = JsonFileStore::open(&path).unwrap();
        s.set("heatmapData_/c", "[[3.0]]".into()).unwrap();
        drop(s);

        let aside = fs::read_to_string(dir.path().join("store.json.corrupt")).unwrap();
        assert!(aside.contains("heatmapData_/a"));
        assert!(aside.contains("heatmapData_/b"));
        let s = JsonFileStore::open(&path).unwrap();
        assert_eq!(s.keys(), vec!["heatmapData_/c".to_string()]);
    }

    #[test]
    fn second_corruption_does_not_clobber_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        fs::write(&path, "first").unwrap();
        JsonFileStore::open(&path).unwrap();
        fs::write(&path, "second").unwrap();
        JsonFileStore::open(&path).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("store.json.corrupt")).unwrap(), "first");
        assert_eq!(fs::read_to_string(dir.path().join("store.json.corrupt.1")).unwrap(), "second");
    }
}
