//! Key/value persistence behind the gain table.
//!
//! The adaptation layer never touches the filesystem directly; it talks to a
//! [`KvStore`] and lets the backend decide where bytes live. [`FileStore`] is
//! the production backend (one file per key, atomic replace), [`MemoryStore`]
//! backs tests and the persistence-disabled configuration.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Key is empty or contains segments the store cannot map to a path
    #[error("Invalid store key: {key:?}")]
    InvalidKey {
        /// Offending key
        key: String,
    },

    /// Underlying filesystem failure
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        /// Source JSON error
        #[from]
        source: serde_json::Error,
    },
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Aggregate store size, reported at worker startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of stored values.
    pub entries: usize,
    /// Total payload bytes.
    pub bytes: u64,
}

/// Minimal key/value surface the adaptation layer persists through.
///
/// Keys are slash-separated paths (`"thermal/gains/A12_H2_S1"`). A store must
/// tolerate being empty (first boot) and must never let one unreadable value
/// block access to the others; interpreting the bytes is entirely the
/// caller's job.
pub trait KvStore: Send {
    /// Fetch a value; `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Insert or overwrite a value.
    fn put(&mut self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Delete a key; removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> StoreResult<()>;

    /// All keys starting with `prefix`, sorted.
    fn keys(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Entry count and payload size.
    fn stats(&self) -> StoreResult<StoreStats>;
}

/// Keys become relative paths, so they must be clean: non-empty segments of
/// `[A-Za-z0-9_.-]` that do not start with a dot (dot-prefixed names are
/// reserved for the file backend's temp files).
fn validate_key(key: &str) -> StoreResult<()> {
    let segment_ok = |seg: &str| {
        !seg.is_empty()
            && !seg.starts_with('.')
            && seg
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    };
    if key.is_empty() || !key.split('/').all(segment_ok) {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// In-process store backed by a `HashMap`.
///
/// Used by tests and as the backend when persistence is disabled in config;
/// learned gains then live exactly as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        Ok(StoreStats {
            entries: self.entries.len(),
            bytes: self.entries.values().map(|v| v.len() as u64).sum(),
        })
    }
}

/// One file per key under a root directory, with atomic replace on write.
///
/// A key's slash segments become directories, so `"thermal/gains/A12_H2_S1"`
/// lands at `<root>/thermal/gains/A12_H2_S1`. Writes go to a dot-prefixed
/// temp sibling first and are renamed into place, so a crash mid-write leaves
/// either the old value or the new one, never a torn file.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn walk(dir: &Path, rel: &str, out: &mut Vec<String>) -> StoreResult<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                // Not a name we wrote; ignore it.
                Err(_) => continue,
            };
            if name.starts_with('.') {
                continue;
            }
            let child_rel = if rel.is_empty() {
                name
            } else {
                format!("{rel}/{name}")
            };
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                Self::walk(&entry.path(), &child_rel, out)?;
            } else if file_type.is_file() {
                out.push(child_rel);
            }
        }
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.key_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&mut self, key: &str, value: &[u8]) -> StoreResult<()> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::InvalidKey {
                key: key.to_string(),
            })?;
        let tmp = path.with_file_name(format!(".{name}.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        Self::walk(&self.root, "", &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        let keys = self.keys("")?;
        let mut stats = StoreStats {
            entries: keys.len(),
            bytes: 0,
        };
        for key in &keys {
            // A file may vanish between the walk and here; skip it.
            if let Ok(meta) = fs::metadata(self.root.join(key)) {
                stats.bytes += meta.len();
            }
        }
        Ok(stats)
    }
}
