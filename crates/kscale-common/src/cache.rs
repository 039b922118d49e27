//! Result caches for persisting scale-run measurements
//!
//! Timing data produced by a scale run is written under caller-chosen keys so
//! a later step (a report, a comparison against a previous run) can read it
//! back. Two stores are provided: an in-memory map and a directory of JSON
//! files, one per key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;

use crate::{Error, Result};

/// Key/value sink for scale-run results
pub trait ResultCache: Send + Sync {
    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Read a previously stored value
    fn get(&self, key: &str) -> Result<Option<Value>>;
}

/// In-memory result cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// All keys currently stored, sorted
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ResultCache for MemoryCache {
    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().get(key).cloned())
    }
}

/// Directory-backed result cache storing one pretty-printed JSON file per key
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    dir: PathBuf,
}

impl JsonFileCache {
    /// Open (creating if needed) a cache rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::cache(
                dir.display().to_string(),
                format!("failed to create cache directory: {}", e),
            )
        })?;
        Ok(Self { dir })
    }

    /// Directory the cache writes into
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(Error::cache(key, "key must be a plain file name"));
        }
        Ok(self.dir.join(key))
    }
}

impl ResultCache for JsonFileCache {
    fn set(&self, key: &str, value: Value) -> Result<()> {
        let path = self.path_for(key)?;
        let data = serde_json::to_string_pretty(&value)?;
        std::fs::write(&path, data)
            .map_err(|e| Error::cache(key, format!("failed to write {}: {}", path.display(), e)))
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .map_err(|e| Error::cache(key, format!("failed to read {}: {}", path.display(), e)))?;
        Ok(Some(serde_json::from_str(&data)?))
    }
}
