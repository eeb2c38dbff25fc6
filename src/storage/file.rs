//! File-backed key-value store
//!
//! Persists all entries as a single JSON object on disk, rewritten on every
//! mutation. The document is small (a handful of short strings) so a full
//! rewrite per write keeps the on-disk state trivially consistent.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::KeyValueStore;

/// Key-value store persisted to a single JSON file
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // In-process writer exclusion; the file itself is the durable copy.
    lock: Mutex<()>,
}

impl FileStore {
    /// Open a file store at `path`, creating parent directories as needed.
    ///
    /// The file itself is created lazily on the first write; a missing file
    /// reads as an empty store.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create storage directory '{}'", parent.display())
                })?;
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read storage file '{}'", self.path.display()))?;

        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse storage file '{}'", self.path.display()))
    }

    fn write_entries(&self, entries: &HashMap<String, String>) -> Result<()> {
        let json =
            serde_json::to_string_pretty(entries).context("Failed to serialize storage entries")?;

        // Write to a sibling file and rename over the target: rename is
        // atomic on the same filesystem, so a crash mid-write can never
        // truncate the stored tokens.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write storage file '{}'", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| {
            format!("Failed to replace storage file '{}'", self.path.display())
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read_entries()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read_entries()?;
        if entries.remove(key).is_some() {
            self.write_entries(&entries)?;
        }
        Ok(())
    }
}
