// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable key/value client storage.
//!
//! The session store persists a handful of string entries under fixed keys.
//! Writes are applied as a batch so a token and its principal land together.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// One pending write: `Some(value)` sets the key, `None` removes it.
pub type Entry<'a> = (&'a str, Option<&'a str>);

/// Backing storage for persisted session state.
pub trait KeyValueStore: Send + Sync {
    /// Read every stored entry.
    fn load(&self) -> anyhow::Result<HashMap<String, String>>;

    /// Apply all entries or none of them.
    fn write_batch(&self, batch: &[Entry<'_>]) -> anyhow::Result<()>;
}

/// In-process store, used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<K: Into<String>, V: Into<String>>(
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { entries: RwLock::new(map) }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self) -> anyhow::Result<HashMap<String, String>> {
        Ok(self.snapshot())
    }

    fn write_batch(&self, batch: &[Entry<'_>]) -> anyhow::Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut entries, batch);
        Ok(())
    }
}

/// JSON file store; every batch replaces the file through a rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn load(&self) -> anyhow::Result<HashMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_batch(&self, batch: &[Entry<'_>]) -> anyhow::Result<()> {
        let mut entries = self.load()?;
        apply(&mut entries, batch);
        save_atomic(&self.path, &entries)
    }
}

fn apply(entries: &mut HashMap<String, String>, batch: &[Entry<'_>]) {
    for (key, value) in batch {
        match value {
            Some(v) => {
                entries.insert((*key).to_owned(), (*v).to_owned());
            }
            None => {
                entries.remove(*key);
            }
        }
    }
}

/// Write the whole map to `path` in one step: serialize into a sibling file,
/// then rename it over the target. Each call gets its own sibling name, so
/// concurrent writers in this process or another never clobber each
/// other's half-written file.
fn save_atomic(path: &Path, entries: &HashMap<String, String>) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static WRITES: AtomicU32 = AtomicU32::new(0);

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let staging = path.with_file_name(format!(
        ".{file_name}.{}-{}",
        std::process::id(),
        WRITES.fetch_add(1, Ordering::Relaxed),
    ));
    std::fs::write(&staging, serde_json::to_vec_pretty(entries)?)?;
    std::fs::rename(&staging, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
