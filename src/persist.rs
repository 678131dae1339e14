//! Durable snapshot slots and seed sources
//!
//! A [`SnapshotSlot`] is a tiny key-value store holding the latest full
//! snapshot of the catalog. A [`SeedSource`] yields the bundled snapshot used
//! on a cold start, when no slot holds one yet.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use crate::storage::SqliteStore;
use crate::{Error, Result};

/// Durable key-value storage for serialized snapshots
pub trait SnapshotSlot: Send + Sync {
    /// Read the snapshot stored under `key`, if any
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the snapshot stored under `key`.
    ///
    /// Implementations must replace wholesale: after a failed or interrupted
    /// write the previous snapshot is still readable.
    fn store(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Read-only origin of the cold-start snapshot
pub trait SeedSource: Send + Sync {
    fn fetch(&self) -> Result<Vec<u8>>;

    /// Short description for logs
    fn describe(&self) -> String;
}

// ========== Snapshot Slots ==========

/// Stores each key as a file inside a data directory
#[derive(Debug, Clone)]
pub struct DirSnapshotSlot {
    dir: PathBuf,
}

impl DirSnapshotSlot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\']);
        if !valid {
            return Err(Error::InvalidInput(format!("Invalid snapshot key: {}", key)));
        }
        Ok(self.dir.join(key))
    }
}

impl SnapshotSlot for DirSnapshotSlot {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Persistence(format!("reading {}: {}", path.display(), e))),
        }
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        let persist_err = |e: std::io::Error| Error::Persistence(format!("writing {}: {}", path.display(), e));

        std::fs::create_dir_all(&self.dir).map_err(persist_err)?;

        // Stage next to the target so the final rename stays on one filesystem
        let mut staged = tempfile::NamedTempFile::new_in(&self.dir).map_err(persist_err)?;
        staged.write_all(bytes).map_err(persist_err)?;
        staged.as_file().sync_all().map_err(persist_err)?;
        staged.persist(&path).map_err(|e| persist_err(e.error))?;
        sync_dir(&self.dir).map_err(persist_err)?;
        Ok(())
    }
}

/// Flush directory metadata so a completed rename survives a crash
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Process-local slot, lost when dropped
#[derive(Debug, Default)]
pub struct MemorySnapshotSlot {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySnapshotSlot {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotSlot for MemorySnapshotSlot {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| Error::Persistence("snapshot slot lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Persistence("snapshot slot lock poisoned".to_string()))?;
        entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

// ========== Seed Sources ==========

/// Seed snapshot shipped as a SQLite file
#[derive(Debug, Clone)]
pub struct FileSeed {
    path: PathBuf,
}

impl FileSeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SeedSource for FileSeed {
    fn fetch(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path)
            .map_err(|e| Error::SeedUnavailable(format!("{}: {}", self.path.display(), e)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Seed snapshot already held in memory
#[derive(Debug, Clone)]
pub struct BytesSeed {
    bytes: Vec<u8>,
}

impl BytesSeed {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into() }
    }
}

impl SeedSource for BytesSeed {
    fn fetch(&self) -> Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }

    fn describe(&self) -> String {
        format!("{} in-memory bytes", self.bytes.len())
    }
}

/// Seeds an empty catalog
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySeed;

impl SeedSource for EmptySeed {
    fn fetch(&self) -> Result<Vec<u8>> {
        SqliteStore::create_empty()?.serialize()
    }

    fn describe(&self) -> String {
        "empty catalog".to_string()
    }
}
