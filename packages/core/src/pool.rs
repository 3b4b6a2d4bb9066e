//! Storage pool membership boundary.
//!
//! The replication pool itself lives outside this subsystem; this module only
//! records which mounted paths participate and with what free-space floor.
//! Nothing here interprets pool accounting.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::{PoolReadSnafu, PoolWriteSnafu, Result};

/// A mounted path registered as a pool member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolPartition {
    /// Mounted path participating in the pool.
    pub path: PathBuf,
    /// Free space floor (GB) below which the replicator stops placing data.
    pub minimum_free_gb: u64,
}

/// Membership records: created after a successful mount when the caller
/// elects to pool the device, destroyed on unmount.
pub trait PoolStore {
    /// Registers a mounted path, replacing any existing record for it.
    fn create(&mut self, path: &Path, minimum_free_gb: u64) -> Result<()>;

    /// Removes the record for a path. Removing an absent path is a no-op.
    fn destroy(&mut self, path: &Path) -> Result<()>;

    /// Lists current members.
    fn list(&self) -> Result<Vec<PoolPartition>>;
}

/// Pool membership persisted as a JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonPoolStore {
    path: PathBuf,
}

impl JsonPoolStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<Vec<PoolPartition>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).context(PoolReadSnafu { path: &self.path })?;
        serde_json::from_str(&content).map_err(|e| crate::error::Error::PoolRead {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })
    }

    fn store(&self, members: &[PoolPartition]) -> Result<()> {
        let content = serde_json::to_string_pretty(members)
            .map_err(|e| crate::error::Error::PoolWrite {
                path: self.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            })?;
        fs::write(&self.path, content).context(PoolWriteSnafu { path: &self.path })
    }
}

impl PoolStore for JsonPoolStore {
    fn create(&mut self, path: &Path, minimum_free_gb: u64) -> Result<()> {
        let mut members = self.load()?;
        members.retain(|m| m.path != path);
        members.push(PoolPartition {
            path: path.to_path_buf(),
            minimum_free_gb,
        });
        self.store(&members)
    }

    fn destroy(&mut self, path: &Path) -> Result<()> {
        let mut members = self.load()?;
        let before = members.len();
        members.retain(|m| m.path != path);

        if members.len() != before {
            self.store(&members)?;
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<PoolPartition>> {
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> JsonPoolStore {
        JsonPoolStore::new(dir.join("pool.json"))
    }

    #[test]
    fn test_empty_store_lists_nothing() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_create_and_list() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());

        store.create(Path::new("/mnt/storage-1"), 10).unwrap();
        store.create(Path::new("/mnt/storage-2"), 25).unwrap();

        let members = store.list().unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].path, PathBuf::from("/mnt/storage-1"));
        assert_eq!(members[1].minimum_free_gb, 25);
    }

    #[test]
    fn test_create_replaces_existing_record() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());

        store.create(Path::new("/mnt/storage-1"), 10).unwrap();
        store.create(Path::new("/mnt/storage-1"), 50).unwrap();

        let members = store.list().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].minimum_free_gb, 50);
    }

    #[test]
    fn test_destroy() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());

        store.create(Path::new("/mnt/storage-1"), 10).unwrap();
        store.destroy(Path::new("/mnt/storage-1")).unwrap();
        assert!(store.list().unwrap().is_empty());

        // Absent path is a no-op, not an error.
        store.destroy(Path::new("/mnt/storage-9")).unwrap();
    }
}
