//! Read-only content preview of a partition.
//!
//! Summarizes the top level of a mounted filesystem: files report their own
//! size, directories report aggregate size and recursive file count. Nothing
//! deeper than one level is exposed.
//!
//! For partitions that are not mounted, [`EphemeralMount`] provides the
//! throwaway mount used to look inside: its `Drop` always attempts one
//! unmount and one directory removal, whether or not summarization succeeded.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::error::{IoResultExt, Result};
use crate::executor::Executor;

/// Kind of a top-level entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Summary of one top-level entry.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Own size for files, aggregate size for directories (bytes).
    pub size: u64,
    /// Recursive file count, directories only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<u64>,
}

/// Content summary of a partition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreviewReport {
    pub entries: Vec<PreviewEntry>,
    /// Total bytes used across all entries.
    pub total_used: u64,
    /// Total files across all entries.
    pub file_count: u64,
}

/// Summarizes the top level of a directory.
pub fn summarize_directory(path: &Path) -> Result<PreviewReport> {
    let mut entries = Vec::new();
    let mut total_used = 0u64;
    let mut total_files = 0u64;

    for entry in fs::read_dir(path).dir_read_context(path)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %path.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy().to_string();
        let Ok(file_type) = entry.file_type() else {
            warn!(entry = %name, "skipping entry with unreadable type");
            continue;
        };

        if file_type.is_dir() {
            let (size, files) = walk_directory(&entry.path());
            total_used += size;
            total_files += files;
            entries.push(PreviewEntry {
                name,
                kind: EntryKind::Directory,
                size,
                file_count: Some(files),
            });
        } else {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            total_used += size;
            total_files += 1;
            entries.push(PreviewEntry {
                name,
                kind: EntryKind::File,
                size,
                file_count: None,
            });
        }
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(PreviewReport {
        entries,
        total_used,
        file_count: total_files,
    })
}

/// Recursively totals size and file count under a directory.
///
/// Unreadable subtrees contribute nothing rather than failing the preview.
fn walk_directory(path: &Path) -> (u64, u64) {
    let Ok(read) = fs::read_dir(path) else {
        warn!(dir = %path.display(), "skipping unreadable subtree");
        return (0, 0);
    };

    let mut size = 0u64;
    let mut files = 0u64;
    for entry in read.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            let (s, f) = walk_directory(&entry.path());
            size += s;
            files += f;
        } else {
            size += entry.metadata().map(|m| m.len()).unwrap_or(0);
            files += 1;
        }
    }
    (size, files)
}

/// A throwaway mount that is always torn down.
///
/// Construct after creating the target directory; on drop it attempts exactly
/// one unmount and one directory removal through the executor, swallowing
/// failures of either.
pub struct EphemeralMount<'a, E: Executor> {
    executor: &'a E,
    dir: PathBuf,
}

impl<'a, E: Executor> EphemeralMount<'a, E> {
    pub fn new(executor: &'a E, dir: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            dir: dir.into(),
        }
    }

    /// The directory this mount owns.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl<E: Executor> Drop for EphemeralMount<'_, E> {
    fn drop(&mut self) {
        let dir = self.dir.to_string_lossy();
        if !self.executor.run("umount", &[&dir]) {
            warn!(dir = %dir, "ephemeral unmount failed");
        }
        if !self.executor.run("rmdir", &[&dir]) {
            warn!(dir = %dir, "ephemeral mount dir removal failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SimulatedExecutor;
    use tempfile::tempdir;

    #[test]
    fn test_summarize_mixed_directory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("photos")).unwrap();
        fs::write(dir.path().join("photos/a.jpg"), vec![0u8; 100]).unwrap();
        fs::create_dir(dir.path().join("photos/raw")).unwrap();
        fs::write(dir.path().join("photos/raw/b.raw"), vec![0u8; 200]).unwrap();

        let report = summarize_directory(dir.path()).unwrap();

        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.total_used, 305);
        assert_eq!(report.file_count, 3);

        let notes = report.entries.iter().find(|e| e.name == "notes.txt").unwrap();
        assert_eq!(notes.kind, EntryKind::File);
        assert_eq!(notes.size, 5);
        assert_eq!(notes.file_count, None);

        let photos = report.entries.iter().find(|e| e.name == "photos").unwrap();
        assert_eq!(photos.kind, EntryKind::Directory);
        assert_eq!(photos.size, 300);
        assert_eq!(photos.file_count, Some(2));
    }

    #[test]
    fn test_summarize_empty_directory() {
        let dir = tempdir().unwrap();
        let report = summarize_directory(dir.path()).unwrap();

        assert!(report.entries.is_empty());
        assert_eq!(report.total_used, 0);
        assert_eq!(report.file_count, 0);
    }

    #[test]
    fn test_summarize_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone");
        assert!(summarize_directory(&missing).is_err());
    }

    #[test]
    fn test_ephemeral_mount_always_cleans_up() {
        let exec = SimulatedExecutor::new();
        {
            let _mount = EphemeralMount::new(&exec, "/mnt/preview-1");
        }

        let log = exec.invocations();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].program, "umount");
        assert_eq!(log[0].args, vec!["/mnt/preview-1"]);
        assert_eq!(log[1].program, "rmdir");
        assert_eq!(log[1].args, vec!["/mnt/preview-1"]);
    }

    #[test]
    fn test_ephemeral_mount_cleans_up_on_unwind() {
        let exec = SimulatedExecutor::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _mount = EphemeralMount::new(&exec, "/mnt/preview-2");
            panic!("summarization blew up");
        }));
        assert!(result.is_err());

        let log = exec.invocations();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].program, "umount");
        assert_eq!(log[1].program, "rmdir");
    }
}
