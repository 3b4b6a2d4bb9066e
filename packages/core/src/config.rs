//! Manager configuration.
//!
//! Collects every externally-visible path the lifecycle layer touches so
//! tests can point the whole subsystem at fixtures. Defaults target a real
//! host.

use std::path::{Path, PathBuf};

use crate::fstab;
use crate::inventory::InventorySource;
use crate::mtab;

/// Base directory for managed mount points.
pub const MOUNT_BASE: &str = "/mnt";

/// Directory-name prefix for managed mount points (`/mnt/storage-<n>`).
pub const MOUNT_PREFIX: &str = "storage-";

/// Directory-name prefix for throwaway preview mounts (`/mnt/preview-<n>`).
pub const PREVIEW_PREFIX: &str = "preview-";

/// Configuration for a [`crate::manager::DiskManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Persisted mount table.
    pub fstab_path: PathBuf,
    /// Live mount table.
    pub mounts_path: PathBuf,
    /// Directory under which managed and preview mount points are created.
    pub mount_base: PathBuf,
    /// Name prefix for managed mount directories.
    pub mount_prefix: String,
    /// Name prefix for ephemeral preview directories.
    pub preview_prefix: String,
    /// Where device snapshots come from.
    pub inventory: InventorySource,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            fstab_path: PathBuf::from(fstab::FSTAB_PATH),
            mounts_path: PathBuf::from(mtab::MOUNTS_PATH),
            mount_base: PathBuf::from(MOUNT_BASE),
            mount_prefix: MOUNT_PREFIX.to_string(),
            preview_prefix: PREVIEW_PREFIX.to_string(),
            inventory: InventorySource::Real,
        }
    }
}

impl ManagerConfig {
    /// Creates a config with host defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fstab path.
    pub fn with_fstab_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fstab_path = path.into();
        self
    }

    /// Sets the live mount table path.
    pub fn with_mounts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mounts_path = path.into();
        self
    }

    /// Sets the base directory for mount points.
    pub fn with_mount_base(mut self, path: impl Into<PathBuf>) -> Self {
        self.mount_base = path.into();
        self
    }

    /// Sets the inventory source.
    pub fn with_inventory(mut self, inventory: InventorySource) -> Self {
        self.inventory = inventory;
        self
    }

    /// The n-th managed mount directory (1-based).
    pub fn managed_dir(&self, n: u32) -> PathBuf {
        self.mount_base
            .join(format!("{}{}", self.mount_prefix, n))
    }

    /// The n-th preview mount directory (1-based).
    pub fn preview_dir(&self, n: u32) -> PathBuf {
        self.mount_base
            .join(format!("{}{}", self.preview_prefix, n))
    }

    /// True when `path` follows this manager's numbered mount-point naming.
    pub fn is_managed_mount_point(&self, path: &Path) -> bool {
        if path.parent() != Some(self.mount_base.as_path()) {
            return false;
        }

        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(&self.mount_prefix))
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_dir_naming() {
        let config = ManagerConfig::default();
        assert_eq!(config.managed_dir(1), PathBuf::from("/mnt/storage-1"));
        assert_eq!(config.managed_dir(12), PathBuf::from("/mnt/storage-12"));
        assert_eq!(config.preview_dir(1), PathBuf::from("/mnt/preview-1"));
    }

    #[test]
    fn test_is_managed_mount_point() {
        let config = ManagerConfig::default();

        assert!(config.is_managed_mount_point(Path::new("/mnt/storage-1")));
        assert!(config.is_managed_mount_point(Path::new("/mnt/storage-42")));

        assert!(!config.is_managed_mount_point(Path::new("/mnt/storage-")));
        assert!(!config.is_managed_mount_point(Path::new("/mnt/storage-x")));
        assert!(!config.is_managed_mount_point(Path::new("/mnt/preview-1")));
        assert!(!config.is_managed_mount_point(Path::new("/mnt/other")));
        assert!(!config.is_managed_mount_point(Path::new("/home/storage-1")));
        assert!(!config.is_managed_mount_point(Path::new("/mnt/storage-1/nested")));
    }
}
