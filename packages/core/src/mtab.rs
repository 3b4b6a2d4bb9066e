//! Live mount table access.
//!
//! Reads the kernel's view of active mounts (`/proc/mounts` on a real host;
//! the path is configurable so tests can point at a fixture). This is the
//! source of truth for "actually mounted" — command exit codes alone are not,
//! since a wrapper can exit 0 without mounting anything.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, Result};
use crate::fstab::unescape_fstab_path;

/// Default live mount table path.
pub const MOUNTS_PATH: &str = "/proc/mounts";

/// One active mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Mounted device (e.g. "/dev/sdb1").
    pub device: String,
    /// Where it is mounted.
    pub mount_point: PathBuf,
    /// Filesystem type as the kernel reports it.
    pub fstype: String,
}

/// Reads the active mounts from the given mount table file.
pub fn read_mounts(path: &Path) -> Result<Vec<MountEntry>> {
    let content = fs::read_to_string(path).mtab_read_context(path)?;

    let mounts = content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            let fstype = fields.next()?;
            Some(MountEntry {
                device: device.to_string(),
                mount_point: PathBuf::from(unescape_fstab_path(mount_point)),
                fstype: fstype.to_string(),
            })
        })
        .collect();

    Ok(mounts)
}

/// Where the given device is currently mounted, if anywhere.
pub fn mount_point_of<'a>(mounts: &'a [MountEntry], device: &Path) -> Option<&'a Path> {
    let device = device.to_string_lossy();
    mounts
        .iter()
        .find(|m| m.device == device)
        .map(|m| m.mount_point.as_path())
}

/// True if the given path is an active mount point.
pub fn is_mount_point(mounts: &[MountEntry], path: &Path) -> bool {
    mounts.iter().any(|m| m.mount_point == path)
}

/// True if the given device is mounted at the given mount point.
pub fn is_mounted_at(mounts: &[MountEntry], device: &Path, mount_point: &Path) -> bool {
    let device = device.to_string_lossy();
    mounts
        .iter()
        .any(|m| m.device == device && m.mount_point == mount_point)
}
