//! Lifecycle operations over disks and partitions.
//!
//! [`DiskManager`] combines the inventory, validator, allocator, fstab
//! synchronizer and executor into the four state transitions:
//!
//! ```text
//! Unformatted --format--> Unmounted
//! Unmounted   --mount-->  Mounted
//! Mounted     --unmount-> Unmounted
//! ```
//!
//! plus the read-only preview. Every operation refuses to touch the OS disk
//! before any command is issued, and re-queries the inventory on each call
//! rather than caching anything; a stale OS-disk answer here could destroy
//! the running system.
//!
//! At most one state transition runs per device path at a time: each
//! operation holds a per-path lock from before validation until it returns.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::error::{Error, IoResultExt, Result};
use crate::executor::Executor;
use crate::fstab::{FstabEntry, FstabFile};
use crate::inventory::{self, BlockDevice, Partition, PartitionStatus};
use crate::mtab;
use crate::preview::{self, EphemeralMount, PreviewReport};
use crate::validate;

/// Orchestrates disk lifecycle operations through an injected executor.
pub struct DiskManager<E: Executor> {
    config: ManagerConfig,
    executor: E,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<E: Executor> DiskManager<E> {
    pub fn new(config: ManagerConfig, executor: E) -> Self {
        Self {
            config,
            executor,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The transition lock for a device path.
    fn device_lock(&self, path: &str) -> Arc<Mutex<()>> {
        let mut table = self.locks.lock().expect("device lock table poisoned");
        table.entry(path.to_string()).or_default().clone()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Returns a fresh inventory snapshot.
    pub fn list_devices(&self) -> Vec<BlockDevice> {
        inventory::list_devices(&self.config.inventory)
    }

    /// True when the path resolves to the disk hosting the operating system.
    pub fn is_os_disk(&self, path: &str) -> Result<bool> {
        validate::validate_device_path(path)?;
        let devices = self.list_devices();
        Ok(device_is_os_disk(&devices, path))
    }

    /// Creates an ext4 filesystem on the device, destroying its contents.
    ///
    /// Permitted from any status (reformat is intentional); never permitted
    /// on the OS disk.
    pub fn format(&self, path: &str) -> Result<()> {
        let lock = self.device_lock(path);
        let _transition = lock.lock().expect("device lock poisoned");

        validate::validate_device_path(path)?;
        let devices = self.list_devices();
        ensure_not_os_disk(&devices, path)?;
        let partition = resolve_partition(&devices, path)?;

        info!(device = path, status = ?partition.status(), "formatting as ext4");
        self.executor.execute("mkfs.ext4", &["-F", path])?;
        Ok(())
    }

    /// Mounts the device, allocating a managed mount point when none is
    /// given, and records the mount in fstab keyed by filesystem UUID.
    ///
    /// The mount is verified against the live mount table rather than
    /// trusting the command's exit code. Returns the resolved mount point.
    pub fn mount(&self, path: &str, mount_point: Option<&Path>) -> Result<PathBuf> {
        let lock = self.device_lock(path);
        let _transition = lock.lock().expect("device lock poisoned");

        validate::validate_device_path(path)?;
        let devices = self.list_devices();
        ensure_not_os_disk(&devices, path)?;
        let partition = resolve_partition(&devices, path)?;

        let mount_point = match mount_point {
            Some(p) => p.to_path_buf(),
            None => self.allocate_mount_point()?,
        };
        let mount_point_str = mount_point.to_string_lossy().to_string();

        self.executor.execute("mkdir", &["-p", &mount_point_str])?;

        let (program, args) = mount_invocation(&partition, path, &mount_point_str, false);
        let output = self.executor.execute(program, &args)?;

        if self.executor.is_simulated() {
            debug!(device = path, "simulated mount, skipping verification and fstab update");
            return Ok(mount_point);
        }

        let mounts = mtab::read_mounts(&self.config.mounts_path)?;
        if !mtab::is_mounted_at(&mounts, Path::new(path), &mount_point) {
            if !self.executor.run("rmdir", &[&mount_point_str]) {
                warn!(dir = %mount_point_str, "could not remove mount point after failed mount");
            }
            return Err(Error::MountVerificationFailed {
                path: path.to_string(),
                output,
            });
        }

        if let Some(uuid) = &partition.uuid {
            let vfs_type = partition
                .fstype
                .clone()
                .unwrap_or_else(|| "auto".to_string());
            let mut fstab = FstabFile::load(&self.config.fstab_path)?;
            if fstab.append(FstabEntry::for_uuid(uuid, &mount_point, vfs_type)) {
                fstab.save()?;
                info!(device = path, uuid = %uuid, mount_point = %mount_point.display(), "fstab entry added");
            }
        }

        info!(device = path, mount_point = %mount_point.display(), "mounted");
        Ok(mount_point)
    }

    /// Unmounts the device, removes its fstab entry, and reclaims the
    /// managed mount directory. Returns the vacated mount point.
    pub fn unmount(&self, path: &str) -> Result<PathBuf> {
        let lock = self.device_lock(path);
        let _transition = lock.lock().expect("device lock poisoned");

        validate::validate_device_path(path)?;
        let devices = self.list_devices();
        ensure_not_os_disk(&devices, path)?;

        let mounts = mtab::read_mounts(&self.config.mounts_path)?;
        let mount_point = mtab::mount_point_of(&mounts, Path::new(path))
            .ok_or_else(|| Error::NotMounted {
                path: path.to_string(),
            })?
            .to_path_buf();
        let mount_point_str = mount_point.to_string_lossy().to_string();

        self.executor.execute("umount", &[&mount_point_str])?;

        if !self.executor.is_simulated()
            && let Some((_, partition)) = inventory::find_partition(&devices, Path::new(path))
            && let Some(uuid) = &partition.uuid
        {
            let mut fstab = FstabFile::load(&self.config.fstab_path)?;
            if fstab.remove_uuid(uuid) {
                fstab.save()?;
                info!(device = path, uuid = %uuid, "fstab entry removed");
            }
        }

        // Only directories following our own naming convention are
        // reclaimed; a caller-supplied mount point is not ours to delete.
        if self.config.is_managed_mount_point(&mount_point)
            && !self.executor.run("rmdir", &[&mount_point_str])
        {
            warn!(dir = %mount_point_str, "could not remove vacated mount point");
        }

        info!(device = path, mount_point = %mount_point.display(), "unmounted");
        Ok(mount_point)
    }

    /// Picks the next available managed mount directory.
    ///
    /// Stale configuration is cleaned up first so directories vacated by
    /// detached devices are reused rather than skipped forever. A candidate
    /// is available when it does not exist, or exists empty and is not an
    /// active mount point.
    pub fn allocate_mount_point(&self) -> Result<PathBuf> {
        self.cleanup_stale_mounts()?;

        let mounts = mtab::read_mounts(&self.config.mounts_path)?;
        let mut n = 1;
        loop {
            let candidate = self.config.managed_dir(n);
            if !candidate.exists() {
                return Ok(candidate);
            }
            if candidate.is_dir()
                && !mtab::is_mount_point(&mounts, &candidate)
                && dir_is_empty(&candidate)?
            {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Removes managed fstab entries whose UUID no longer exists on any
    /// attached device, then prunes the now-orphaned empty directories.
    ///
    /// Running this with nothing stale is a no-op: the fstab file is not
    /// rewritten and no directory is touched.
    pub fn cleanup_stale_mounts(&self) -> Result<()> {
        let devices = self.list_devices();
        let live = inventory::attached_uuids(&devices);

        let mut fstab = FstabFile::load(&self.config.fstab_path)?;
        let stale = fstab.remove_matching(|e| {
            self.config.is_managed_mount_point(&e.mount_point)
                && e.uuid().is_some_and(|u| !live.contains(u))
        });

        if stale.is_empty() {
            return Ok(());
        }

        if self.executor.is_simulated() {
            info!(
                count = stale.len(),
                "simulated cleanup, leaving stale fstab entries in place"
            );
            return Ok(());
        }

        fstab.save()?;
        info!(count = stale.len(), "removed stale fstab entries");

        let mounts = mtab::read_mounts(&self.config.mounts_path)?;
        for entry in &stale {
            let dir = &entry.mount_point;
            if !dir.is_dir() || mtab::is_mount_point(&mounts, dir) {
                continue;
            }
            match dir_is_empty(dir) {
                Ok(true) => {
                    let dir_str = dir.to_string_lossy();
                    if !self.executor.run("rmdir", &[&dir_str]) {
                        warn!(dir = %dir_str, "could not remove orphaned mount point");
                    }
                }
                Ok(false) => {
                    warn!(dir = %dir.display(), "orphaned mount point not empty, leaving in place");
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "could not inspect orphaned mount point");
                }
            }
        }

        Ok(())
    }

    /// Summarizes the top-level contents of a partition.
    ///
    /// Already-mounted partitions are read in place with no commands issued.
    /// Unmounted-but-formatted partitions are mounted read-only under a
    /// throwaway preview directory that is always torn down afterwards.
    pub fn preview(&self, path: &str) -> Result<PreviewReport> {
        let lock = self.device_lock(path);
        let _transition = lock.lock().expect("device lock poisoned");

        validate::validate_device_path(path)?;
        let devices = self.list_devices();
        ensure_not_os_disk(&devices, path)?;
        let partition = resolve_partition(&devices, path)?;

        match partition.status() {
            PartitionStatus::Unformatted => Err(Error::NoFilesystem {
                path: path.to_string(),
            }),
            PartitionStatus::Mounted => {
                let Some(mount_point) = partition.mountpoint.as_deref() else {
                    return Err(Error::NotMounted {
                        path: path.to_string(),
                    });
                };
                preview::summarize_directory(Path::new(mount_point))
            }
            PartitionStatus::Unmounted => self.preview_unmounted(&partition, path),
        }
    }

    fn preview_unmounted(&self, partition: &Partition, path: &str) -> Result<PreviewReport> {
        let dir = self.allocate_preview_dir()?;
        let dir_str = dir.to_string_lossy().to_string();

        self.executor.execute("mkdir", &["-p", &dir_str])?;
        let mount = EphemeralMount::new(&self.executor, &dir);

        let (program, args) = mount_invocation(partition, path, &dir_str, true);
        self.executor.execute(program, &args)?;

        if self.executor.is_simulated() {
            debug!(device = path, "simulated preview, nothing mounted to summarize");
            return Ok(PreviewReport::default());
        }

        let report = preview::summarize_directory(mount.dir());
        drop(mount);
        report
    }

    fn allocate_preview_dir(&self) -> Result<PathBuf> {
        let mounts = mtab::read_mounts(&self.config.mounts_path)?;
        let mut n = 1;
        loop {
            let candidate = self.config.preview_dir(n);
            if !candidate.exists() {
                return Ok(candidate);
            }
            if candidate.is_dir()
                && !mtab::is_mount_point(&mounts, &candidate)
                && dir_is_empty(&candidate)?
            {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

/// Refuses any operation whose target resolves to the OS disk.
fn ensure_not_os_disk(devices: &[BlockDevice], path: &str) -> Result<()> {
    if device_is_os_disk(devices, path) {
        return Err(Error::OsDiskProtected {
            path: path.to_string(),
        });
    }
    Ok(())
}

fn device_is_os_disk(devices: &[BlockDevice], path: &str) -> bool {
    let parent = validate::parent_device(path);
    inventory::find_device(devices, Path::new(&parent)).is_some_and(BlockDevice::is_os_disk)
}

fn resolve_partition(devices: &[BlockDevice], path: &str) -> Result<Partition> {
    inventory::find_partition(devices, Path::new(path))
        .map(|(_, p)| p.clone())
        .ok_or_else(|| Error::DeviceNotFound {
            path: path.to_string(),
        })
}

/// Picks the mount program and arguments for a partition. NTFS needs its
/// own userspace helper; everything else goes through plain mount.
fn mount_invocation<'a>(
    partition: &Partition,
    path: &'a str,
    mount_point: &'a str,
    read_only: bool,
) -> (&'static str, Vec<&'a str>) {
    let program = match partition.fstype.as_deref() {
        Some("ntfs" | "ntfs3") => "ntfs-3g",
        _ => "mount",
    };

    let mut args = Vec::new();
    if read_only {
        args.push("-o");
        args.push("ro");
    }
    args.push(path);
    args.push(mount_point);
    (program, args)
}

fn dir_is_empty(path: &Path) -> Result<bool> {
    Ok(fs::read_dir(path).dir_read_context(path)?.next().is_none())
}
