//! Block device inventory built on lsblk.
//!
//! Produces a fresh snapshot of attached block devices and their partitions
//! on every query; nothing here is cached or persisted. When the host cannot
//! be queried (no lsblk, non-Linux dev box, simulation), a fixed example
//! inventory is returned instead so the rest of the state machine stays
//! exercisable. That fallback is designed behavior, not an error.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, IoResultExt, Result};

/// Mount points that mark a device as hosting the running operating system.
const OS_MOUNT_POINTS: &[&str] = &["/", "/boot", "/boot/efi"];

/// Lifecycle state of a partition, derived from what lsblk reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionStatus {
    /// No filesystem present.
    Unformatted,
    /// Has a filesystem but no active mount.
    Unmounted,
    /// Currently mounted somewhere.
    Mounted,
}

/// A partition, or a whole disk treated as one when it has no partition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Kernel name (e.g. "sdb1", "nvme0n1p2").
    pub name: String,
    /// Device file path (e.g. "/dev/sdb1").
    pub path: PathBuf,
    /// Human-readable size as reported by lsblk (e.g. "3.6T").
    pub size: String,
    /// Filesystem type, if formatted.
    pub fstype: Option<String>,
    /// Active mount point, if mounted.
    pub mountpoint: Option<String>,
    /// Filesystem UUID, if formatted.
    pub uuid: Option<String>,
}

impl Partition {
    /// Derived lifecycle status. See [`partition_status`].
    pub fn status(&self) -> PartitionStatus {
        partition_status(self.fstype.as_deref(), self.mountpoint.as_deref())
    }
}

/// Classifies a partition from the presence of its filesystem and mount point.
///
/// Mounted iff a mount point is present; otherwise Unmounted iff a filesystem
/// is present; otherwise Unformatted. Total over all input combinations.
pub fn partition_status(fstype: Option<&str>, mountpoint: Option<&str>) -> PartitionStatus {
    match (fstype, mountpoint) {
        (_, Some(_)) => PartitionStatus::Mounted,
        (Some(_), None) => PartitionStatus::Unmounted,
        (None, None) => PartitionStatus::Unformatted,
    }
}

/// A block device and its partitions, as seen at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDevice {
    /// Kernel name (e.g. "sda").
    pub name: String,
    /// Device file path (e.g. "/dev/sda").
    pub path: PathBuf,
    /// Hardware model string, empty when unknown.
    pub model: String,
    /// Human-readable size as reported by lsblk.
    pub size: String,
    /// Hardware serial number, if reported.
    pub serial: Option<String>,
    /// Partitions, including the synthetic whole-disk partition for disks
    /// without a partition table.
    pub partitions: Vec<Partition>,
}

impl BlockDevice {
    /// True when any partition mounts at a root/boot location.
    ///
    /// Recomputed from the snapshot on every call; caching this would let a
    /// stale answer wave a destructive operation through to the boot disk.
    pub fn is_os_disk(&self) -> bool {
        self.partitions
            .iter()
            .any(|p| p.mountpoint.as_deref().is_some_and(is_os_mount_point))
    }
}

fn is_os_mount_point(mountpoint: &str) -> bool {
    OS_MOUNT_POINTS.contains(&mountpoint)
}

/// Where device snapshots come from.
#[derive(Debug, Clone, Default)]
pub enum InventorySource {
    /// Query the host via lsblk, falling back to the example set on failure.
    #[default]
    Real,
    /// Always use the example set.
    Simulated,
    /// Use an explicit snapshot (tests, development).
    Static(Vec<BlockDevice>),
}

/// Returns the current device inventory. Always succeeds.
pub fn list_devices(source: &InventorySource) -> Vec<BlockDevice> {
    match source {
        InventorySource::Real => query_lsblk().unwrap_or_else(|e| {
            debug!(error = %e, "lsblk unavailable, using example inventory");
            sample_devices()
        }),
        InventorySource::Simulated => sample_devices(),
        InventorySource::Static(devices) => devices.clone(),
    }
}

/// Finds a partition by its device path across all devices.
pub fn find_partition<'a>(
    devices: &'a [BlockDevice],
    path: &std::path::Path,
) -> Option<(&'a BlockDevice, &'a Partition)> {
    devices.iter().find_map(|d| {
        d.partitions
            .iter()
            .find(|p| p.path == path)
            .map(|p| (d, p))
    })
}

/// Finds a block device by its device path.
pub fn find_device<'a>(devices: &'a [BlockDevice], path: &std::path::Path) -> Option<&'a BlockDevice> {
    devices.iter().find(|d| d.path == path)
}

/// Collects the filesystem UUIDs present on any attached partition.
pub fn attached_uuids(devices: &[BlockDevice]) -> BTreeSet<String> {
    devices
        .iter()
        .flat_map(|d| d.partitions.iter())
        .filter_map(|p| p.uuid.clone())
        .collect()
}

/// Raw JSON structure from lsblk output.
#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    serial: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(rename = "type")]
    device_type: Option<String>,
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    children: Option<Vec<LsblkDevice>>,
}

impl LsblkDevice {
    fn device_path(&self) -> PathBuf {
        self.path
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("/dev/{}", self.name)))
    }
}

/// Queries the host for block devices via `lsblk --json`.
fn query_lsblk() -> Result<Vec<BlockDevice>> {
    let output = Command::new("lsblk")
        .args([
            "--json",
            "--output",
            "NAME,PATH,MODEL,SERIAL,SIZE,TYPE,FSTYPE,MOUNTPOINT,UUID",
        ])
        .output()
        .command_context("lsblk")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        return Err(Error::CommandFailed {
            command: "lsblk".to_string(),
            stderr,
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_lsblk(&stdout)
}

/// Parses lsblk JSON into the inventory model.
fn parse_lsblk(json: &str) -> Result<Vec<BlockDevice>> {
    let lsblk: LsblkOutput = serde_json::from_str(json).map_err(|e| Error::LsblkParse {
        message: e.to_string(),
    })?;

    let mut devices = Vec::new();
    for raw in &lsblk.blockdevices {
        // Whole disks only; loop devices, roms and the like are not ours.
        if raw.device_type.as_deref() != Some("disk") {
            continue;
        }

        let mut partitions: Vec<Partition> = raw
            .children
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|c| c.device_type.as_deref() == Some("part"))
            .map(|c| Partition {
                name: c.name.clone(),
                path: c.device_path(),
                size: c.size.clone().unwrap_or_default(),
                fstype: c.fstype.clone(),
                mountpoint: c.mountpoint.clone(),
                uuid: c.uuid.clone(),
            })
            .collect();

        // A disk without a partition table is addressed as one region
        // spanning the whole device.
        if partitions.is_empty() {
            partitions.push(Partition {
                name: raw.name.clone(),
                path: raw.device_path(),
                size: raw.size.clone().unwrap_or_default(),
                fstype: raw.fstype.clone(),
                mountpoint: raw.mountpoint.clone(),
                uuid: raw.uuid.clone(),
            });
        }

        devices.push(BlockDevice {
            name: raw.name.clone(),
            path: raw.device_path(),
            model: raw.model.clone().unwrap_or_default(),
            size: raw.size.clone().unwrap_or_default(),
            serial: raw.serial.clone(),
            partitions,
        });
    }

    Ok(devices)
}

/// Fixed example inventory covering all three partition statuses: an OS disk,
/// a formatted-but-unmounted data disk, and an unformatted disk with no
/// partition table.
pub fn sample_devices() -> Vec<BlockDevice> {
    vec![
        BlockDevice {
            name: "sda".to_string(),
            path: PathBuf::from("/dev/sda"),
            model: "Samsung SSD 870 EVO".to_string(),
            size: "465.8G".to_string(),
            serial: Some("S5Y1NL0T702868K".to_string()),
            partitions: vec![
                Partition {
                    name: "sda1".to_string(),
                    path: PathBuf::from("/dev/sda1"),
                    size: "512M".to_string(),
                    fstype: Some("vfat".to_string()),
                    mountpoint: Some("/boot/efi".to_string()),
                    uuid: Some("9C3A-1B2D".to_string()),
                },
                Partition {
                    name: "sda2".to_string(),
                    path: PathBuf::from("/dev/sda2"),
                    size: "465.3G".to_string(),
                    fstype: Some("ext4".to_string()),
                    mountpoint: Some("/".to_string()),
                    uuid: Some("0f2d6a31-8bb6-4a62-9f4d-3c2f0d6a9b11".to_string()),
                },
            ],
        },
        BlockDevice {
            name: "sdb".to_string(),
            path: PathBuf::from("/dev/sdb"),
            model: "WDC WD40EFRX-68N".to_string(),
            size: "3.6T".to_string(),
            serial: Some("WD-WCC7K4ZN9XD1".to_string()),
            partitions: vec![Partition {
                name: "sdb1".to_string(),
                path: PathBuf::from("/dev/sdb1"),
                size: "3.6T".to_string(),
                fstype: Some("ext4".to_string()),
                mountpoint: None,
                uuid: Some("6db3a2cf-54e4-41a5-8c6a-7f2e1d0b9c8e".to_string()),
            }],
        },
        BlockDevice {
            name: "sdc".to_string(),
            path: PathBuf::from("/dev/sdc"),
            model: "Seagate Expansion".to_string(),
            size: "1.8T".to_string(),
            serial: None,
            partitions: vec![Partition {
                name: "sdc".to_string(),
                path: PathBuf::from("/dev/sdc"),
                size: "1.8T".to_string(),
                fstype: None,
                mountpoint: None,
                uuid: None,
            }],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const SAMPLE_LSBLK_JSON: &str = r#"{
        "blockdevices": [
            {
                "name": "nvme0n1",
                "path": "/dev/nvme0n1",
                "model": "WD_BLACK SN850X 1000GB",
                "serial": "23517A800159",
                "size": "931.5G",
                "type": "disk",
                "fstype": null,
                "mountpoint": null,
                "uuid": null,
                "children": [
                    {
                        "name": "nvme0n1p1",
                        "path": "/dev/nvme0n1p1",
                        "model": null,
                        "serial": null,
                        "size": "512M",
                        "type": "part",
                        "fstype": "vfat",
                        "mountpoint": "/boot/efi",
                        "uuid": "1A2B-3C4D"
                    },
                    {
                        "name": "nvme0n1p2",
                        "path": "/dev/nvme0n1p2",
                        "model": null,
                        "serial": null,
                        "size": "931G",
                        "type": "part",
                        "fstype": "ext4",
                        "mountpoint": "/",
                        "uuid": "c1d2e3f4-0011-2233-4455-66778899aabb"
                    }
                ]
            },
            {
                "name": "sdb",
                "path": "/dev/sdb",
                "model": "Expansion HDD",
                "serial": "NAAJ2WNT",
                "size": "1.8T",
                "type": "disk",
                "fstype": null,
                "mountpoint": null,
                "uuid": null
            },
            {
                "name": "loop0",
                "path": "/dev/loop0",
                "model": null,
                "serial": null,
                "size": "64M",
                "type": "loop",
                "fstype": "squashfs",
                "mountpoint": "/snap/core/1",
                "uuid": null
            }
        ]
    }"#;

    #[test]
    fn test_parse_lsblk_json() {
        let devices = parse_lsblk(SAMPLE_LSBLK_JSON).unwrap();

        // loop0 is skipped
        assert_eq!(devices.len(), 2);

        let nvme = &devices[0];
        assert_eq!(nvme.name, "nvme0n1");
        assert_eq!(nvme.model, "WD_BLACK SN850X 1000GB");
        assert_eq!(nvme.partitions.len(), 2);
        assert_eq!(
            nvme.partitions[0].mountpoint,
            Some("/boot/efi".to_string())
        );
        assert!(nvme.is_os_disk());
    }

    #[test]
    fn test_disk_without_partition_table_gets_synthetic_partition() {
        let devices = parse_lsblk(SAMPLE_LSBLK_JSON).unwrap();
        let sdb = &devices[1];

        assert_eq!(sdb.partitions.len(), 1);
        assert_eq!(sdb.partitions[0].name, "sdb");
        assert_eq!(sdb.partitions[0].path, Path::new("/dev/sdb"));
        assert_eq!(sdb.partitions[0].size, "1.8T");
        assert_eq!(sdb.partitions[0].status(), PartitionStatus::Unformatted);
    }

    #[test]
    fn test_partition_status_total() {
        assert_eq!(
            partition_status(Some("ext4"), Some("/mnt/storage-1")),
            PartitionStatus::Mounted
        );
        // Mounted wins even with no recorded fstype
        assert_eq!(
            partition_status(None, Some("/mnt/storage-1")),
            PartitionStatus::Mounted
        );
        assert_eq!(
            partition_status(Some("ext4"), None),
            PartitionStatus::Unmounted
        );
        assert_eq!(partition_status(None, None), PartitionStatus::Unformatted);
    }

    #[test]
    fn test_os_disk_marker_independent_of_ordering() {
        let mut devices = sample_devices();
        assert!(devices[0].is_os_disk());
        assert!(!devices[1].is_os_disk());
        assert!(!devices[2].is_os_disk());

        devices.reverse();
        assert!(devices[2].is_os_disk());
        assert!(!devices[0].is_os_disk());

        // Partition order within the device does not matter either.
        devices[2].partitions.reverse();
        assert!(devices[2].is_os_disk());
    }

    #[test]
    fn test_sample_devices_cover_all_statuses() {
        let devices = sample_devices();
        let statuses: Vec<PartitionStatus> = devices
            .iter()
            .flat_map(|d| d.partitions.iter())
            .map(|p| p.status())
            .collect();

        assert!(statuses.contains(&PartitionStatus::Mounted));
        assert!(statuses.contains(&PartitionStatus::Unmounted));
        assert!(statuses.contains(&PartitionStatus::Unformatted));
    }

    #[test]
    fn test_simulated_source_never_fails() {
        let devices = list_devices(&InventorySource::Simulated);
        assert_eq!(devices.len(), 3);
    }

    #[test]
    fn test_static_source_returns_snapshot() {
        let snapshot = vec![sample_devices().remove(1)];
        let devices = list_devices(&InventorySource::Static(snapshot.clone()));
        assert_eq!(devices, snapshot);
    }

    #[test]
    fn test_find_partition() {
        let devices = sample_devices();

        let (device, partition) = find_partition(&devices, Path::new("/dev/sdb1")).unwrap();
        assert_eq!(device.name, "sdb");
        assert_eq!(partition.name, "sdb1");

        assert!(find_partition(&devices, Path::new("/dev/sdz1")).is_none());
    }

    #[test]
    fn test_attached_uuids() {
        let uuids = attached_uuids(&sample_devices());
        assert!(uuids.contains("6db3a2cf-54e4-41a5-8c6a-7f2e1d0b9c8e"));
        assert!(uuids.contains("9C3A-1B2D"));
        // sdc is unformatted, contributes nothing
        assert_eq!(uuids.len(), 3);
    }
}
