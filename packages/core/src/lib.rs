//! homedisk-core: disk and partition lifecycle management for a home server.
//!
//! This library discovers block devices and their partitions, drives the
//! format / mount / unmount state transitions through a privileged command
//! executor, keeps the persisted mount table (fstab) in sync with attached
//! devices, allocates numbered mount directories, and provides a read-only
//! content preview via ephemeral mounts.
//!
//! # Modules
//!
//! - [`inventory`]: Block device discovery via `lsblk`, with a fixed example
//!   fallback for hosts that cannot be queried
//! - [`validate`]: Device path grammar validation
//! - [`mtab`]: Live mount table access
//! - [`fstab`]: Persisted mount table parsing and rewriting
//! - [`manager`]: Lifecycle operations (format, mount, unmount, preview)
//! - [`preview`]: Directory summarization and ephemeral mounts
//! - [`pool`]: Storage pool membership boundary
//! - [`executor`]: Command execution with privilege escalation and simulation
//! - [`config`]: Manager configuration
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use homedisk_core::config::ManagerConfig;
//! use homedisk_core::executor::SystemExecutor;
//! use homedisk_core::manager::DiskManager;
//!
//! let manager = DiskManager::new(ManagerConfig::default(), SystemExecutor::detect());
//!
//! // Inspect what is attached
//! for device in manager.list_devices() {
//!     for partition in &device.partitions {
//!         println!("{}: {:?}", partition.path.display(), partition.status());
//!     }
//! }
//!
//! // Format and mount a data disk (never the OS disk)
//! manager.format("/dev/sdc").unwrap();
//! let mount_point = manager.mount("/dev/sdc", None).unwrap();
//! println!("mounted at {}", mount_point.display());
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod fstab;
pub mod inventory;
pub mod manager;
pub mod mtab;
pub mod pool;
pub mod preview;
pub mod validate;

// Re-export commonly used types
pub use config::ManagerConfig;
pub use error::{Error, Result};
pub use executor::{Executor, SimulatedExecutor, SystemExecutor};
pub use fstab::FstabEntry;
pub use inventory::{BlockDevice, InventorySource, Partition, PartitionStatus};
pub use manager::DiskManager;
pub use pool::{JsonPoolStore, PoolPartition, PoolStore};
pub use preview::{PreviewEntry, PreviewReport};
