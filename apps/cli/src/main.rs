//! homedisk CLI - command line interface for disk lifecycle operations.
//!
//! Thin caller glue around `homedisk-core`: parses commands, picks an
//! executor (real, sudo-wrapped, or simulated), and renders results as text
//! or JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use homedisk_core::config::ManagerConfig;
use homedisk_core::executor::{Executor, SimulatedExecutor, SystemExecutor};
use homedisk_core::inventory::PartitionStatus;
use homedisk_core::manager::DiskManager;
use homedisk_core::pool::{JsonPoolStore, PoolStore};

/// Where pool membership is persisted.
const POOL_STORE_PATH: &str = "/var/lib/homedisk/pool.json";

/// Home server disk and partition manager.
#[derive(Parser)]
#[command(name = "homedisk")]
#[command(about = "Manage data disks: format, mount, unmount, preview", long_about = None)]
struct Cli {
    /// Log intended actions without touching the system.
    #[arg(long, global = true)]
    simulate: bool,

    /// Wrap privileged commands with sudo (autodetected by default).
    #[arg(long, global = true)]
    sudo: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List block devices and their partitions.
    List {
        /// Emit the inventory as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Create an ext4 filesystem on a device. Destroys its contents.
    Format {
        /// Device path (e.g. /dev/sdb1).
        device: String,
    },
    /// Mount a device, allocating a /mnt/storage-<n> directory by default.
    Mount {
        /// Device path (e.g. /dev/sdb1).
        device: String,
        /// Mount at this path instead of allocating one.
        #[arg(long)]
        at: Option<PathBuf>,
    },
    /// Unmount a device and forget its persisted mount entry.
    Unmount {
        /// Device path (e.g. /dev/sdb1).
        device: String,
    },
    /// Summarize the top-level contents of a partition.
    Preview {
        /// Device path (e.g. /dev/sdb1).
        device: String,
    },
    /// Remove stale persisted mounts and orphaned mount directories.
    Cleanup,
    /// Manage storage pool membership.
    #[command(subcommand)]
    Pool(PoolCommands),
}

#[derive(Subcommand)]
enum PoolCommands {
    /// Register a mounted path as a pool member.
    Add {
        /// Mounted path (e.g. /mnt/storage-1).
        path: PathBuf,
        /// Free space floor in GB.
        #[arg(long, default_value_t = 10)]
        min_free_gb: u64,
    },
    /// Remove a path from the pool.
    Remove {
        /// Mounted path.
        path: PathBuf,
    },
    /// List pool members.
    List,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ManagerConfig::default();

    let result = if cli.simulate {
        run(
            DiskManager::new(config, SimulatedExecutor::new()),
            cli.command,
        )
    } else if cli.sudo {
        run(
            DiskManager::new(config, SystemExecutor::with_sudo()),
            cli.command,
        )
    } else {
        run(
            DiskManager::new(config, SystemExecutor::detect()),
            cli.command,
        )
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run<E: Executor>(manager: DiskManager<E>, command: Commands) -> homedisk_core::Result<()> {
    match command {
        Commands::List { json } => {
            let devices = manager.list_devices();
            if json {
                let rendered =
                    serde_json::to_string_pretty(&devices).expect("inventory serializes");
                println!("{rendered}");
            } else {
                for device in &devices {
                    println!(
                        "{}  {}  {}",
                        device.path.display(),
                        device.model,
                        device.size
                    );
                    for partition in &device.partitions {
                        println!(
                            "  {}  {}  {}  {}",
                            partition.path.display(),
                            partition.size,
                            partition.fstype.as_deref().unwrap_or("-"),
                            status_label(partition.status(), partition.mountpoint.as_deref()),
                        );
                    }
                }
            }
        }
        Commands::Format { device } => {
            manager.format(&device)?;
            println!("formatted {device}");
        }
        Commands::Mount { device, at } => {
            let mount_point = manager.mount(&device, at.as_deref())?;
            println!("{} mounted at {}", device, mount_point.display());
        }
        Commands::Unmount { device } => {
            let mount_point = manager.unmount(&device)?;
            println!("{} unmounted from {}", device, mount_point.display());
        }
        Commands::Preview { device } => {
            let report = manager.preview(&device)?;
            let rendered = serde_json::to_string_pretty(&report).expect("report serializes");
            println!("{rendered}");
        }
        Commands::Cleanup => {
            manager.cleanup_stale_mounts()?;
            println!("cleanup complete");
        }
        Commands::Pool(pool_command) => {
            let store_path = PathBuf::from(POOL_STORE_PATH);
            if let Some(parent) = store_path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let mut store = JsonPoolStore::new(store_path);

            match pool_command {
                PoolCommands::Add { path, min_free_gb } => {
                    store.create(&path, min_free_gb)?;
                    println!(
                        "{} added to pool (min free {} GB)",
                        path.display(),
                        min_free_gb
                    );
                }
                PoolCommands::Remove { path } => {
                    store.destroy(&path)?;
                    println!("{} removed from pool", path.display());
                }
                PoolCommands::List => {
                    for member in store.list()? {
                        println!(
                            "{}  min free {} GB",
                            member.path.display(),
                            member.minimum_free_gb
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

fn status_label(status: PartitionStatus, mountpoint: Option<&str>) -> String {
    match status {
        PartitionStatus::Mounted => format!("mounted at {}", mountpoint.unwrap_or("?")),
        PartitionStatus::Unmounted => "unmounted".to_string(),
        PartitionStatus::Unformatted => "unformatted".to_string(),
    }
}
