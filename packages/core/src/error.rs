//! Unified error types for the homedisk-core library.
//!
//! Uses SNAFU for context-rich error handling, especially useful when the same
//! underlying error type (like `std::io::Error`) appears in different contexts.

use snafu::{ResultExt, Snafu};
use std::path::PathBuf;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Device string does not match any accepted device-naming grammar.
    #[snafu(display("invalid device path '{path}'"))]
    InvalidPath { path: String },

    /// Operation targets the disk the operating system runs from.
    #[snafu(display("refusing to touch {path}: device hosts the operating system"))]
    OsDiskProtected { path: String },

    /// Referenced device or partition is absent from the current inventory.
    #[snafu(display("device {path} not found in current inventory"))]
    DeviceNotFound { path: String },

    /// Unmount or in-place preview requested but nothing is mounted there.
    #[snafu(display("device {path} is not mounted"))]
    NotMounted { path: String },

    /// Preview requested on a partition with no filesystem.
    #[snafu(display("device {path} has no filesystem to preview"))]
    NoFilesystem { path: String },

    /// Mount command reported success but the live mount table disagrees.
    #[snafu(display("mount of {path} did not take effect: {output}"))]
    MountVerificationFailed { path: String, output: String },

    /// Command executed but returned a non-zero exit code.
    #[snafu(display("command '{command}' failed: {stderr}"))]
    CommandFailed { command: String, stderr: String },

    /// Failed to spawn a system command at all.
    #[snafu(display("failed to execute command '{command}'"))]
    CommandSpawn {
        command: String,
        source: std::io::Error,
    },

    /// Failed to parse lsblk JSON output.
    #[snafu(display("failed to parse lsblk output: {message}"))]
    LsblkParse { message: String },

    /// Fstab file not found or cannot be read.
    #[snafu(display("failed to read fstab at {}", path.display()))]
    FstabRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write fstab file.
    #[snafu(display("failed to write fstab at {}", path.display()))]
    FstabWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Live mount table not readable.
    #[snafu(display("failed to read mount table at {}", path.display()))]
    MountTableRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Mount point creation failed.
    #[snafu(display("failed to create mount point at {}", path.display()))]
    MountPointCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Directory summarization failed.
    #[snafu(display("failed to read directory {}", path.display()))]
    DirectoryRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read the pool membership file.
    #[snafu(display("failed to read pool store at {}", path.display()))]
    PoolRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write the pool membership file.
    #[snafu(display("failed to write pool store at {}", path.display()))]
    PoolWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(whatever, display("{message}"))]
    Generic {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for command spawn errors.
    fn command_context(self, command: impl Into<String>) -> Result<T>;

    /// Add context for fstab read errors.
    fn fstab_read_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for fstab write errors.
    fn fstab_write_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for mount table read errors.
    fn mtab_read_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for mount point creation errors.
    fn mount_point_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for directory read errors.
    fn dir_read_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn command_context(self, command: impl Into<String>) -> Result<T> {
        self.context(CommandSpawnSnafu {
            command: command.into(),
        })
    }

    fn fstab_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(FstabReadSnafu { path: path.into() })
    }

    fn fstab_write_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(FstabWriteSnafu { path: path.into() })
    }

    fn mtab_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(MountTableReadSnafu { path: path.into() })
    }

    fn mount_point_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(MountPointCreationSnafu { path: path.into() })
    }

    fn dir_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(DirectoryReadSnafu { path: path.into() })
    }
}
