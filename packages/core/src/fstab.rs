//! Fstab parsing and rewriting.
//!
//! The persisted mount table is treated as a line-oriented file in which this
//! library owns exactly the UUID-keyed entries pointing at its own managed
//! mount directories. Every other line, comments and unrelated mounts
//! included, is carried through a rewrite byte-for-byte. Rewrites go to a
//! temporary file that is renamed over the original, and are skipped entirely
//! when nothing changed.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, Result};

/// Default fstab path.
pub const FSTAB_PATH: &str = "/etc/fstab";

/// Mount options used for every managed entry.
const MANAGED_OPTIONS: &str = "defaults";

/// fsck pass number for managed entries (non-root filesystems).
const MANAGED_FSCK_ORDER: u16 = 2;

/// Represents a single fstab entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    /// The device identifier (e.g. "UUID=xxx", "LABEL=xxx", "/dev/sda1").
    pub fs_spec: String,
    /// Mount point path.
    pub mount_point: PathBuf,
    /// Filesystem type (e.g. "ext4", "ntfs").
    pub vfs_type: String,
    /// Mount options.
    pub mount_options: String,
    /// Field used by dump(8).
    pub dump: u8,
    /// Field used by fsck(8) to order checks at boot.
    pub fsck_order: u16,
}

impl FstabEntry {
    /// Creates a managed entry keyed by filesystem UUID:
    /// `UUID=<uuid> <mount_point> <fstype> defaults 0 2`.
    pub fn for_uuid(uuid: &str, mount_point: impl Into<PathBuf>, vfs_type: impl Into<String>) -> Self {
        Self {
            fs_spec: format!("UUID={}", uuid),
            mount_point: mount_point.into(),
            vfs_type: vfs_type.into(),
            mount_options: MANAGED_OPTIONS.to_string(),
            dump: 0,
            fsck_order: MANAGED_FSCK_ORDER,
        }
    }

    /// The filesystem UUID, when this entry is UUID-keyed.
    pub fn uuid(&self) -> Option<&str> {
        self.fs_spec.strip_prefix("UUID=")
    }

    /// Formats the entry as an fstab line.
    pub fn to_fstab_line(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            self.fs_spec,
            escape_fstab_path(&self.mount_point.to_string_lossy()),
            self.vfs_type,
            self.mount_options,
            self.dump,
            self.fsck_order
        )
    }

    /// Parses a single fstab line into an entry.
    ///
    /// Returns None for comments, empty lines, and anything that does not
    /// carry the six standard fields; such lines are preserved verbatim by
    /// [`FstabFile`] instead.
    pub fn from_line(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() != 6 {
            return None;
        }

        let dump = parts[4].parse::<u8>().ok()?;
        let fsck_order = parts[5].parse::<u16>().ok()?;

        Some(Self {
            fs_spec: parts[0].to_string(),
            mount_point: PathBuf::from(unescape_fstab_path(parts[1])),
            vfs_type: parts[2].to_string(),
            mount_options: parts[3].to_string(),
            dump,
            fsck_order,
        })
    }
}

/// Escapes special characters in fstab paths using octal sequences.
///
/// Handles space (\040), tab (\011), newline (\012), and backslash (\134).
fn escape_fstab_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            ' ' => encoded.push_str(r"\040"),
            '\t' => encoded.push_str(r"\011"),
            '\n' => encoded.push_str(r"\012"),
            '\\' => encoded.push_str(r"\134"),
            _ => encoded.push(c),
        }
    }
    encoded
}

/// Unescapes octal sequences in fstab paths.
pub(crate) fn unescape_fstab_path(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            let mut octal_digits = String::new();
            let mut clone_iter = chars.clone();
            for _ in 0..3 {
                if let Some(digit) = clone_iter.next() {
                    if digit.is_ascii_digit() {
                        octal_digits.push(digit);
                    } else {
                        break;
                    }
                } else {
                    break;
                }
            }

            if octal_digits.len() == 3
                && let Ok(byte) = u8::from_str_radix(&octal_digits, 8)
            {
                result.push(byte as char);
                for _ in 0..3 {
                    chars.next();
                }
                continue;
            }
        }
        result.push(c);
    }
    result
}

/// One line of the fstab file: the original text, plus the parsed entry when
/// the line carries one.
#[derive(Debug, Clone)]
struct FstabLine {
    raw: String,
    entry: Option<FstabEntry>,
}

/// An fstab file held in memory for inspection and selective rewriting.
#[derive(Debug)]
pub struct FstabFile {
    path: PathBuf,
    lines: Vec<FstabLine>,
    dirty: bool,
}

impl FstabFile {
    /// Loads and parses the fstab file at `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path).fstab_read_context(&path)?;

        let lines = content
            .lines()
            .map(|line| FstabLine {
                raw: line.to_string(),
                entry: FstabEntry::from_line(line),
            })
            .collect();

        Ok(Self {
            path,
            lines,
            dirty: false,
        })
    }

    /// Iterates over the parseable entries.
    pub fn entries(&self) -> impl Iterator<Item = &FstabEntry> {
        self.lines.iter().filter_map(|l| l.entry.as_ref())
    }

    /// True if any entry is keyed by the given UUID.
    pub fn contains_uuid(&self, uuid: &str) -> bool {
        self.entries().any(|e| e.uuid() == Some(uuid))
    }

    /// Appends a managed entry unless its UUID is already present.
    ///
    /// Returns true if the entry was added.
    pub fn append(&mut self, entry: FstabEntry) -> bool {
        if let Some(uuid) = entry.uuid()
            && self.contains_uuid(uuid)
        {
            return false;
        }

        self.lines.push(FstabLine {
            raw: entry.to_fstab_line(),
            entry: Some(entry),
        });
        self.dirty = true;
        true
    }

    /// Removes every entry keyed by the given UUID.
    ///
    /// Returns true if anything was removed.
    pub fn remove_uuid(&mut self, uuid: &str) -> bool {
        let before = self.lines.len();
        self.lines
            .retain(|l| l.entry.as_ref().is_none_or(|e| e.uuid() != Some(uuid)));

        let removed = self.lines.len() != before;
        if removed {
            self.dirty = true;
        }
        removed
    }

    /// Removes every entry matching the predicate, returning the removed
    /// entries. Lines without a parsed entry are never touched.
    pub fn remove_matching(
        &mut self,
        mut predicate: impl FnMut(&FstabEntry) -> bool,
    ) -> Vec<FstabEntry> {
        let mut removed = Vec::new();
        self.lines.retain(|l| match &l.entry {
            Some(entry) if predicate(entry) => {
                removed.push(entry.clone());
                false
            }
            _ => true,
        });

        if !removed.is_empty() {
            self.dirty = true;
        }
        removed
    }

    /// Writes the file back if anything changed since load.
    ///
    /// The content goes to `<path>.tmp` first and is renamed over the
    /// original, keeping the window against concurrent editors small. A
    /// clean file produces no write at all.
    ///
    /// Returns true if a write happened.
    pub fn save(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }

        let mut content = String::new();
        for line in &self.lines {
            content.push_str(&line.raw);
            content.push('\n');
        }

        let tmp_path = tmp_path_for(&self.path);
        fs::write(&tmp_path, &content).fstab_write_context(&tmp_path)?;
        fs::rename(&tmp_path, &self.path).fstab_write_context(&self.path)?;

        self.dirty = false;
        Ok(true)
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE_FSTAB: &str = "\
# /etc/fstab: static file system information.
#
# <file system>  <mount point>  <type>  <options>  <dump>  <pass>
UUID=abc-123 / ext4 errors=remount-ro 0 1
UUID=def-456 /boot/efi vfat umask=0077 0 1

UUID=6db3a2cf-54e4-41a5-8c6a-7f2e1d0b9c8e /mnt/storage-1 ext4 defaults 0 2
LABEL=backup   /media/backup   ext4   noauto   0   0
";

    fn sample_file() -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(SAMPLE_FSTAB.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_parse_entry_line() {
        let entry =
            FstabEntry::from_line("UUID=1234-5678 /mnt/storage-2 ext4 defaults 0 2").unwrap();

        assert_eq!(entry.fs_spec, "UUID=1234-5678");
        assert_eq!(entry.uuid(), Some("1234-5678"));
        assert_eq!(entry.mount_point, PathBuf::from("/mnt/storage-2"));
        assert_eq!(entry.vfs_type, "ext4");
        assert_eq!(entry.mount_options, "defaults");
        assert_eq!(entry.dump, 0);
        assert_eq!(entry.fsck_order, 2);
    }

    #[test]
    fn test_parse_skips_comments_and_garbage() {
        assert!(FstabEntry::from_line("# a comment").is_none());
        assert!(FstabEntry::from_line("").is_none());
        assert!(FstabEntry::from_line("   ").is_none());
        assert!(FstabEntry::from_line("too few fields").is_none());
        assert!(FstabEntry::from_line("UUID=x /mnt ext4 defaults zero 2").is_none());
    }

    #[test]
    fn test_for_uuid_line_shape() {
        let entry = FstabEntry::for_uuid("aaaa-bbbb", "/mnt/storage-3", "ext4");
        assert_eq!(
            entry.to_fstab_line(),
            "UUID=aaaa-bbbb /mnt/storage-3 ext4 defaults 0 2"
        );
    }

    #[test]
    fn test_escaped_mount_point_round_trip() {
        let entry = FstabEntry::from_line("UUID=1 /mnt/My\\040Drive ext4 defaults 0 2").unwrap();
        assert_eq!(entry.mount_point, PathBuf::from("/mnt/My Drive"));

        let line = entry.to_fstab_line();
        assert!(line.contains("/mnt/My\\040Drive"));
        assert!(!line.contains("/mnt/My Drive"));
    }

    #[test]
    fn test_append_is_idempotent_per_uuid() {
        let file = sample_file();
        let mut fstab = FstabFile::load(file.path()).unwrap();

        let entry = FstabEntry::for_uuid("new-uuid", "/mnt/storage-2", "ext4");
        assert!(fstab.append(entry.clone()));
        assert!(!fstab.append(entry));

        assert_eq!(
            fstab.entries().filter(|e| e.uuid() == Some("new-uuid")).count(),
            1
        );
    }

    #[test]
    fn test_remove_uuid() {
        let file = sample_file();
        let mut fstab = FstabFile::load(file.path()).unwrap();

        assert!(fstab.remove_uuid("6db3a2cf-54e4-41a5-8c6a-7f2e1d0b9c8e"));
        assert!(!fstab.remove_uuid("6db3a2cf-54e4-41a5-8c6a-7f2e1d0b9c8e"));
        assert!(!fstab.contains_uuid("6db3a2cf-54e4-41a5-8c6a-7f2e1d0b9c8e"));
    }

    #[test]
    fn test_rewrite_preserves_other_lines_byte_for_byte() {
        let file = sample_file();
        let mut fstab = FstabFile::load(file.path()).unwrap();

        fstab.remove_uuid("6db3a2cf-54e4-41a5-8c6a-7f2e1d0b9c8e");
        assert!(fstab.save().unwrap());

        let rewritten = fs::read_to_string(file.path()).unwrap();
        // The managed line is gone; everything else, including the oddly
        // spaced LABEL line and the comments, survives untouched.
        assert!(!rewritten.contains("6db3a2cf"));
        assert!(rewritten.contains("# /etc/fstab: static file system information."));
        assert!(rewritten.contains("UUID=abc-123 / ext4 errors=remount-ro 0 1"));
        assert!(rewritten.contains("LABEL=backup   /media/backup   ext4   noauto   0   0"));
    }

    #[test]
    fn test_save_without_changes_is_a_no_op() {
        let file = sample_file();
        let before = fs::read_to_string(file.path()).unwrap();

        let mut fstab = FstabFile::load(file.path()).unwrap();
        assert!(!fstab.save().unwrap());

        assert_eq!(fs::read_to_string(file.path()).unwrap(), before);
    }

    #[test]
    fn test_remove_matching_only_touches_entry_lines() {
        let file = sample_file();
        let mut fstab = FstabFile::load(file.path()).unwrap();

        let removed = fstab.remove_matching(|e| {
            e.uuid().is_some() && e.mount_point.starts_with("/mnt/storage-1")
        });

        assert_eq!(removed.len(), 1);
        assert_eq!(
            removed[0].uuid(),
            Some("6db3a2cf-54e4-41a5-8c6a-7f2e1d0b9c8e")
        );
        // Root and EFI entries are untouched.
        assert!(fstab.contains_uuid("abc-123"));
        assert!(fstab.contains_uuid("def-456"));
    }
}
