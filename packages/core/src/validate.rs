//! Device path validation.
//!
//! Every device string entering the library is checked against the accepted
//! naming grammars before it is interpolated into any command line:
//!
//! - traditional: `/dev/[svx]d[a-z]+[0-9]*` (e.g. `/dev/sda`, `/dev/vdb2`)
//! - NVMe: `/dev/nvme[0-9]+n[0-9]+(p[0-9]+)?` (e.g. `/dev/nvme0n1p2`)
//!
//! Anything else, including shell metacharacters appended to a valid prefix,
//! is rejected. No filesystem or network access happens here.

use crate::error::{Error, Result};

/// Checks a device path against the accepted naming grammars.
pub fn validate_device_path(path: &str) -> Result<()> {
    let valid = path
        .strip_prefix("/dev/")
        .is_some_and(|name| is_sd_name(name) || is_nvme_name(name));

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidPath {
            path: path.to_string(),
        })
    }
}

/// Resolves a partition path to its owning disk path by stripping the
/// partition-number suffix. Whole-disk paths are returned unchanged.
pub fn parent_device(path: &str) -> String {
    let name = path.strip_prefix("/dev/").unwrap_or(path);

    if name.starts_with("nvme") {
        // nvme0n1p2 -> nvme0n1; nvme0n1 stays as-is
        if let Some(idx) = name.rfind('p') {
            let suffix = &name[idx + 1..];
            if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
                return format!("/dev/{}", &name[..idx]);
            }
        }
        format!("/dev/{}", name)
    } else {
        // sdb1 -> sdb; sdb stays as-is
        format!("/dev/{}", name.trim_end_matches(|c: char| c.is_ascii_digit()))
    }
}

/// `[svx]d[a-z]+[0-9]*`
fn is_sd_name(name: &str) -> bool {
    let mut chars = name.chars();
    if !matches!(chars.next(), Some('s' | 'v' | 'x')) {
        return false;
    }
    if chars.next() != Some('d') {
        return false;
    }

    let rest = chars.as_str();
    let letters = rest
        .chars()
        .take_while(|c| c.is_ascii_lowercase())
        .count();
    if letters == 0 {
        return false;
    }

    rest[letters..].chars().all(|c| c.is_ascii_digit())
}

/// `nvme[0-9]+n[0-9]+(p[0-9]+)?`
fn is_nvme_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("nvme") else {
        return false;
    };
    let (controller, rest) = split_digits(rest);
    if controller.is_empty() {
        return false;
    }

    let Some(rest) = rest.strip_prefix('n') else {
        return false;
    };
    let (namespace, rest) = split_digits(rest);
    if namespace.is_empty() {
        return false;
    }
    if rest.is_empty() {
        return true;
    }

    let Some(rest) = rest.strip_prefix('p') else {
        return false;
    };
    let (partition, rest) = split_digits(rest);
    !partition.is_empty() && rest.is_empty()
}

/// Splits off the leading run of ASCII digits.
fn split_digits(s: &str) -> (&str, &str) {
    let end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    s.split_at(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_traditional_names() {
        for path in [
            "/dev/sda",
            "/dev/sda1",
            "/dev/sdb12",
            "/dev/sdaa",
            "/dev/sdaa3",
            "/dev/vda1",
            "/dev/xdb",
        ] {
            assert!(validate_device_path(path).is_ok(), "{path} should be valid");
        }
    }

    #[test]
    fn test_accepts_nvme_names() {
        for path in [
            "/dev/nvme0n1",
            "/dev/nvme0n1p1",
            "/dev/nvme1n2p12",
            "/dev/nvme10n1",
        ] {
            assert!(validate_device_path(path).is_ok(), "{path} should be valid");
        }
    }

    #[test]
    fn test_rejects_everything_else() {
        for path in [
            "",
            "/dev/",
            "/dev/sd",
            "/dev/sdA1",
            "/dev/sd1",
            "/dev/hda1",
            "/dev/mmcblk0p1",
            "dev/sda1",
            "/dev/nvme0",
            "/dev/nvme0n",
            "/dev/nvme0n1p",
            "/dev/nvmen1",
            "/dev/nvme0m1",
            "/etc/passwd",
        ] {
            assert!(
                matches!(
                    validate_device_path(path),
                    Err(Error::InvalidPath { .. })
                ),
                "{path:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_shell_metacharacters() {
        for path in [
            "/dev/sda1; rm -rf /",
            "/dev/sda1|id",
            "/dev/sda1`id`",
            "/dev/sda1 ",
            " /dev/sda1",
            "/dev/sda1$(id)",
            "/dev/sda1&&true",
            "/dev/nvme0n1p1;reboot",
        ] {
            assert!(
                matches!(
                    validate_device_path(path),
                    Err(Error::InvalidPath { .. })
                ),
                "{path:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parent_device_traditional() {
        assert_eq!(parent_device("/dev/sda1"), "/dev/sda");
        assert_eq!(parent_device("/dev/sdb12"), "/dev/sdb");
        assert_eq!(parent_device("/dev/sdc"), "/dev/sdc");
        assert_eq!(parent_device("/dev/vda3"), "/dev/vda");
    }

    #[test]
    fn test_parent_device_nvme() {
        assert_eq!(parent_device("/dev/nvme0n1p2"), "/dev/nvme0n1");
        assert_eq!(parent_device("/dev/nvme1n2p12"), "/dev/nvme1n2");
        // No partition suffix to strip
        assert_eq!(parent_device("/dev/nvme0n1"), "/dev/nvme0n1");
    }
}
