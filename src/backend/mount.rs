//! Mount table backend
//!
//! Reads the kernel mount table and answers which mount encloses a
//! location. Unmounting shells out to `umount`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cancellable::Cancellable;
use crate::error::{FileError, FileErrorKind, FileResult};
use crate::location::Location;
use crate::mount::{Mount, Mounter};

const PROC_MOUNTS: &str = "/proc/self/mounts";

/// Pseudo filesystems never shown as mounts.
const IGNORED_FS_TYPES: &[&str] = &[
    "proc", "sysfs", "cgroup", "cgroup2", "devpts", "securityfs", "pstore", "bpf", "tracefs",
    "debugfs", "mqueue", "hugetlbfs", "configfs", "fusectl", "autofs", "binfmt_misc",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
}

/// Decodes the octal escapes (`\040` for space) used in the mount table.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let oct = std::str::from_utf8(&bytes[i + 1..i + 4]).unwrap_or("");
            if let Ok(v) = u8::from_str_radix(oct, 8) {
                out.push(v);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub fn parse_mount_table(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            Some(MountEntry {
                device: unescape(device),
                mount_point: PathBuf::from(unescape(mount_point)),
                fs_type: fs_type.to_string(),
            })
        })
        .collect()
}

#[derive(Debug)]
pub struct UnixMount {
    entry: MountEntry,
}

impl UnixMount {
    pub fn entry(&self) -> &MountEntry {
        &self.entry
    }
}

#[async_trait]
impl Mount for UnixMount {
    fn root(&self) -> Location {
        Location::for_path(&self.entry.mount_point)
    }

    fn name(&self) -> String {
        if self.entry.mount_point == PathBuf::from("/") {
            return "File System".to_string();
        }
        self.root().basename()
    }

    fn icon(&self) -> String {
        match self.entry.fs_type.as_str() {
            "nfs" | "nfs4" | "cifs" | "smb3" | "sshfs" | "fuse.sshfs" => "folder-remote".to_string(),
            "iso9660" | "udf" => "media-optical".to_string(),
            _ => "drive-harddisk".to_string(),
        }
    }

    fn can_unmount(&self) -> bool {
        self.entry.mount_point != PathBuf::from("/")
    }

    async fn unmount(&self, cancellable: Option<&Cancellable>) -> FileResult<()> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        if !self.can_unmount() {
            return Err(FileError::new(FileErrorKind::NotSupported, "Mount cannot be unmounted"));
        }

        let output = tokio::process::Command::new("umount")
            .arg(&self.entry.mount_point)
            .output()
            .await?;
        if !output.status.success() {
            return Err(FileError::new(
                FileErrorKind::Failed,
                format!(
                    "Failed to unmount {}: {}",
                    self.entry.mount_point.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(())
    }
}

/// `Mounter` over the kernel mount table.
pub struct MountTable {
    source: PathBuf,
}

impl MountTable {
    pub fn new() -> Self {
        Self {
            source: PathBuf::from(PROC_MOUNTS),
        }
    }

    /// Reads mounts from another file in mount-table format.
    pub fn with_source(source: impl Into<PathBuf>) -> Self {
        Self { source: source.into() }
    }

    pub async fn entries(&self) -> FileResult<Vec<MountEntry>> {
        let content = tokio::fs::read_to_string(&self.source).await?;
        Ok(parse_mount_table(&content)
            .into_iter()
            .filter(|e| !IGNORED_FS_TYPES.contains(&e.fs_type.as_str()))
            .collect())
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mounter for MountTable {
    async fn find_enclosing_mount(
        &self,
        location: &Location,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Option<Arc<dyn Mount>>> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        let Some(path) = location.to_path() else {
            return Ok(None);
        };

        // Longest mount point wins; later entries shadow earlier ones.
        let best = self
            .entries()
            .await?
            .into_iter()
            .filter(|e| path.starts_with(&e.mount_point))
            .fold(None::<MountEntry>, |best, e| match best {
                Some(b) if b.mount_point.as_os_str().len() > e.mount_point.as_os_str().len() => Some(b),
                _ => Some(e),
            });

        Ok(best.map(|entry| Arc::new(UnixMount { entry }) as Arc<dyn Mount>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
sysfs /sys sysfs rw,nosuid 0 0
/dev/sda1 / ext4 rw,relatime 0 0
/dev/sdb1 /media/user/My\\040Disk vfat rw 0 0
/dev/sdc1 /media/user/My\\040Disk/inner ext4 rw 0 0
";

    #[test]
    fn parses_escaped_mount_points() {
        let entries = parse_mount_table(TABLE);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[2].mount_point, PathBuf::from("/media/user/My Disk"));
        assert_eq!(entries[2].fs_type, "vfat");
    }

    #[tokio::test]
    async fn finds_longest_enclosing_mount() {
        let dir = tempfile::tempdir().expect("tempdir");
        let table = dir.path().join("mounts");
        tokio::fs::write(&table, TABLE).await.expect("write table");
        let mounter = MountTable::with_source(&table);

        let mount = mounter
            .find_enclosing_mount(&Location::for_path("/media/user/My Disk/photos/a.jpg"), None)
            .await
            .expect("lookup")
            .expect("mount");
        assert_eq!(mount.root(), Location::for_path("/media/user/My Disk"));
        assert_eq!(mount.name(), "My Disk");

        let root = mounter
            .find_enclosing_mount(&Location::for_path("/etc/passwd"), None)
            .await
            .expect("lookup")
            .expect("mount");
        assert!(!root.can_unmount());
    }
}
