use std::fs::Metadata;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::cancellable::Cancellable;
use crate::error::{FileError, FileErrorKind, FileResult};
use crate::file::sys;
use crate::file::{File, FileQueryInfoFlags};
use crate::file_enumerator::FileEnumerator;
use crate::file_info::{attr, FileAttributeType, FileInfo, FileType};
use crate::iostream::{InputStream, OutputStream};
use crate::job::{CopyFlags, ProgressCallback};
use crate::location::Location;
use crate::metadata::{self, MimeResolver};
use crate::monitor::{FileMonitor, FileMonitorEvent};

/// Extended attribute namespace backing `metadata::*` keys.
const XATTR_METADATA_PREFIX: &str = "user.metadata.";
const XATTR_SELINUX: &str = "security.selinux";

impl InputStream for fs::File {
    fn close(&mut self, _cancellable: Option<&Cancellable>) -> FileResult<()> {
        Ok(())
    }
}

impl OutputStream for fs::File {
    fn close(&mut self, _cancellable: Option<&Cancellable>) -> FileResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn destination_path(destination: &dyn File) -> FileResult<PathBuf> {
    destination.location().to_path().ok_or_else(|| {
        FileError::new(
            FileErrorKind::NotSupported,
            format!("Cannot use {} as a local destination", destination.uri()),
        )
    })
}

/// True when `attributes` (a comma separated matcher list) selects `key`.
fn wants(attributes: &str, key: &str) -> bool {
    let namespace = key.split("::").next().unwrap_or(key);
    attributes.split(',').map(str::trim).any(|m| {
        m == "*"
            || m == key
            || m.strip_suffix("::*").map(|ns| ns == namespace).unwrap_or(false)
    })
}

fn file_type_of(meta: &Metadata) -> FileType {
    let ft = meta.file_type();
    if ft.is_dir() {
        FileType::Directory
    } else if ft.is_file() {
        FileType::Regular
    } else if ft.is_symlink() {
        FileType::SymbolicLink
    } else {
        FileType::Special
    }
}

fn special_mime_type(meta: &Metadata) -> &'static str {
    let ft = meta.file_type();
    if ft.is_block_device() {
        "inode/blockdevice"
    } else if ft.is_char_device() {
        "inode/chardevice"
    } else if ft.is_fifo() {
        "inode/fifo"
    } else if ft.is_socket() {
        "inode/socket"
    } else {
        metadata::OCTET_STREAM_MIME_TYPE
    }
}

fn sniff_file(path: &Path) -> String {
    use std::io::Read;

    let mut head = Vec::with_capacity(metadata::SNIFF_LENGTH);
    match std::fs::File::open(path) {
        Ok(f) => {
            if f.take(metadata::SNIFF_LENGTH as u64).read_to_end(&mut head).is_err() {
                return metadata::OCTET_STREAM_MIME_TYPE.to_string();
            }
            MimeResolver::sniff(&head)
        }
        Err(_) => metadata::OCTET_STREAM_MIME_TYPE.to_string(),
    }
}

/// `Some(info_file)` when `path` sits directly inside a freedesktop
/// `Trash/files` directory.
fn trash_info_path(path: &Path) -> Option<PathBuf> {
    let files_dir = path.parent()?;
    if files_dir.file_name()? != "files" {
        return None;
    }
    let trash_dir = files_dir.parent()?;
    if !trash_dir.file_name()?.to_string_lossy().starts_with("Trash")
        && !trash_dir.file_name()?.to_string_lossy().starts_with(".Trash")
    {
        return None;
    }
    let name = path.file_name()?.to_string_lossy();
    Some(trash_dir.join("info").join(format!("{}.trashinfo", name)))
}

fn add_trash_info(info: &mut FileInfo, path: &Path) {
    let Some(info_path) = trash_info_path(path) else {
        return;
    };
    let Ok(content) = std::fs::read_to_string(&info_path) else {
        return;
    };
    for line in content.lines() {
        if let Some(value) = line.strip_prefix("Path=") {
            if let Ok(decoded) = urlencoding::decode(value) {
                info.set_attribute(
                    attr::TRASH_ORIG_PATH,
                    FileAttributeType::ByteString(decoded.into_owned().into_bytes()),
                );
            }
        } else if let Some(value) = line.strip_prefix("DeletionDate=") {
            info.set_string(attr::TRASH_DELETION_DATE, value.trim());
        }
    }
}

fn query_info_blocking(path: &Path, attributes: &str, flags: FileQueryInfoFlags) -> FileResult<FileInfo> {
    let lmeta = std::fs::symlink_metadata(path)?;
    let is_symlink = lmeta.file_type().is_symlink();
    let followed = if is_symlink && !flags.contains(FileQueryInfoFlags::NOFOLLOW_SYMLINKS) {
        std::fs::metadata(path).ok()
    } else {
        Some(lmeta.clone())
    };
    let meta = followed.as_ref().unwrap_or(&lmeta);

    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_string());

    let mut info = FileInfo::new();
    info.set_name(&name);

    if wants(attributes, attr::STANDARD_TYPE) {
        let file_type = if followed.is_none() {
            FileType::SymbolicLink
        } else {
            file_type_of(meta)
        };
        info.set_display_name(&name);
        info.set_string(attr::STANDARD_EDIT_NAME, &name);
        info.set_file_type(file_type);
        info.set_size(meta.len());
        info.set_boolean(attr::STANDARD_IS_HIDDEN, name.starts_with('.'));
        info.set_boolean(attr::STANDARD_IS_BACKUP, name.ends_with('~'));
        info.set_boolean(attr::STANDARD_IS_SYMLINK, is_symlink);
        if is_symlink {
            if let Ok(target) = std::fs::read_link(path) {
                info.set_attribute(
                    attr::STANDARD_SYMLINK_TARGET,
                    FileAttributeType::ByteString(target.to_string_lossy().into_owned().into_bytes()),
                );
            }
        }

        let mime_type = match file_type {
            FileType::Directory => metadata::DIRECTORY_MIME_TYPE.to_string(),
            FileType::SymbolicLink => metadata::SYMLINK_MIME_TYPE.to_string(),
            FileType::Special => special_mime_type(meta).to_string(),
            _ => MimeResolver::guess_from_name(path).unwrap_or_else(|| sniff_file(path)),
        };
        info.set_string(attr::STANDARD_ICON, &MimeResolver::get_icon_name(&mime_type));
        info.set_content_type(&mime_type);
    }

    if wants(attributes, attr::TIME_MODIFIED) {
        info.set_modification_time(meta.mtime().max(0) as u64);
        info.set_uint64(attr::TIME_ACCESS, meta.atime().max(0) as u64);
        info.set_uint64(attr::TIME_CHANGED, meta.ctime().max(0) as u64);
    }

    if wants(attributes, attr::UNIX_MODE) {
        info.set_mode(meta.mode());
        info.set_uint32(attr::UNIX_UID, meta.uid());
        info.set_uint32(attr::UNIX_GID, meta.gid());
        let is_mountpoint = match path.parent() {
            Some(parent) => std::fs::metadata(parent)
                .map(|p| p.dev() != meta.dev())
                .unwrap_or(false),
            None => true,
        };
        info.set_boolean(attr::UNIX_IS_MOUNTPOINT, is_mountpoint);
    }

    if wants(attributes, attr::OWNER_USER) {
        if let Some(user) = sys::user_by_uid(meta.uid()) {
            info.set_string(attr::OWNER_USER, &user.name);
            info.set_string(attr::OWNER_USER_REAL, user.real_name.as_deref().unwrap_or(&user.name));
        }
        if let Some(group) = sys::group_by_gid(meta.gid()) {
            info.set_string(attr::OWNER_GROUP, &group.name);
        }
    }

    if wants(attributes, attr::ACCESS_CAN_READ) {
        info.set_boolean(attr::ACCESS_CAN_READ, sys::can_read(path));
        info.set_boolean(attr::ACCESS_CAN_WRITE, sys::can_write(path));
        info.set_boolean(attr::ACCESS_CAN_EXECUTE, sys::can_execute(path));
        let parent_writable = path.parent().map(sys::can_modify_entries).unwrap_or(false);
        info.set_boolean(attr::ACCESS_CAN_DELETE, parent_writable);
        info.set_boolean(attr::ACCESS_CAN_TRASH, parent_writable);
        info.set_boolean(attr::ACCESS_CAN_RENAME, parent_writable);
    }

    if wants(attributes, attr::SELINUX_CONTEXT) {
        if let Ok(Some(context)) = sys::get_xattr(path, XATTR_SELINUX) {
            let context = String::from_utf8_lossy(&context);
            info.set_string(attr::SELINUX_CONTEXT, context.trim_end_matches('\0'));
        }
    }

    if wants(attributes, attr::ID_FILESYSTEM) {
        info.set_string(attr::ID_FILESYSTEM, &format!("{:x}", meta.dev()));
    }

    if wants(attributes, attr::TRASH_ORIG_PATH) || wants(attributes, attr::TRASH_DELETION_DATE) {
        add_trash_info(&mut info, path);
    }

    if wants(attributes, "metadata::*") {
        for key in sys::list_xattrs(path).unwrap_or_default() {
            let Some(short) = key.strip_prefix(XATTR_METADATA_PREFIX) else {
                continue;
            };
            if let Ok(Some(value)) = sys::get_xattr(path, &key) {
                info.set_string(
                    &format!("{}{}", attr::METADATA_PREFIX, short),
                    &String::from_utf8_lossy(&value),
                );
            }
        }
    }

    Ok(info)
}

#[async_trait]
impl File for LocalFile {
    fn location(&self) -> Location {
        Location::for_path(&self.path)
    }

    async fn query_info(
        &self,
        attributes: &str,
        flags: FileQueryInfoFlags,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<FileInfo> {
        if let Some(c) = cancellable {
            c.check()?;
        }

        let path = self.path.clone();
        let attributes = attributes.to_string();
        tokio::task::spawn_blocking(move || query_info_blocking(&path, &attributes, flags))
            .await
            .map_err(|e| FileError::new(FileErrorKind::Failed, format!("Join error: {}", e)))?
    }

    async fn query_filesystem_info(
        &self,
        _attributes: &str,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<FileInfo> {
        if let Some(c) = cancellable {
            c.check()?;
        }

        let path = self.path.clone();
        let stats = tokio::task::spawn_blocking(move || sys::statvfs(&path))
            .await
            .map_err(|e| FileError::new(FileErrorKind::Failed, format!("Join error: {}", e)))??;

        let mut info = FileInfo::new();
        info.set_uint64(attr::FILESYSTEM_FREE, stats.free);
        info.set_uint64(attr::FILESYSTEM_SIZE, stats.size);
        Ok(info)
    }

    async fn read(&self, cancellable: Option<&Cancellable>) -> FileResult<Box<dyn InputStream>> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        let file = fs::File::open(&self.path).await?;
        Ok(Box::new(file))
    }

    async fn replace(&self, cancellable: Option<&Cancellable>) -> FileResult<Box<dyn OutputStream>> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .await?;
        Ok(Box::new(file))
    }

    async fn create_file(
        &self,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Box<dyn OutputStream>> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await?;
        Ok(Box::new(file))
    }

    async fn delete(&self, cancellable: Option<&Cancellable>) -> FileResult<()> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        let metadata = fs::symlink_metadata(&self.path).await?;
        if metadata.is_dir() {
            fs::remove_dir(&self.path).await?;
        } else {
            fs::remove_file(&self.path).await?;
        }
        Ok(())
    }

    async fn make_directory(&self, cancellable: Option<&Cancellable>) -> FileResult<()> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        fs::create_dir(&self.path).await?;
        Ok(())
    }

    async fn make_symbolic_link(
        &self,
        target: &str,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        fs::symlink(target, &self.path).await?;
        Ok(())
    }

    async fn enumerate_children(
        &self,
        attributes: &str,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Box<dyn FileEnumerator>> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        let read_dir = fs::read_dir(&self.path).await?;
        Ok(Box::new(LocalFileEnumerator {
            read_dir,
            attributes: attributes.to_string(),
        }))
    }

    async fn move_to(
        &self,
        destination: &dyn File,
        flags: CopyFlags,
        cancellable: Option<&Cancellable>,
        progress_callback: Option<&ProgressCallback>,
    ) -> FileResult<()> {
        if let Some(c) = cancellable {
            c.check()?;
        }

        let dest_path = destination_path(destination)?;
        if fs::symlink_metadata(&dest_path).await.is_ok() && !flags.contains(CopyFlags::OVERWRITE) {
            return Err(FileError::new(
                FileErrorKind::Exists,
                format!("{} already exists", dest_path.display()),
            ));
        }

        match fs::rename(&self.path, &dest_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
                if flags.contains(CopyFlags::NO_FALLBACK_FOR_MOVE) {
                    return Err(e.into());
                }
                // Cross-device: copy then delete, regular files only.
                self.copy(destination, flags, cancellable, progress_callback).await?;
                self.delete(cancellable).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn copy(
        &self,
        destination: &dyn File,
        flags: CopyFlags,
        cancellable: Option<&Cancellable>,
        progress_callback: Option<&ProgressCallback>,
    ) -> FileResult<()> {
        if let Some(c) = cancellable {
            c.check()?;
        }

        let source_meta = fs::symlink_metadata(&self.path).await?;
        if source_meta.is_dir() {
            return Err(FileError::new(
                FileErrorKind::IsDirectory,
                format!("Cannot copy directory {} as a file", self.path.display()),
            ));
        }

        if source_meta.file_type().is_symlink() {
            let dest_path = destination_path(destination)?;
            if flags.contains(CopyFlags::OVERWRITE) && fs::symlink_metadata(&dest_path).await.is_ok() {
                fs::remove_file(&dest_path).await?;
            }
            let target = fs::read_link(&self.path).await?;
            fs::symlink(target, &dest_path).await?;
            return Ok(());
        }

        // Open source
        let mut input = self.read(cancellable).await?;

        // Open destination
        let mut output = if flags.contains(CopyFlags::OVERWRITE) {
            destination.replace(cancellable).await?
        } else {
            destination.create_file(cancellable).await?
        };

        // Copy loop with progress
        let mut buffer = [0u8; 8192];
        let mut total_written = 0;
        let total_size = source_meta.len();

        loop {
            if let Some(c) = cancellable {
                c.check()?;
            }

            let n = input.read(&mut buffer).await?;
            if n == 0 {
                break;
            }

            output.write_all(&buffer[..n]).await?;
            total_written += n as u64;

            if let Some(cb) = progress_callback {
                cb(total_written, total_size);
            }
        }
        output.flush().await?;

        output.close(cancellable)?;
        input.close(cancellable)?;

        if !flags.contains(CopyFlags::TARGET_DEFAULT_PERMS) {
            let dest_path = destination_path(destination)?;
            fs::set_permissions(&dest_path, source_meta.permissions()).await?;
        }

        Ok(())
    }

    async fn exists(&self, cancellable: Option<&Cancellable>) -> FileResult<bool> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        Ok(fs::symlink_metadata(&self.path).await.is_ok())
    }

    async fn monitor(&self, cancellable: Option<&Cancellable>) -> FileResult<FileMonitor> {
        if let Some(c) = cancellable {
            c.check()?;
        }

        use notify::event::{ModifyKind, RenameMode};
        use notify::{EventKind, RecursiveMode, Watcher};
        use tokio::sync::mpsc;

        let (tx, rx) = mpsc::channel(100);

        // Create watcher with a closure that sends events to the tokio channel
        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("file monitor error: {}", e);
                    return;
                }
            };
            let first = event.paths.first().map(Location::for_path);
            let translated = match (event.kind, first) {
                (EventKind::Create(_), Some(loc)) => Some(FileMonitorEvent::Created(loc)),
                (EventKind::Remove(_), Some(loc)) => Some(FileMonitorEvent::Deleted(loc)),
                (EventKind::Modify(ModifyKind::Name(RenameMode::Both)), Some(loc)) => event
                    .paths
                    .get(1)
                    .map(|to| FileMonitorEvent::Moved(loc, Location::for_path(to))),
                (EventKind::Modify(ModifyKind::Name(RenameMode::From)), Some(loc)) => {
                    Some(FileMonitorEvent::Deleted(loc))
                }
                (EventKind::Modify(ModifyKind::Name(RenameMode::To)), Some(loc)) => {
                    Some(FileMonitorEvent::Created(loc))
                }
                (EventKind::Modify(ModifyKind::Metadata(_)), Some(loc)) => {
                    Some(FileMonitorEvent::AttributeChanged(loc))
                }
                (EventKind::Modify(_), Some(loc)) => Some(FileMonitorEvent::Changed(loc)),
                _ => None,
            };

            if let Some(e) = translated {
                // We are in notify's thread, so we can block
                let _ = tx.blocking_send(e);
            }
        })?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        Ok(FileMonitor::new(rx, cancellable.cloned(), Some(Box::new(watcher))))
    }

    async fn set_display_name(
        &self,
        display_name: &str,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Location> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        if display_name.is_empty() || display_name.contains('/') {
            return Err(FileError::new(
                FileErrorKind::InvalidArg,
                format!("Invalid filename {}", display_name),
            ));
        }

        let parent = self.path.parent().ok_or_else(|| {
            FileError::new(FileErrorKind::NotSupported, "Cannot rename the root directory")
        })?;
        let new_path = parent.join(display_name);
        if new_path != self.path && fs::symlink_metadata(&new_path).await.is_ok() {
            return Err(FileError::new(
                FileErrorKind::Exists,
                format!("A file named \u{201c}{}\u{201d} already exists", display_name),
            ));
        }
        fs::rename(&self.path, &new_path).await?;
        Ok(Location::for_path(new_path))
    }

    async fn set_attribute(
        &self,
        attribute: &str,
        value: &FileAttributeType,
        _flags: FileQueryInfoFlags,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        if let Some(c) = cancellable {
            c.check()?;
        }

        match (attribute, value) {
            (attr::UNIX_MODE, FileAttributeType::Uint32(mode)) => {
                fs::set_permissions(&self.path, std::fs::Permissions::from_mode(*mode)).await?;
                Ok(())
            }
            (attr::UNIX_UID, FileAttributeType::Uint32(uid)) => {
                sys::chown(&self.path, Some(*uid), None)?;
                Ok(())
            }
            (attr::UNIX_GID, FileAttributeType::Uint32(gid)) => {
                sys::chown(&self.path, None, Some(*gid))?;
                Ok(())
            }
            (key, value) if key.starts_with(attr::METADATA_PREFIX) => {
                let xattr = format!("{}{}", XATTR_METADATA_PREFIX, &key[attr::METADATA_PREFIX.len()..]);
                match value {
                    FileAttributeType::String(s) => sys::set_xattr(&self.path, &xattr, s.as_bytes())?,
                    FileAttributeType::Invalid => sys::remove_xattr(&self.path, &xattr)?,
                    _ => {
                        return Err(FileError::new(
                            FileErrorKind::InvalidArg,
                            format!("Unsupported value type for {}", key),
                        ))
                    }
                }
                Ok(())
            }
            _ => Err(FileError::new(
                FileErrorKind::NotSupported,
                format!("Setting attribute {} not supported", attribute),
            )),
        }
    }
}

struct LocalFileEnumerator {
    read_dir: fs::ReadDir,
    attributes: String,
}

#[async_trait]
impl FileEnumerator for LocalFileEnumerator {
    async fn next_file(
        &mut self,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Option<(FileInfo, Location)>> {
        loop {
            if let Some(c) = cancellable {
                c.check()?;
            }

            let Some(entry) = self.read_dir.next_entry().await? else {
                return Ok(None);
            };
            let path = entry.path();
            let attributes = self.attributes.clone();
            let query_path = path.clone();
            let result = tokio::task::spawn_blocking(move || {
                query_info_blocking(&query_path, &attributes, FileQueryInfoFlags::NONE)
            })
            .await
            .map_err(|e| FileError::new(FileErrorKind::Failed, format!("Join error: {}", e)))?;

            match result {
                Ok(info) => return Ok(Some((info, Location::for_path(path)))),
                // Removed between readdir and stat.
                Err(e) if e.kind() == FileErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            }
        }
    }

    async fn close(&mut self, _cancellable: Option<&Cancellable>) -> FileResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_matcher() {
        assert!(wants("standard::*", attr::STANDARD_TYPE));
        assert!(wants("*", attr::UNIX_MODE));
        assert!(wants("time::modified,unix::mode", attr::UNIX_MODE));
        assert!(!wants("standard::name", attr::STANDARD_TYPE));
        assert!(!wants("standard::*", attr::UNIX_MODE));
    }

    #[test]
    fn trash_info_only_inside_trash_files() {
        let p = Path::new("/home/u/.local/share/Trash/files/a.txt");
        assert_eq!(
            trash_info_path(p),
            Some(PathBuf::from("/home/u/.local/share/Trash/info/a.txt.trashinfo"))
        );
        assert!(trash_info_path(Path::new("/home/u/files/a.txt")).is_none());
    }
}
