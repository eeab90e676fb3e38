//! Cached file records
//!
//! A [`FileRecord`] holds the best known metadata of one location. Records
//! are created by the [`FileCache`](crate::model::cache::FileCache), shared
//! through `Arc`, and kept by their directory only weakly. Attribute
//! categories are fetched lazily by the cache's refresh worker; a record
//! tracks which categories are up to date and emits [`FileEvent`]s when
//! something observable changes.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use bitflags::bitflags;
use tokio::sync::{broadcast, Notify};

use crate::cancellable::Cancellable;
use crate::error::{FileError, FileErrorKind, FileResult};
use crate::file::sys;
use crate::file::FileQueryInfoFlags;
use crate::file_info::{attr, FileAttributeType, FileInfo, FileType};
use crate::intern::intern;
use crate::location::{Location, SEARCH_SCHEME};
use crate::metadata::{MimeResolver, DESKTOP_MIME_TYPE, SAVED_SEARCH_MIME_TYPE};
use crate::model::attributes::{Attributes, DeepCounts, Knowledge};
use crate::model::cache::CacheInner;
use crate::model::directory::{Directory, DirectoryEvent};
use crate::model::link::{self, DesktopLink};
use crate::model::sort::collation_key;
use crate::service::{places, trash};
use crate::undo::{UndoInfo, UndoOp, UndoScope};

pub type FileId = u64;

static NEXT_MONITOR_ID: AtomicU64 = AtomicU64::new(1);

/// The variant a record belongs to. Behaviour that differs between kinds
/// dispatches on this tag.
#[derive(Debug, Clone)]
pub enum FileKind {
    /// An ordinary file reached through a backend.
    Vfs,
    /// A virtual icon on the desktop.
    DesktopIcon(Arc<dyn DesktopLink>),
    /// The root of a search result listing.
    SearchDirectory,
    /// A stored search query.
    SavedSearch,
}

impl FileKind {
    pub(crate) fn for_location(location: &Location) -> Self {
        if location.scheme() == SEARCH_SCHEME {
            FileKind::SearchDirectory
        } else if location.basename().ends_with(".savedSearch") {
            FileKind::SavedSearch
        } else {
            FileKind::Vfs
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEvent {
    Changed,
    UpdatedDeepCountInProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    Modified,
    Accessed,
    Changed,
    Trashed,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const CAN_READ = 1 << 0;
        const CAN_WRITE = 1 << 1;
        const CAN_EXECUTE = 1 << 2;
        const CAN_DELETE = 1 << 3;
        const CAN_TRASH = 1 << 4;
        const CAN_RENAME = 1 << 5;
        const CAN_MOUNT = 1 << 6;
        const CAN_UNMOUNT = 1 << 7;
        const CAN_EJECT = 1 << 8;
    }
}

impl AccessFlags {
    /// Assumed when the backend does not say.
    const DEFAULT: AccessFlags = AccessFlags::CAN_READ
        .union(AccessFlags::CAN_WRITE)
        .union(AccessFlags::CAN_EXECUTE)
        .union(AccessFlags::CAN_DELETE)
        .union(AccessFlags::CAN_TRASH)
        .union(AccessFlags::CAN_RENAME);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationKind {
    Rename,
    SetAttributes,
}

pub(crate) struct FileDetails {
    pub(crate) location: Location,
    pub(crate) name: Arc<str>,
    pub(crate) display_name: Option<Arc<str>>,
    pub(crate) edit_name: Option<String>,
    pub(crate) collation_key: String,
    pub(crate) file_type: FileType,
    pub(crate) size: i64,
    pub(crate) sort_order: i32,
    pub(crate) mtime: i64,
    pub(crate) atime: i64,
    pub(crate) ctime: i64,
    pub(crate) trash_time: i64,
    pub(crate) trash_orig_path: Option<String>,
    pub(crate) mime_type: Option<Arc<str>>,
    pub(crate) has_permissions: bool,
    pub(crate) permissions: u32,
    pub(crate) uid: i64,
    pub(crate) gid: i64,
    pub(crate) owner: Option<Arc<str>>,
    pub(crate) owner_real: Option<Arc<str>>,
    pub(crate) group: Option<Arc<str>>,
    pub(crate) access: AccessFlags,
    pub(crate) symlink_target: Option<String>,
    pub(crate) selinux_context: Option<String>,
    pub(crate) filesystem_id: Option<Arc<str>>,
    pub(crate) free_space: Knowledge<u64>,
    pub(crate) icon_name: Option<String>,
    pub(crate) custom_icon: Option<String>,
    pub(crate) custom_name: Option<String>,
    pub(crate) thumbnail_path: Option<PathBuf>,
    pub(crate) thumbnailing_failed: bool,
    pub(crate) description: Option<String>,
    pub(crate) activation_uri: Option<String>,
    pub(crate) metadata: BTreeMap<String, String>,
    pub(crate) emblems: Vec<String>,
    pub(crate) extension_attributes: HashMap<String, String>,

    pub(crate) got_file_info: bool,
    pub(crate) get_info_failed: bool,
    pub(crate) info_error: Option<FileError>,
    pub(crate) is_gone: bool,
    pub(crate) is_symlink: bool,
    pub(crate) is_hidden: bool,
    pub(crate) is_mountpoint: bool,
    pub(crate) up_to_date: Attributes,
    pub(crate) requested: Attributes,

    pub(crate) item_count: Knowledge<u32>,
    pub(crate) deep_counts: DeepCounts,
    pub(crate) mime_list: Option<Vec<Arc<str>>>,
    pub(crate) top_left_text: Option<String>,
    pub(crate) link_name: Option<String>,
    pub(crate) link_icon: Option<String>,
    pub(crate) mount_root: Option<Location>,
}

impl FileDetails {
    fn new(location: Location) -> Self {
        let name = intern(&location.basename());
        Self {
            collation_key: collation_key(&name),
            location,
            name,
            display_name: None,
            edit_name: None,
            file_type: FileType::Unknown,
            size: -1,
            sort_order: 0,
            mtime: 0,
            atime: 0,
            ctime: 0,
            trash_time: 0,
            trash_orig_path: None,
            mime_type: None,
            has_permissions: false,
            permissions: 0,
            uid: -1,
            gid: -1,
            owner: None,
            owner_real: None,
            group: None,
            access: AccessFlags::DEFAULT,
            symlink_target: None,
            selinux_context: None,
            filesystem_id: None,
            free_space: Knowledge::Unknown,
            icon_name: None,
            custom_icon: None,
            custom_name: None,
            thumbnail_path: None,
            thumbnailing_failed: false,
            description: None,
            activation_uri: None,
            metadata: BTreeMap::new(),
            emblems: Vec::new(),
            extension_attributes: HashMap::new(),
            got_file_info: false,
            get_info_failed: false,
            info_error: None,
            is_gone: false,
            is_symlink: false,
            is_hidden: false,
            is_mountpoint: false,
            up_to_date: Attributes::empty(),
            requested: Attributes::empty(),
            item_count: Knowledge::Unknown,
            deep_counts: DeepCounts::default(),
            mime_list: None,
            top_left_text: None,
            link_name: None,
            link_icon: None,
            mount_root: None,
        }
    }

    /// The name shown to users: a custom name, then a desktop file's
    /// `Name=`, then the backend's display name.
    fn visible_name(&self) -> &str {
        self.custom_name
            .as_deref()
            .or(self.link_name.as_deref())
            .or(self.display_name.as_deref())
            .unwrap_or(&self.name)
    }

    fn refresh_collation_key(&mut self) {
        self.collation_key = collation_key(self.visible_name());
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot != value {
        *slot = value;
        true
    } else {
        false
    }
}

pub struct FileRecord {
    id: FileId,
    kind: FileKind,
    self_owned: bool,
    cache: Weak<CacheInner>,
    directory: RwLock<Weak<Directory>>,
    details: RwLock<FileDetails>,
    operations: Mutex<Vec<(OperationKind, Cancellable)>>,
    monitors: Mutex<Vec<(u64, Attributes)>>,
    events: broadcast::Sender<FileEvent>,
    ready: Notify,
}

impl fmt::Debug for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRecord")
            .field("id", &self.id)
            .field("location", &self.location())
            .field("kind", &self.kind)
            .finish()
    }
}

/// Keeps attribute categories wanted by the refresh worker while alive.
pub struct AttributeMonitor {
    record: Weak<FileRecord>,
    id: u64,
}

impl Drop for AttributeMonitor {
    fn drop(&mut self) {
        if let Some(record) = self.record.upgrade() {
            record.lock_monitors().retain(|(id, _)| *id != self.id);
        }
    }
}

struct OperationGuard<'a> {
    record: &'a FileRecord,
    cancellable: Cancellable,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        let id = self.cancellable.id();
        self.record
            .lock_operations()
            .retain(|(_, c)| c.id() != id);
    }
}

impl FileRecord {
    pub(crate) fn new(
        id: FileId,
        kind: FileKind,
        location: Location,
        self_owned: bool,
        cache: Weak<CacheInner>,
        directory: Weak<Directory>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            id,
            kind,
            self_owned,
            cache,
            directory: RwLock::new(directory),
            details: RwLock::new(FileDetails::new(location)),
            operations: Mutex::new(Vec::new()),
            monitors: Mutex::new(Vec::new()),
            events,
            ready: Notify::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, FileDetails> {
        self.details.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FileDetails> {
        self.details.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_operations(&self) -> MutexGuard<'_, Vec<(OperationKind, Cancellable)>> {
        self.operations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_monitors(&self) -> MutexGuard<'_, Vec<(u64, Attributes)>> {
        self.monitors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn with_details<R>(&self, f: impl FnOnce(&FileDetails) -> R) -> R {
        f(&self.read())
    }

    pub(crate) fn with_details_mut<R>(&self, f: impl FnOnce(&mut FileDetails) -> R) -> R {
        f(&mut self.write())
    }

    fn cache(&self) -> FileResult<Arc<CacheInner>> {
        self.cache
            .upgrade()
            .ok_or_else(|| FileError::new(FileErrorKind::Failed, "The file cache has been dropped"))
    }

    // Identity

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn kind(&self) -> &FileKind {
        &self.kind
    }

    pub fn location(&self) -> Location {
        self.read().location.clone()
    }

    pub fn uri(&self) -> String {
        self.read().location.uri()
    }

    pub fn name(&self) -> Arc<str> {
        self.read().name.clone()
    }

    pub fn display_name(&self) -> String {
        if let FileKind::DesktopIcon(link) = &self.kind {
            return link.display_name();
        }
        self.read().visible_name().to_string()
    }

    pub fn edit_name(&self) -> String {
        let d = self.read();
        d.edit_name.clone().unwrap_or_else(|| d.name.to_string())
    }

    pub(crate) fn collation_key(&self) -> String {
        if let FileKind::DesktopIcon(link) = &self.kind {
            return collation_key(&link.display_name());
        }
        self.read().collation_key.clone()
    }

    pub fn directory(&self) -> Option<Arc<Directory>> {
        self.directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
    }

    pub(crate) fn set_directory(&self, directory: &Arc<Directory>) {
        *self.directory.write().unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(directory);
    }

    pub fn parent_location(&self) -> Option<Location> {
        if self.self_owned {
            return None;
        }
        self.read().location.parent()
    }

    /// True when the record stands for the directory it lives in.
    pub fn is_self_owned(&self) -> bool {
        self.self_owned
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FileEvent> {
        self.events.subscribe()
    }

    // Readers

    pub fn is_gone(&self) -> bool {
        self.read().is_gone
    }

    pub fn got_file_info(&self) -> bool {
        self.read().got_file_info
    }

    pub fn get_info_failed(&self) -> bool {
        self.read().get_info_failed
    }

    pub fn info_error(&self) -> Option<FileError> {
        self.read().info_error.as_ref().map(FileError::shallow_clone)
    }

    pub fn file_type(&self) -> FileType {
        self.read().file_type
    }

    pub fn is_directory(&self) -> bool {
        self.read().file_type == FileType::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.read().is_symlink
    }

    pub fn is_hidden(&self) -> bool {
        self.read().is_hidden
    }

    pub fn is_mountpoint(&self) -> bool {
        self.read().is_mountpoint
    }

    /// Size in bytes, `-1` when unknown.
    pub fn size(&self) -> i64 {
        self.read().size
    }

    pub fn sort_order(&self) -> i32 {
        self.read().sort_order
    }

    pub fn mtime(&self) -> i64 {
        self.read().mtime
    }

    /// Seconds since the epoch, `0` when unknown.
    pub fn time(&self, kind: DateKind) -> i64 {
        let d = self.read();
        match kind {
            DateKind::Modified => d.mtime,
            DateKind::Accessed => d.atime,
            DateKind::Changed => d.ctime,
            DateKind::Trashed => d.trash_time,
        }
    }

    pub(crate) fn size_knowledge(&self) -> Knowledge<i64> {
        let d = self.read();
        if d.get_info_failed {
            Knowledge::Unknowable
        } else if !d.got_file_info {
            Knowledge::Unknown
        } else if d.size == -1 {
            Knowledge::Unknowable
        } else {
            Knowledge::Known(d.size)
        }
    }

    pub(crate) fn time_knowledge(&self, kind: DateKind) -> Knowledge<i64> {
        {
            let d = self.read();
            if d.get_info_failed {
                return Knowledge::Unknowable;
            }
            if !d.got_file_info {
                return Knowledge::Unknown;
            }
        }
        match self.time(kind) {
            0 => Knowledge::Unknowable,
            t => Knowledge::Known(t),
        }
    }

    /// Permission bits (`0o7777` range), when the backend reported them.
    pub fn permissions(&self) -> Option<u32> {
        let d = self.read();
        d.has_permissions.then_some(d.permissions & 0o7777)
    }

    pub fn uid(&self) -> i64 {
        self.read().uid
    }

    pub fn gid(&self) -> i64 {
        self.read().gid
    }

    pub fn owner_name(&self) -> Option<String> {
        self.read().owner.as_deref().map(str::to_string)
    }

    pub fn owner_real_name(&self) -> Option<String> {
        self.read().owner_real.as_deref().map(str::to_string)
    }

    pub fn group_name(&self) -> Option<String> {
        self.read().group.as_deref().map(str::to_string)
    }

    pub fn mime_type(&self) -> Option<Arc<str>> {
        self.read().mime_type.clone()
    }

    /// Human readable type, `None` while the MIME type is unknown.
    pub fn type_description(&self) -> Option<String> {
        if self.is_directory() {
            return Some(MimeResolver::describe(crate::metadata::DIRECTORY_MIME_TYPE));
        }
        self.mime_type().map(|m| MimeResolver::describe(&m))
    }

    pub fn description(&self) -> Option<String> {
        self.read().description.clone()
    }

    pub fn icon_name(&self) -> Option<String> {
        if let FileKind::DesktopIcon(link) = &self.kind {
            return link.icon();
        }
        let d = self.read();
        d.custom_icon
            .clone()
            .or_else(|| d.link_icon.clone())
            .or_else(|| d.icon_name.clone())
    }

    pub fn access(&self) -> AccessFlags {
        self.read().access
    }

    pub fn can_read(&self) -> bool {
        self.access().contains(AccessFlags::CAN_READ)
    }

    pub fn can_write(&self) -> bool {
        self.access().contains(AccessFlags::CAN_WRITE)
    }

    pub fn can_delete(&self) -> bool {
        !self.self_owned && self.access().contains(AccessFlags::CAN_DELETE)
    }

    pub fn can_trash(&self) -> bool {
        !self.self_owned && self.access().contains(AccessFlags::CAN_TRASH)
    }

    pub fn can_rename(&self) -> bool {
        match &self.kind {
            FileKind::DesktopIcon(link) => link.can_rename(),
            FileKind::SearchDirectory => false,
            _ => !self.self_owned && self.access().contains(AccessFlags::CAN_RENAME),
        }
    }

    /// Local files can only be changed by their owner or root. Remote
    /// files are assumed changeable.
    pub fn can_set_permissions(&self) -> bool {
        let d = self.read();
        if !d.location.is_native() {
            return true;
        }
        let euid = i64::from(sys::effective_uid());
        d.uid == -1 || d.uid == euid || euid == 0
    }

    pub fn can_set_owner(&self) -> bool {
        self.read().uid != -1 && sys::effective_uid() == 0
    }

    pub fn can_set_group(&self) -> bool {
        let d = self.read();
        if d.gid == -1 {
            return false;
        }
        let euid = sys::effective_uid();
        if euid == 0 {
            return true;
        }
        d.uid == i64::from(euid) && !sys::current_groups().is_empty()
    }

    pub fn symlink_target(&self) -> Option<String> {
        self.read().symlink_target.clone()
    }

    pub fn selinux_context(&self) -> Option<String> {
        self.read().selinux_context.clone()
    }

    pub fn filesystem_id(&self) -> Option<Arc<str>> {
        self.read().filesystem_id.clone()
    }

    pub fn free_space(&self) -> Knowledge<u64> {
        self.read().free_space
    }

    pub fn thumbnail_path(&self) -> Option<PathBuf> {
        self.read().thumbnail_path.clone()
    }

    pub fn is_thumbnailing_failed(&self) -> bool {
        self.read().thumbnailing_failed
    }

    pub fn activation_uri(&self) -> Option<String> {
        if let FileKind::DesktopIcon(link) = &self.kind {
            return link.activation_uri();
        }
        self.read().activation_uri.clone()
    }

    pub fn trash_original_path(&self) -> Option<String> {
        self.read().trash_orig_path.clone()
    }

    pub fn directory_item_count(&self) -> Knowledge<u32> {
        self.read().item_count
    }

    pub fn deep_counts(&self) -> DeepCounts {
        self.read().deep_counts
    }

    pub fn mime_list(&self) -> Option<Vec<Arc<str>>> {
        self.read().mime_list.clone()
    }

    pub fn top_left_text(&self) -> Option<String> {
        self.read().top_left_text.clone()
    }

    pub fn mount_root(&self) -> Option<Location> {
        self.read().mount_root.clone()
    }

    pub fn metadata(&self, key: &str) -> Option<String> {
        self.read().metadata.get(key).cloned()
    }

    pub fn emblems(&self) -> Vec<String> {
        self.read().emblems.clone()
    }

    pub fn extension_attribute(&self, name: &str) -> Option<String> {
        self.read().extension_attributes.get(name).cloned()
    }

    pub fn has_custom_display_name(&self) -> bool {
        let d = self.read();
        d.custom_name.is_some() || d.link_name.is_some()
    }

    pub fn is_desktop_file(&self) -> bool {
        self.mime_type().as_deref() == Some(DESKTOP_MIME_TYPE)
    }

    pub fn is_saved_search(&self) -> bool {
        matches!(self.kind, FileKind::SavedSearch)
            || self.mime_type().as_deref() == Some(SAVED_SEARCH_MIME_TYPE)
    }

    fn is_renameable_desktop_file(&self) -> bool {
        self.is_desktop_file() && self.read().location.is_native()
    }

    pub fn is_in_trash(&self) -> bool {
        let (Some(cache), Some(path)) = (self.cache.upgrade(), self.read().location.to_path()) else {
            return false;
        };
        let files = cache.config().trash_files_dir();
        path != files && path.starts_with(&files)
    }

    /// Value of a named column, used when sorting by an arbitrary attribute.
    pub fn string_attribute(&self, name: &str) -> Option<String> {
        match name {
            "name" => Some(self.display_name()),
            "size" => Some(self.size()).filter(|s| *s >= 0).map(|s| s.to_string()),
            "type" => self.type_description(),
            "mime_type" => self.mime_type().map(|m| m.to_string()),
            "owner" => self.owner_name(),
            "group" => self.group_name(),
            "permissions" | "octal_permissions" => self.permissions().map(|p| format!("{:04o}", p)),
            "where" => self.parent_location().map(|p| p.uri()),
            "uri" => Some(self.uri()),
            "selinux_context" => self.selinux_context(),
            "trash_orig_path" => self.trash_original_path(),
            key => match key.strip_prefix(attr::METADATA_PREFIX) {
                Some(meta) => self.metadata(meta),
                None => self.extension_attribute(key),
            },
        }
    }

    /// Visibility in a view. Files in the trash are always shown.
    pub fn should_show(&self, show_hidden: bool, show_foreign: bool) -> bool {
        if self.is_in_trash() {
            return true;
        }
        let hidden = self.is_hidden()
            || self
                .directory()
                .map(|d| !self.self_owned && d.is_hidden_name(&self.name()))
                .unwrap_or(false);
        let foreign = matches!(&self.kind, FileKind::DesktopIcon(link) if link.is_foreign());
        (show_hidden || !hidden) && (show_foreign || !foreign)
    }

    // Extension hooks

    pub fn add_emblem(&self, emblem: &str) {
        let added = {
            let mut d = self.write();
            if d.emblems.iter().any(|e| e == emblem) {
                false
            } else {
                d.emblems.push(emblem.to_string());
                true
            }
        };
        if added {
            self.changed();
        }
    }

    pub fn add_string_attribute(&self, name: &str, value: &str) {
        let changed = {
            let mut d = self.write();
            d.extension_attributes.insert(name.to_string(), value.to_string()).as_deref() != Some(value)
        };
        if changed {
            self.changed();
        }
    }

    /// Drops extension supplied data and asks for it again.
    pub fn invalidate_extension_info(self: &Arc<Self>) {
        {
            let mut d = self.write();
            d.emblems.clear();
            d.extension_attributes.clear();
        }
        self.invalidate_attributes(Attributes::EXTENSION_INFO);
    }

    // Updates

    /// Merges a fresh info snapshot. Returns whether anything observable
    /// changed. `None` means the file no longer exists.
    pub fn update_info(&self, info: Option<&FileInfo>) -> bool {
        let Some(info) = info else {
            if self.is_gone() {
                return false;
            }
            self.mark_gone();
            return true;
        };

        let (changed, link_target) = {
            let mut d = self.write();
            if d.is_gone {
                return false;
            }
            d.up_to_date.insert(Attributes::INFO);
            d.get_info_failed = false;
            d.info_error = None;

            let mut changed = !d.got_file_info;
            d.got_file_info = true;

            let mut names_changed = false;
            names_changed |= replace(&mut d.display_name, info.get_display_name().map(intern));
            names_changed |= replace(
                &mut d.edit_name,
                info.get_string(attr::STANDARD_EDIT_NAME).map(str::to_string),
            );
            names_changed |= replace(
                &mut d.custom_name,
                info.get_string(attr::METADATA_CUSTOM_NAME).map(str::to_string),
            );
            changed |= names_changed;

            changed |= replace(&mut d.file_type, info.get_file_type());
            changed |= replace(
                &mut d.activation_uri,
                info.get_string(attr::STANDARD_TARGET_URI).map(str::to_string),
            );
            changed |= replace(
                &mut d.is_symlink,
                info.get_boolean(attr::STANDARD_IS_SYMLINK).unwrap_or(false),
            );
            changed |= replace(
                &mut d.is_hidden,
                info.get_boolean(attr::STANDARD_IS_HIDDEN).unwrap_or(false)
                    || info.get_boolean(attr::STANDARD_IS_BACKUP).unwrap_or(false),
            );
            changed |= replace(
                &mut d.is_mountpoint,
                info.get_boolean(attr::UNIX_IS_MOUNTPOINT).unwrap_or(false),
            );
            changed |= replace(&mut d.has_permissions, info.has_attribute(attr::UNIX_MODE));
            changed |= replace(&mut d.permissions, info.get_mode().unwrap_or(0));

            let mut access = AccessFlags::empty();
            for (key, flag, default) in [
                (attr::ACCESS_CAN_READ, AccessFlags::CAN_READ, true),
                (attr::ACCESS_CAN_WRITE, AccessFlags::CAN_WRITE, true),
                (attr::ACCESS_CAN_EXECUTE, AccessFlags::CAN_EXECUTE, true),
                (attr::ACCESS_CAN_DELETE, AccessFlags::CAN_DELETE, true),
                (attr::ACCESS_CAN_TRASH, AccessFlags::CAN_TRASH, true),
                (attr::ACCESS_CAN_RENAME, AccessFlags::CAN_RENAME, true),
                (attr::MOUNTABLE_CAN_MOUNT, AccessFlags::CAN_MOUNT, false),
                (attr::MOUNTABLE_CAN_UNMOUNT, AccessFlags::CAN_UNMOUNT, false),
                (attr::MOUNTABLE_CAN_EJECT, AccessFlags::CAN_EJECT, false),
            ] {
                access.set(flag, info.get_boolean(key).unwrap_or(default));
            }
            changed |= replace(&mut d.access, access);

            if info.has_attribute(attr::THUMBNAIL_PATH) {
                changed |= replace(
                    &mut d.thumbnail_path,
                    info.get_byte_string(attr::THUMBNAIL_PATH).map(PathBuf::from),
                );
            }
            if let Some(failed) = info.get_boolean(attr::THUMBNAIL_FAILED) {
                changed |= replace(&mut d.thumbnailing_failed, failed);
            }

            changed |= replace(&mut d.uid, info.get_uint32(attr::UNIX_UID).map_or(-1, i64::from));
            changed |= replace(&mut d.gid, info.get_uint32(attr::UNIX_GID).map_or(-1, i64::from));
            changed |= replace(&mut d.owner, info.get_string(attr::OWNER_USER).map(intern));
            changed |= replace(
                &mut d.owner_real,
                info.get_string(attr::OWNER_USER_REAL).map(intern),
            );
            changed |= replace(&mut d.group, info.get_string(attr::OWNER_GROUP).map(intern));

            changed |= replace(&mut d.size, info.get_size());
            changed |= replace(
                &mut d.sort_order,
                info.get_int32(attr::STANDARD_SORT_ORDER).unwrap_or(0),
            );

            let mut times_changed = false;
            times_changed |= replace(&mut d.mtime, info.get_modification_time() as i64);
            times_changed |= replace(
                &mut d.atime,
                info.get_uint64(attr::TIME_ACCESS).unwrap_or(0) as i64,
            );
            times_changed |= replace(
                &mut d.ctime,
                info.get_uint64(attr::TIME_CHANGED).unwrap_or(0) as i64,
            );
            times_changed |= replace(
                &mut d.trash_time,
                info.get_string(attr::TRASH_DELETION_DATE)
                    .and_then(trash::parse_deletion_date)
                    .unwrap_or(0),
            );
            if times_changed {
                d.up_to_date.remove(Attributes::THUMBNAIL);
            }
            changed |= times_changed;

            changed |= replace(
                &mut d.trash_orig_path,
                info.get_byte_string(attr::TRASH_ORIG_PATH),
            );
            changed |= replace(
                &mut d.symlink_target,
                info.get_byte_string(attr::STANDARD_SYMLINK_TARGET),
            );
            changed |= replace(&mut d.mime_type, info.get_content_type().map(intern));
            changed |= replace(
                &mut d.selinux_context,
                info.get_string(attr::SELINUX_CONTEXT).map(str::to_string),
            );
            changed |= replace(
                &mut d.description,
                info.get_string(attr::STANDARD_DESCRIPTION).map(str::to_string),
            );
            changed |= replace(
                &mut d.filesystem_id,
                info.get_string(attr::ID_FILESYSTEM).map(intern),
            );
            changed |= replace(
                &mut d.icon_name,
                info.get_string(attr::STANDARD_ICON).map(str::to_string),
            );
            changed |= replace(
                &mut d.custom_icon,
                info.get_string(attr::METADATA_CUSTOM_ICON).map(str::to_string),
            );

            let metadata: BTreeMap<String, String> = info
                .attributes_with_prefix(attr::METADATA_PREFIX)
                .filter_map(|(key, value)| match value {
                    FileAttributeType::String(s) => Some((key.to_string(), s.clone())),
                    _ => None,
                })
                .collect();
            changed |= replace(&mut d.metadata, metadata);

            if names_changed {
                d.refresh_collation_key();
            }

            let link_target = if d.is_symlink {
                d.symlink_target
                    .as_deref()
                    .and_then(|target| resolve_link_target(&d.location, target))
            } else {
                None
            };
            (changed, link_target)
        };

        if let Some(cache) = self.cache.upgrade() {
            cache.register_link(self.id, self.location(), link_target);
        }

        changed
    }

    /// Renames the record inside its directory without touching the disk.
    pub fn update_name(&self, new_name: &str) -> bool {
        if self.self_owned || *self.name() == *new_name {
            return false;
        }
        let (old_name, new_name) = {
            let mut d = self.write();
            let Some(parent) = d.location.parent() else {
                return false;
            };
            let new_name = intern(new_name);
            let old_name = std::mem::replace(&mut d.name, new_name.clone());
            d.location = parent.child(&new_name);
            d.refresh_collation_key();
            (old_name, new_name)
        };
        if let Some(directory) = self.directory() {
            directory.rename_entry(&old_name, &new_name, self);
        }
        true
    }

    /// Applies `info` and takes the name it reports.
    pub fn update_info_and_name(&self, info: Option<&FileInfo>) -> bool {
        let mut changed = false;
        if let Some(name) = info.and_then(FileInfo::get_name) {
            changed |= self.update_name(name);
        }
        changed | self.update_info(info)
    }

    /// Files the record under `location` in another folder.
    pub(crate) fn reparent(&self, directory: &Arc<Directory>, location: Location) {
        {
            let mut d = self.write();
            d.name = intern(&location.basename());
            d.location = location;
            d.refresh_collation_key();
        }
        self.set_directory(directory);
    }

    pub(crate) fn set_link_info(&self, name: Option<String>, icon: Option<String>) -> bool {
        let mut d = self.write();
        let changed = d.link_name != name || d.link_icon != icon;
        d.link_name = name;
        d.link_icon = icon;
        if changed {
            d.refresh_collation_key();
        }
        changed
    }

    pub(crate) fn set_info_failed(&self, error: FileError) -> bool {
        let mut d = self.write();
        d.up_to_date.insert(Attributes::INFO);
        let changed = !d.get_info_failed;
        d.get_info_failed = true;
        d.info_error = Some(error);
        changed
    }

    /// Takes the record out of its directory and the link index.
    pub fn mark_gone(&self) {
        {
            let mut d = self.write();
            if d.is_gone {
                return;
            }
            d.is_gone = true;
        }
        if let Some(cache) = self.cache.upgrade() {
            cache.unregister_link(self.id);
        }
        if let Some(directory) = self.directory() {
            if self.self_owned {
                directory.clear_self_record(self);
            } else {
                directory.remove_entry(&self.name(), self);
            }
        }
        self.ready.notify_waiters();
    }

    fn emit_changed(&self) {
        let _ = self.events.send(FileEvent::Changed);
        if let Some(directory) = self.directory() {
            directory.emit(DirectoryEvent::FilesChanged(vec![self.location()]));
        }
    }

    /// Emits `Changed` on the record, its directory and every symbolic link
    /// known to point at it.
    pub fn changed(&self) {
        self.emit_changed();
        let Some(cache) = self.cache.upgrade() else {
            return;
        };
        for link in cache.links_to(&self.location()) {
            if let Some(record) = cache.get_existing(&link) {
                if record.id != self.id {
                    record.emit_changed();
                }
            }
        }
    }

    pub(crate) fn emit(&self, event: FileEvent) {
        let _ = self.events.send(event);
    }

    // Invalidation and readiness

    /// Marks categories stale and queues the record for the refresh worker.
    pub fn invalidate_attributes(self: &Arc<Self>, mask: Attributes) {
        if matches!(self.kind, FileKind::DesktopIcon(_)) {
            return;
        }
        {
            let mut d = self.write();
            if d.is_gone {
                return;
            }
            d.up_to_date.remove(mask);
        }
        self.enqueue();
    }

    pub fn invalidate_all_attributes(self: &Arc<Self>) {
        self.invalidate_attributes(Attributes::all());
    }

    fn enqueue(self: &Arc<Self>) {
        if let Some(directory) = self.directory() {
            directory.enqueue(self);
        }
        if let Some(cache) = self.cache.upgrade() {
            cache.wake();
        }
    }

    fn request(self: &Arc<Self>, mask: Attributes) {
        self.write().requested.insert(mask);
        self.enqueue();
    }

    /// Categories the worker should fetch for this record now.
    pub(crate) fn pending_attributes(&self) -> Attributes {
        let monitored = self
            .lock_monitors()
            .iter()
            .fold(Attributes::empty(), |acc, (_, mask)| acc | *mask);
        let d = self.read();
        if d.is_gone {
            return Attributes::empty();
        }
        (d.requested | monitored | Attributes::INFO) - d.up_to_date
    }

    pub(crate) fn mark_up_to_date(&self, mask: Attributes) {
        {
            let mut d = self.write();
            d.up_to_date.insert(mask);
            d.requested.remove(mask);
        }
        self.ready.notify_waiters();
    }

    pub fn check_if_ready(&self, mask: Attributes) -> bool {
        let d = self.read();
        d.is_gone || d.up_to_date.contains(mask)
    }

    /// Waits until every category in `mask` is up to date, fetching them
    /// inline when the cache runs no worker.
    pub async fn call_when_ready(self: &Arc<Self>, mask: Attributes) {
        match self.cache.upgrade() {
            Some(cache) if cache.worker_running() => {}
            Some(cache) => {
                if !self.check_if_ready(mask) {
                    cache.refresh(self, mask).await;
                }
                return;
            }
            None => return,
        }

        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.check_if_ready(mask) {
                return;
            }
            self.request(mask);
            notified.await;
        }
    }

    /// Keeps `mask` fetched for as long as the returned guard lives.
    pub fn monitor_add(self: &Arc<Self>, mask: Attributes) -> AttributeMonitor {
        let id = NEXT_MONITOR_ID.fetch_add(1, Ordering::Relaxed);
        self.lock_monitors().push((id, mask));
        if !self.check_if_ready(mask) {
            self.enqueue();
        }
        AttributeMonitor {
            record: Arc::downgrade(self),
            id,
        }
    }

    // Operations

    fn begin_operation(&self, kind: OperationKind, cancellable: Option<&Cancellable>) -> OperationGuard<'_> {
        let cancellable = cancellable.cloned().unwrap_or_default();
        self.lock_operations().push((kind, cancellable.clone()));
        OperationGuard {
            record: self,
            cancellable,
        }
    }

    pub fn operations_in_progress(&self) -> bool {
        !self.lock_operations().is_empty()
    }

    pub fn rename_in_progress(&self) -> bool {
        self.lock_operations()
            .iter()
            .any(|(kind, _)| *kind == OperationKind::Rename)
    }

    /// Cancels every running mutation. Each still completes, with a
    /// `Cancelled` error.
    pub fn cancel_operations(&self) {
        for (_, cancellable) in self.lock_operations().iter() {
            cancellable.cancel();
        }
    }

    fn gone_error(&self) -> FileError {
        FileError::new(
            FileErrorKind::NotFound,
            format!("File not found: {}", self.location()),
        )
    }

    /// Renames the file. See the module docs of `FileOperations` for how
    /// the resulting undo entry is recorded.
    pub async fn rename(
        self: &Arc<Self>,
        new_name: &str,
        scope: &UndoScope,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Location> {
        let renameable_desktop_file = self.is_renameable_desktop_file();

        if new_name.contains('/') && !renameable_desktop_file {
            return Err(FileError::new(
                FileErrorKind::InvalidArg,
                "Slashes are not allowed in filenames",
            ));
        }

        if self.is_gone() {
            self.changed();
            return Err(self.gone_error());
        }

        let is_desktop_icon = matches!(self.kind, FileKind::DesktopIcon(_));
        if !is_desktop_icon && !renameable_desktop_file && *self.name() == *new_name {
            return Ok(self.location());
        }

        if self.self_owned {
            self.changed();
            return Err(FileError::new(
                FileErrorKind::NotSupported,
                "Toplevel files cannot be renamed",
            ));
        }

        if let FileKind::DesktopIcon(link) = &self.kind {
            if link.display_name() == new_name {
                return Ok(self.location());
            }
            return match link.rename(new_name).await {
                Ok(()) => Ok(self.location()),
                Err(e) => Err(FileError::with_source(
                    FileErrorKind::Failed,
                    "Unable to rename desktop icon",
                    Box::new(e),
                )),
            };
        }

        let cache = self.cache()?;

        let new_file_name = if renameable_desktop_file {
            let path = self.location().to_path().ok_or_else(|| {
                FileError::new(FileErrorKind::Failed, "Unable to rename desktop file")
            })?;
            let text_changed = link::rename_desktop_file(&path, new_name).await?;
            let file_name = format!("{}.desktop", new_name).replace('/', "-");
            if *self.name() == *file_name {
                if text_changed {
                    self.invalidate_attributes(Attributes::INFO | Attributes::LINK_INFO);
                }
                return Ok(self.location());
            }
            file_name
        } else {
            new_name.to_string()
        };

        let op = self.begin_operation(OperationKind::Rename, cancellable);
        let recorder = scope.recorder();
        let old_location = self.location();

        let result = async {
            let file = cache.file_for(&old_location)?;
            let new_location = file
                .set_display_name(&new_file_name, Some(&op.cancellable))
                .await?;

            if let Some(existing) = cache.get_existing(&new_location) {
                if !Arc::ptr_eq(&existing, self) {
                    existing.mark_gone();
                    existing.changed();
                }
            }

            match cache.query_info(&new_location, Some(&op.cancellable)).await {
                Ok(info) => {
                    self.update_info_and_name(Some(&info));
                }
                Err(e) => {
                    log::warn!("re-query after rename of {} failed: {}", new_location, e);
                    self.update_name(&new_location.basename());
                }
            }
            cache.relocate(&old_location, &new_location);
            Ok::<_, FileError>(new_location)
        }
        .await;
        drop(op);

        match result {
            Ok(new_location) => {
                if self.has_custom_display_name() {
                    self.invalidate_attributes(Attributes::INFO | Attributes::LINK_INFO);
                }
                if self.is_directory() {
                    if let (Some(old_path), Some(new_path)) = (old_location.to_path(), new_location.to_path()) {
                        places::user_special_dir_moved(cache.config(), &old_path, &new_path);
                    }
                }
                self.changed();
                if let Some(manager) = recorder {
                    manager.set_action(Some(Arc::new(UndoInfo::rename(old_location, new_location.clone()))));
                }
                Ok(new_location)
            }
            Err(e) => {
                self.changed();
                Err(e)
            }
        }
    }

    /// Sets one attribute through the backend, then re-reads the info.
    /// Emits `Changed` whether or not the backend call succeeded.
    async fn set_attribute_and_refresh(
        self: &Arc<Self>,
        attribute: &str,
        value: FileAttributeType,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        let mut info = FileInfo::new();
        info.set_attribute(attribute, value);
        self.apply_attributes(&info, cancellable).await
    }

    async fn apply_attributes(
        self: &Arc<Self>,
        info: &FileInfo,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        let result = async {
            let cache = self.cache()?;
            let op = self.begin_operation(OperationKind::SetAttributes, cancellable);
            let location = self.location();
            let file = cache.file_for(&location)?;
            file.set_attributes_from_info(info, FileQueryInfoFlags::NOFOLLOW_SYMLINKS, Some(&op.cancellable))
                .await?;
            match cache.query_info(&location, Some(&op.cancellable)).await {
                Ok(fresh) => {
                    self.update_info(Some(&fresh));
                }
                Err(e) if e.kind() == FileErrorKind::NotFound => {
                    self.update_info(None);
                }
                Err(e) => log::warn!("re-query of {} failed: {}", location, e),
            }
            Ok(())
        }
        .await;
        self.changed();
        result
    }

    /// Applies every attribute of `info` and refreshes the record.
    pub async fn set_attributes(
        self: &Arc<Self>,
        info: &FileInfo,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        if self.is_gone() {
            return Err(self.gone_error());
        }
        self.apply_attributes(info, cancellable).await
    }

    pub async fn set_permissions(
        self: &Arc<Self>,
        permissions: u32,
        scope: &UndoScope,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        if self.is_gone() {
            return Err(self.gone_error());
        }
        if !self.can_set_permissions() {
            self.changed();
            return Err(FileError::new(
                FileErrorKind::PermissionDenied,
                "Not allowed to set permissions",
            ));
        }

        let permissions = permissions & 0o7777;
        let old = self.permissions();
        if old == Some(permissions) {
            return Ok(());
        }

        let recorder = scope.recorder();
        self.set_attribute_and_refresh(attr::UNIX_MODE, FileAttributeType::Uint32(permissions), cancellable)
            .await?;

        if let (Some(manager), Some(old)) = (recorder, old) {
            manager.set_action(Some(Arc::new(UndoInfo::permissions(
                self.location(),
                old,
                permissions,
            ))));
        }
        Ok(())
    }

    /// Changes the owner to a user name or numeric id.
    pub async fn set_owner(
        self: &Arc<Self>,
        user_name_or_id: &str,
        scope: &UndoScope,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        if self.is_gone() {
            return Err(self.gone_error());
        }
        if !self.can_set_owner() {
            self.changed();
            return Err(FileError::new(
                FileErrorKind::PermissionDenied,
                "Not allowed to set owner",
            ));
        }

        let uid = match sys::user_by_name(user_name_or_id) {
            Some(user) => user.uid,
            None => match user_name_or_id.parse::<u32>() {
                Ok(uid) => uid,
                Err(_) => {
                    self.changed();
                    return Err(FileError::new(
                        FileErrorKind::InvalidArg,
                        format!("Specified owner '{}' doesn't exist", user_name_or_id),
                    ));
                }
            },
        };

        if self.uid() == i64::from(uid) {
            return Ok(());
        }

        let recorder = scope.recorder();
        let old = self.owner_name().unwrap_or_else(|| self.uid().to_string());
        self.set_attribute_and_refresh(attr::UNIX_UID, FileAttributeType::Uint32(uid), cancellable)
            .await?;

        if let Some(manager) = recorder {
            manager.set_action(Some(Arc::new(UndoInfo::ownership(
                UndoOp::ChangeOwner,
                self.location(),
                old,
                user_name_or_id.to_string(),
            ))));
        }
        Ok(())
    }

    /// Changes the group to a group name or numeric id.
    pub async fn set_group(
        self: &Arc<Self>,
        group_name_or_id: &str,
        scope: &UndoScope,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        if self.is_gone() {
            return Err(self.gone_error());
        }
        if !self.can_set_group() {
            self.changed();
            return Err(FileError::new(
                FileErrorKind::PermissionDenied,
                "Not allowed to set group",
            ));
        }

        let gid = match sys::group_by_name(group_name_or_id) {
            Some(group) => group.gid,
            None => match group_name_or_id.parse::<u32>() {
                Ok(gid) => gid,
                Err(_) => {
                    self.changed();
                    return Err(FileError::new(
                        FileErrorKind::InvalidArg,
                        format!("Specified group '{}' doesn't exist", group_name_or_id),
                    ));
                }
            },
        };

        if self.gid() == i64::from(gid) {
            return Ok(());
        }

        let recorder = scope.recorder();
        let old = self.group_name().unwrap_or_else(|| self.gid().to_string());
        self.set_attribute_and_refresh(attr::UNIX_GID, FileAttributeType::Uint32(gid), cancellable)
            .await?;

        if let Some(manager) = recorder {
            manager.set_action(Some(Arc::new(UndoInfo::ownership(
                UndoOp::ChangeGroup,
                self.location(),
                old,
                group_name_or_id.to_string(),
            ))));
        }
        Ok(())
    }
}

impl Drop for FileRecord {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.unregister_link(self.id);
        }
    }
}

/// Where a symbolic link at `location` pointing at `target` leads.
fn resolve_link_target(location: &Location, target: &str) -> Option<Location> {
    if target.starts_with('/') {
        return Some(Location::for_path(target));
    }
    let parent = location.parent()?.to_path()?;
    Some(Location::for_path(parent.join(target)))
}
