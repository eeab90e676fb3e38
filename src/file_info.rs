use std::collections::HashMap;

/// Well-known attribute keys.
pub mod attr {
    pub const STANDARD_NAME: &str = "standard::name";
    pub const STANDARD_DISPLAY_NAME: &str = "standard::display-name";
    pub const STANDARD_EDIT_NAME: &str = "standard::edit-name";
    pub const STANDARD_TYPE: &str = "standard::type";
    pub const STANDARD_SIZE: &str = "standard::size";
    pub const STANDARD_SORT_ORDER: &str = "standard::sort-order";
    pub const STANDARD_IS_HIDDEN: &str = "standard::is-hidden";
    pub const STANDARD_IS_BACKUP: &str = "standard::is-backup";
    pub const STANDARD_IS_SYMLINK: &str = "standard::is-symlink";
    pub const STANDARD_SYMLINK_TARGET: &str = "standard::symlink-target";
    pub const STANDARD_CONTENT_TYPE: &str = "standard::content-type";
    pub const STANDARD_ICON: &str = "standard::icon";
    pub const STANDARD_DESCRIPTION: &str = "standard::description";
    pub const STANDARD_TARGET_URI: &str = "standard::target-uri";

    pub const ACCESS_CAN_READ: &str = "access::can-read";
    pub const ACCESS_CAN_WRITE: &str = "access::can-write";
    pub const ACCESS_CAN_EXECUTE: &str = "access::can-execute";
    pub const ACCESS_CAN_DELETE: &str = "access::can-delete";
    pub const ACCESS_CAN_TRASH: &str = "access::can-trash";
    pub const ACCESS_CAN_RENAME: &str = "access::can-rename";

    pub const MOUNTABLE_CAN_MOUNT: &str = "mountable::can-mount";
    pub const MOUNTABLE_CAN_UNMOUNT: &str = "mountable::can-unmount";
    pub const MOUNTABLE_CAN_EJECT: &str = "mountable::can-eject";

    pub const TIME_MODIFIED: &str = "time::modified";
    pub const TIME_ACCESS: &str = "time::access";
    pub const TIME_CHANGED: &str = "time::changed";

    pub const UNIX_MODE: &str = "unix::mode";
    pub const UNIX_UID: &str = "unix::uid";
    pub const UNIX_GID: &str = "unix::gid";
    pub const UNIX_IS_MOUNTPOINT: &str = "unix::is-mountpoint";

    pub const OWNER_USER: &str = "owner::user";
    pub const OWNER_USER_REAL: &str = "owner::user-real";
    pub const OWNER_GROUP: &str = "owner::group";

    pub const SELINUX_CONTEXT: &str = "selinux::context";
    pub const ID_FILESYSTEM: &str = "id::filesystem";
    pub const THUMBNAIL_PATH: &str = "thumbnail::path";
    pub const THUMBNAIL_FAILED: &str = "thumbnail::failed";

    pub const TRASH_ORIG_PATH: &str = "trash::orig-path";
    pub const TRASH_DELETION_DATE: &str = "trash::deletion-date";

    pub const FILESYSTEM_FREE: &str = "filesystem::free";
    pub const FILESYSTEM_SIZE: &str = "filesystem::size";
    pub const FILESYSTEM_TYPE: &str = "filesystem::type";

    pub const METADATA_PREFIX: &str = "metadata::";
    pub const METADATA_CUSTOM_ICON: &str = "metadata::custom-icon";
    pub const METADATA_CUSTOM_NAME: &str = "metadata::custom-name";
}

/// Attributes a file record asks for when it refreshes its info.
pub const DEFAULT_ATTRIBUTES: &str = "standard::*,access::*,mountable::*,time::*,unix::*,owner::*,selinux::*,thumbnail::*,id::filesystem,trash::orig-path,trash::deletion-date,metadata::*";

#[derive(Debug, Clone, PartialEq)]
pub enum FileAttributeType {
    String(String),
    Stringv(Vec<String>),
    ByteString(Vec<u8>),
    Boolean(bool),
    Uint32(u32),
    Int32(i32),
    Uint64(u64),
    Int64(i64),
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileType {
    Unknown,
    Regular,
    Directory,
    SymbolicLink,
    Special,
    Shortcut,
    Mountable,
}

impl FileType {
    fn to_raw(self) -> u32 {
        match self {
            FileType::Unknown => 0,
            FileType::Regular => 1,
            FileType::Directory => 2,
            FileType::SymbolicLink => 3,
            FileType::Special => 4,
            FileType::Shortcut => 5,
            FileType::Mountable => 6,
        }
    }

    fn from_raw(val: u32) -> Self {
        match val {
            1 => FileType::Regular,
            2 => FileType::Directory,
            3 => FileType::SymbolicLink,
            4 => FileType::Special,
            5 => FileType::Shortcut,
            6 => FileType::Mountable,
            _ => FileType::Unknown,
        }
    }
}

/// Attribute bag returned by `File::query_info` and consumed by
/// `File::set_attributes_from_info`.
#[derive(Debug, Clone, Default)]
pub struct FileInfo {
    attributes: HashMap<String, FileAttributeType>,
}

impl FileInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_attribute(&mut self, key: &str, value: FileAttributeType) {
        self.attributes.insert(key.to_string(), value);
    }

    pub fn get_attribute(&self, key: &str) -> Option<&FileAttributeType> {
        self.attributes.get(key)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn remove_attribute(&mut self, key: &str) {
        self.attributes.remove(key);
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Attributes whose key starts with `prefix`, with the prefix stripped.
    pub fn attributes_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a FileAttributeType)> + 'a {
        self.attributes
            .iter()
            .filter_map(move |(k, v)| k.strip_prefix(prefix).map(|rest| (rest, v)))
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.get_attribute(key) {
            Some(FileAttributeType::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn set_string(&mut self, key: &str, value: &str) {
        self.set_attribute(key, FileAttributeType::String(value.to_string()));
    }

    pub fn get_byte_string(&self, key: &str) -> Option<String> {
        match self.get_attribute(key) {
            Some(FileAttributeType::ByteString(b)) => Some(String::from_utf8_lossy(b).into_owned()),
            Some(FileAttributeType::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn get_boolean(&self, key: &str) -> Option<bool> {
        match self.get_attribute(key) {
            Some(FileAttributeType::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn set_boolean(&mut self, key: &str, value: bool) {
        self.set_attribute(key, FileAttributeType::Boolean(value));
    }

    pub fn get_uint32(&self, key: &str) -> Option<u32> {
        match self.get_attribute(key) {
            Some(FileAttributeType::Uint32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn set_uint32(&mut self, key: &str, value: u32) {
        self.set_attribute(key, FileAttributeType::Uint32(value));
    }

    pub fn get_int32(&self, key: &str) -> Option<i32> {
        match self.get_attribute(key) {
            Some(FileAttributeType::Int32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_uint64(&self, key: &str) -> Option<u64> {
        match self.get_attribute(key) {
            Some(FileAttributeType::Uint64(v)) => Some(*v),
            Some(FileAttributeType::Uint32(v)) => Some(u64::from(*v)),
            _ => None,
        }
    }

    pub fn set_uint64(&mut self, key: &str, value: u64) {
        self.set_attribute(key, FileAttributeType::Uint64(value));
    }

    // Common attributes helpers

    pub fn set_name(&mut self, name: &str) {
        self.set_string(attr::STANDARD_NAME, name);
    }

    pub fn get_name(&self) -> Option<&str> {
        self.get_string(attr::STANDARD_NAME)
    }

    pub fn set_display_name(&mut self, name: &str) {
        self.set_string(attr::STANDARD_DISPLAY_NAME, name);
    }

    pub fn get_display_name(&self) -> Option<&str> {
        self.get_string(attr::STANDARD_DISPLAY_NAME)
    }

    pub fn set_file_type(&mut self, file_type: FileType) {
        self.set_uint32(attr::STANDARD_TYPE, file_type.to_raw());
    }

    pub fn get_file_type(&self) -> FileType {
        self.get_uint32(attr::STANDARD_TYPE)
            .map(FileType::from_raw)
            .unwrap_or(FileType::Unknown)
    }

    pub fn set_size(&mut self, size: u64) {
        self.set_uint64(attr::STANDARD_SIZE, size);
    }

    /// Size in bytes, `-1` when the info carries none.
    pub fn get_size(&self) -> i64 {
        match self.get_attribute(attr::STANDARD_SIZE) {
            Some(FileAttributeType::Uint64(s)) => *s as i64,
            Some(FileAttributeType::Int64(s)) => *s,
            _ => -1,
        }
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.set_string(attr::STANDARD_CONTENT_TYPE, content_type);
    }

    pub fn get_content_type(&self) -> Option<&str> {
        self.get_string(attr::STANDARD_CONTENT_TYPE)
    }

    pub fn set_modification_time(&mut self, time: u64) {
        self.set_uint64(attr::TIME_MODIFIED, time);
    }

    pub fn get_modification_time(&self) -> u64 {
        self.get_uint64(attr::TIME_MODIFIED).unwrap_or(0)
    }

    pub fn set_mode(&mut self, mode: u32) {
        self.set_uint32(attr::UNIX_MODE, mode);
    }

    pub fn get_mode(&self) -> Option<u32> {
        self.get_uint32(attr::UNIX_MODE)
    }
}
