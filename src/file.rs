//! File abstraction trait
//!
//! The `File` trait is the filesystem seam of the crate: the cache, the
//! file operations and the trash all reach the disk through it. Handles are
//! cheap, stateless and identified by their `Location`.

pub mod local;
pub(crate) mod sys;

use async_trait::async_trait;
use bitflags::bitflags;

use crate::cancellable::Cancellable;
use crate::error::FileResult;
use crate::file_enumerator::FileEnumerator;
use crate::file_info::{FileAttributeType, FileInfo};
use crate::iostream::{InputStream, OutputStream};
use crate::job::{CopyFlags, ProgressCallback};
use crate::location::Location;
use crate::monitor::FileMonitor;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct FileQueryInfoFlags: u32 {
        const NONE = 0;
        const NOFOLLOW_SYMLINKS = 1;
    }
}

#[async_trait]
pub trait File: Send + Sync + std::fmt::Debug {
    fn location(&self) -> Location;

    fn uri(&self) -> String {
        self.location().uri()
    }

    fn basename(&self) -> String {
        self.location().basename()
    }

    /// Queries information about the file.
    /// `attributes` is a comma-separated list of attributes to query (e.g. "standard::*,time::modified").
    async fn query_info(
        &self,
        attributes: &str,
        flags: FileQueryInfoFlags,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<FileInfo>;

    /// Queries filesystem-level information (free space, type, etc.)
    async fn query_filesystem_info(
        &self,
        attributes: &str,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<FileInfo>;

    async fn read(&self, cancellable: Option<&Cancellable>) -> FileResult<Box<dyn InputStream>>;

    /// Opens the file for writing, creating or truncating it.
    async fn replace(&self, cancellable: Option<&Cancellable>) -> FileResult<Box<dyn OutputStream>>;

    /// Creates a new file for writing. Fails if it already exists.
    async fn create_file(
        &self,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Box<dyn OutputStream>>;

    /// Deletes the file, or an empty directory.
    async fn delete(&self, cancellable: Option<&Cancellable>) -> FileResult<()>;

    async fn make_directory(&self, cancellable: Option<&Cancellable>) -> FileResult<()>;

    async fn make_symbolic_link(
        &self,
        target: &str,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()>;

    async fn enumerate_children(
        &self,
        attributes: &str,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Box<dyn FileEnumerator>>;

    /// Moves the file to a new location.
    async fn move_to(
        &self,
        destination: &dyn File,
        flags: CopyFlags,
        cancellable: Option<&Cancellable>,
        progress_callback: Option<&ProgressCallback>,
    ) -> FileResult<()>;

    /// Copies a regular file or symlink. Directories are walked by the caller.
    async fn copy(
        &self,
        destination: &dyn File,
        flags: CopyFlags,
        cancellable: Option<&Cancellable>,
        progress_callback: Option<&ProgressCallback>,
    ) -> FileResult<()>;

    async fn exists(&self, cancellable: Option<&Cancellable>) -> FileResult<bool>;

    /// Monitors the file or directory for changes.
    async fn monitor(&self, cancellable: Option<&Cancellable>) -> FileResult<FileMonitor>;

    /// Renames the file within its directory, returning the new location.
    async fn set_display_name(
        &self,
        display_name: &str,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Location>;

    /// Sets a single settable attribute (`unix::mode`, `unix::uid`,
    /// `unix::gid`, `metadata::*`).
    async fn set_attribute(
        &self,
        attribute: &str,
        value: &FileAttributeType,
        flags: FileQueryInfoFlags,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()>;

    /// Applies every attribute in `info`, stopping at the first failure.
    async fn set_attributes_from_info(
        &self,
        info: &FileInfo,
        flags: FileQueryInfoFlags,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        let mut names: Vec<&str> = info.attribute_names().collect();
        names.sort_unstable();
        for name in names {
            if let Some(value) = info.get_attribute(name) {
                self.set_attribute(name, value, flags, cancellable).await?;
            }
        }
        Ok(())
    }
}
