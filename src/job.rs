//! File operations
//!
//! `FileOperations` copies, moves, links, trashes, deletes and creates files
//! on behalf of a [`FileCache`]. Each operation tells the cache about the
//! files it touched and, when its [`UndoScope`] records, leaves one
//! [`UndoInfo`] describing the whole batch in the undo manager.
//!
//! Name conflicts are never overwritten: the target name is made unique
//! the way a file manager does it (`notes (copy).txt`,
//! `notes (another copy).txt`, `notes (3rd copy).txt`, ...).

use std::path::PathBuf;
use std::sync::Arc;

use bitflags::bitflags;
use tokio::io::AsyncWriteExt;

use crate::cancellable::Cancellable;
use crate::error::{FileError, FileErrorKind, FileResult};
use crate::file::{File, FileQueryInfoFlags};
use crate::file_info::{attr, FileAttributeType, FileType};
use crate::location::Location;
use crate::model::attributes::Attributes;
use crate::model::cache::FileCache;
use crate::mount::Mount;
use crate::service::trash::{TrashDir, TrashEntry};
use crate::undo::{CreateTemplate, UndoInfo, UndoOp, UndoScope};
use crate::volume::Volume;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct CopyFlags: u32 {
        const NONE = 0;
        const OVERWRITE = 1;
        const NO_FALLBACK_FOR_MOVE = 4;
        const TARGET_DEFAULT_PERMS = 8;
    }
}

pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

pub const UNTITLED_FOLDER: &str = "Untitled Folder";
pub const UNTITLED_DOCUMENT: &str = "Untitled Document";

const TYPE_ATTRIBUTES: &str = "standard::type,standard::name,unix::mode";

/// Splits `name` at its extension dot. Leading dots do not count.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    }
}

fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

/// Base name and copy number of a name produced by [`duplicate_name`].
fn parse_duplicate_name(stem: &str) -> (&str, u32) {
    if let Some(base) = stem.strip_suffix(" (copy)") {
        return (base, 1);
    }
    if let Some(base) = stem.strip_suffix(" (another copy)") {
        return (base, 2);
    }
    if let Some(inner) = stem.strip_suffix(" copy)") {
        if let Some(open) = inner.rfind(" (") {
            let number = &inner[open + 2..];
            let digits = number.trim_end_matches(|c: char| c.is_ascii_alphabetic());
            if let Ok(n) = digits.parse::<u32>() {
                if number.len() - digits.len() == 2 && ordinal(n) == number {
                    return (&inner[..open], n);
                }
            }
        }
    }
    (stem, 0)
}

/// The name of copy number `count` of `name`.
///
/// `duplicate_name("notes.txt", 1)` is `notes (copy).txt`; duplicating a
/// name that already is a copy counts on from its number.
pub fn duplicate_name(name: &str, count: u32) -> String {
    let (stem, extension) = split_extension(name);
    let (base, previous) = parse_duplicate_name(stem);
    let n = previous + count;
    match n {
        0 => name.to_string(),
        1 => format!("{} (copy){}", base, extension),
        2 => format!("{} (another copy){}", base, extension),
        _ => format!("{} ({} copy){}", base, ordinal(n), extension),
    }
}

/// The name of link number `count` to `name`.
pub fn link_name(name: &str, count: u32) -> String {
    match count {
        0 | 1 => format!("Link to {}", name),
        2 => format!("Another link to {}", name),
        n => format!("{} link to {}", ordinal(n), name),
    }
}

/// `Untitled Folder`, `Untitled Folder 2`, ...
fn numbered_name(name: &str, count: u32) -> String {
    if count <= 1 {
        return name.to_string();
    }
    let (stem, extension) = split_extension(name);
    format!("{} {}{}", stem, count, extension)
}

#[derive(Clone)]
pub struct FileOperations {
    cache: FileCache,
    trash: TrashDir,
    scope: UndoScope,
}

impl std::fmt::Debug for FileOperations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileOperations")
            .field("trash", &self.trash.root())
            .field("scope", &self.scope)
            .finish()
    }
}

impl FileOperations {
    /// Operations on `cache`, trashing into the trash its config names.
    pub fn new(cache: FileCache, scope: UndoScope) -> Self {
        let trash = TrashDir::from_config(cache.config());
        Self { cache, trash, scope }
    }

    pub fn with_scope(&self, scope: UndoScope) -> Self {
        Self {
            cache: self.cache.clone(),
            trash: self.trash.clone(),
            scope,
        }
    }

    /// The operations an undo or redo runs with. Nothing done through them
    /// is recorded, and the manager's replay flag is consumed.
    pub(crate) fn for_replay(&self) -> Self {
        if let UndoScope::Record(manager) = &self.scope {
            manager.pop_flag();
        }
        self.with_scope(UndoScope::Replay)
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    pub fn trash_dir(&self) -> &TrashDir {
        &self.trash
    }

    pub fn scope(&self) -> &UndoScope {
        &self.scope
    }

    fn record(&self, info: UndoInfo) {
        if let Some(manager) = self.scope.recorder() {
            manager.set_action(Some(Arc::new(info)));
        }
    }

    fn file(&self, location: &Location) -> FileResult<Box<dyn File>> {
        self.cache.file_for(location)
    }

    async fn file_type(&self, location: &Location, cancellable: Option<&Cancellable>) -> FileResult<FileType> {
        let info = self
            .file(location)?
            .query_info(TYPE_ATTRIBUTES, FileQueryInfoFlags::NOFOLLOW_SYMLINKS, cancellable)
            .await?;
        Ok(info.get_file_type())
    }

    async fn exists(&self, location: &Location, cancellable: Option<&Cancellable>) -> FileResult<bool> {
        self.file(location)?.exists(cancellable).await
    }

    /// The first of `names(1)`, `names(2)`, ... that is free in `dir`.
    async fn free_name(
        &self,
        dir: &Location,
        names: impl Fn(u32) -> String,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Location> {
        let mut count = 1;
        loop {
            let candidate = dir.child(&names(count));
            if !self.exists(&candidate, cancellable).await? {
                return Ok(candidate);
            }
            count += 1;
        }
    }

    /// `dir/name`, or its first free duplicate name.
    async fn unique_target(
        &self,
        dir: &Location,
        name: &str,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Location> {
        let target = dir.child(name);
        if !self.exists(&target, cancellable).await? {
            return Ok(target);
        }
        self.free_name(dir, |n| duplicate_name(name, n), cancellable).await
    }

    fn invalidate_parent(&self, location: &Location) {
        if let Some(parent) = location.parent() {
            if let Some(record) = self.cache.get_existing(&parent) {
                record.invalidate_attributes(
                    Attributes::INFO
                        | Attributes::DIRECTORY_ITEM_COUNT
                        | Attributes::DEEP_COUNTS
                        | Attributes::MIME_LIST,
                );
            }
        }
    }

    fn notify_added(&self, location: &Location) {
        self.cache.file_added(location);
        self.invalidate_parent(location);
    }

    fn notify_removed(&self, location: &Location) {
        self.cache.file_removed(location);
        self.invalidate_parent(location);
    }

    fn notify_moved(&self, from: &Location, to: &Location) {
        self.cache.file_moved(from, to);
        self.invalidate_parent(from);
        self.invalidate_parent(to);
    }

    /// Copies `source` to `target`, recursing into directories.
    pub(crate) async fn copy_tree(
        &self,
        source: &Location,
        target: &Location,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        let mut pending = vec![(source.clone(), target.clone())];
        while let Some((from, to)) = pending.pop() {
            if let Some(c) = cancellable {
                c.check()?;
            }
            let source_file = self.file(&from)?;
            let info = source_file
                .query_info(TYPE_ATTRIBUTES, FileQueryInfoFlags::NOFOLLOW_SYMLINKS, cancellable)
                .await?;
            let target_file = self.file(&to)?;

            if info.get_file_type() != FileType::Directory {
                source_file
                    .copy(target_file.as_ref(), CopyFlags::NONE, cancellable, None)
                    .await?;
                continue;
            }

            target_file.make_directory(cancellable).await?;
            if let Some(mode) = info.get_uint32(attr::UNIX_MODE) {
                let mode = mode & 0o7777;
                target_file
                    .set_attribute(
                        attr::UNIX_MODE,
                        &FileAttributeType::Uint32(mode),
                        FileQueryInfoFlags::NOFOLLOW_SYMLINKS,
                        cancellable,
                    )
                    .await?;
            }
            let mut children = source_file.enumerate_children(TYPE_ATTRIBUTES, cancellable).await?;
            while let Some((child, location)) = children.next_file(cancellable).await? {
                let name = child.get_name().map(str::to_string).unwrap_or_else(|| location.basename());
                pending.push((location, to.child(&name)));
            }
            children.close(cancellable).await?;
        }
        Ok(())
    }

    /// Deletes `location` and everything below it.
    pub(crate) async fn delete_tree(&self, location: &Location, cancellable: Option<&Cancellable>) -> FileResult<()> {
        // (location, children already queued)
        let mut pending = vec![(location.clone(), false)];
        while let Some((current, expanded)) = pending.pop() {
            if let Some(c) = cancellable {
                c.check()?;
            }
            let file = self.file(&current)?;
            if !expanded && self.file_type(&current, cancellable).await? == FileType::Directory {
                pending.push((current.clone(), true));
                let mut children = file.enumerate_children(TYPE_ATTRIBUTES, cancellable).await?;
                while let Some((_, child)) = children.next_file(cancellable).await? {
                    pending.push((child, false));
                }
                children.close(cancellable).await?;
                continue;
            }
            file.delete(cancellable).await?;
        }
        Ok(())
    }

    /// Moves `from` to exactly `to`, copying across filesystems.
    pub(crate) async fn move_exact(
        &self,
        from: &Location,
        to: &Location,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        let source = self.file(from)?;
        let target = self.file(to)?;
        let is_directory = self.file_type(from, cancellable).await? == FileType::Directory;
        let flags = if is_directory {
            CopyFlags::NO_FALLBACK_FOR_MOVE
        } else {
            CopyFlags::NONE
        };

        match source.move_to(target.as_ref(), flags, cancellable, None).await {
            Ok(()) => {}
            Err(e) if is_directory && e.kind() == FileErrorKind::NotSupported => {
                log::debug!("moving {} by copy: {}", from, e);
                self.copy_tree(from, to, cancellable).await?;
                self.delete_tree(from, cancellable).await?;
            }
            Err(e) => return Err(e),
        }
        self.notify_moved(from, to);
        Ok(())
    }

    /// Writes `mode` to `location` and marks its record stale.
    pub(crate) async fn set_mode(
        &self,
        location: &Location,
        mode: u32,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        self.file(location)?
            .set_attribute(
                attr::UNIX_MODE,
                &FileAttributeType::Uint32(mode),
                FileQueryInfoFlags::NOFOLLOW_SYMLINKS,
                cancellable,
            )
            .await?;
        self.cache.file_changed(location);
        Ok(())
    }

    /// Creates `target` from `template`.
    pub(crate) async fn create_at(
        &self,
        target: &Location,
        template: &CreateTemplate,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        let file = self.file(target)?;
        match template {
            CreateTemplate::Folder => file.make_directory(cancellable).await?,
            CreateTemplate::Contents(contents) => {
                let mut output = file.create_file(cancellable).await?;
                output.write_all(contents).await?;
                output.flush().await?;
                output.close(cancellable)?;
            }
            CreateTemplate::File(source) => {
                if self.exists(target, cancellable).await? {
                    return Err(FileError::new(
                        FileErrorKind::Exists,
                        format!("{} already exists", target),
                    ));
                }
                self.copy_tree(source, target, cancellable).await?;
            }
        }
        self.notify_added(target);
        Ok(())
    }

    async fn copy_into(
        &self,
        sources: &[Location],
        dest_dir: &Location,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Vec<(Location, Location)>> {
        let mut pairs = Vec::with_capacity(sources.len());
        for source in sources {
            if let Some(c) = cancellable {
                c.check()?;
            }
            if source == dest_dir || dest_dir.has_prefix(source) {
                return Err(FileError::new(
                    FileErrorKind::InvalidArg,
                    format!("Cannot copy {} into itself", source),
                ));
            }
            let target = self.unique_target(dest_dir, &source.basename(), cancellable).await?;
            self.copy_tree(source, &target, cancellable).await?;
            self.notify_added(&target);
            pairs.push((source.clone(), target));
        }
        Ok(pairs)
    }

    /// Copies each of `sources` into `dest_dir` and returns the new
    /// locations.
    pub async fn copy(
        &self,
        sources: &[Location],
        dest_dir: &Location,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Vec<Location>> {
        let pairs = self.copy_into(sources, dest_dir, cancellable).await?;
        let targets = pairs.iter().map(|(_, t)| t.clone()).collect();
        let source_dir = sources.first().and_then(Location::parent);
        self.record(UndoInfo::ext(UndoOp::Copy, source_dir, dest_dir.clone(), pairs));
        Ok(targets)
    }

    /// Copies one file under a chosen name. The name is `dest_name`, else
    /// `source_display_name`, else the source's own name.
    pub async fn copy_file(
        &self,
        source: &Location,
        source_display_name: Option<&str>,
        dest_dir: &Location,
        dest_name: Option<&str>,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Location> {
        let name = dest_name
            .filter(|n| !n.is_empty())
            .or(source_display_name.filter(|n| !n.is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| source.basename());
        if name.contains('/') {
            return Err(FileError::new(
                FileErrorKind::InvalidArg,
                "Slashes are not allowed in filenames",
            ));
        }
        let target = self.unique_target(dest_dir, &name, cancellable).await?;
        self.copy_tree(source, &target, cancellable).await?;
        self.notify_added(&target);
        self.record(UndoInfo::ext(
            UndoOp::Copy,
            source.parent(),
            dest_dir.clone(),
            vec![(source.clone(), target.clone())],
        ));
        Ok(target)
    }

    /// Moves each of `sources` into `dest_dir`.
    pub async fn move_(
        &self,
        sources: &[Location],
        dest_dir: &Location,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Vec<Location>> {
        let mut pairs = Vec::with_capacity(sources.len());
        for source in sources {
            if let Some(c) = cancellable {
                c.check()?;
            }
            if source.parent().as_ref() == Some(dest_dir) {
                continue;
            }
            if source == dest_dir || dest_dir.has_prefix(source) {
                return Err(FileError::new(
                    FileErrorKind::InvalidArg,
                    format!("Cannot move {} into itself", source),
                ));
            }
            let target = self.unique_target(dest_dir, &source.basename(), cancellable).await?;
            self.move_exact(source, &target, cancellable).await?;
            pairs.push((source.clone(), target));
        }
        let targets = pairs.iter().map(|(_, t)| t.clone()).collect();
        if !pairs.is_empty() {
            let source_dir = sources.first().and_then(Location::parent);
            self.record(UndoInfo::ext(UndoOp::Move, source_dir, dest_dir.clone(), pairs));
        }
        Ok(targets)
    }

    /// Copies each of `sources` next to itself under a duplicate name.
    pub async fn duplicate(&self, sources: &[Location], cancellable: Option<&Cancellable>) -> FileResult<Vec<Location>> {
        let mut pairs = Vec::with_capacity(sources.len());
        for source in sources {
            if let Some(c) = cancellable {
                c.check()?;
            }
            let parent = source.parent().ok_or_else(|| {
                FileError::new(FileErrorKind::NotSupported, "Cannot duplicate the root directory")
            })?;
            let name = source.basename();
            let target = self.free_name(&parent, |n| duplicate_name(&name, n), cancellable).await?;
            self.copy_tree(source, &target, cancellable).await?;
            self.notify_added(&target);
            pairs.push((source.clone(), target));
        }
        let targets = pairs.iter().map(|(_, t)| t.clone()).collect();
        if let Some(parent) = sources.first().and_then(Location::parent) {
            self.record(UndoInfo::ext(UndoOp::Duplicate, Some(parent.clone()), parent, pairs));
        }
        Ok(targets)
    }

    /// Creates a symbolic link to each of `sources` in `dest_dir`.
    pub async fn link(
        &self,
        sources: &[Location],
        dest_dir: &Location,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Vec<Location>> {
        let mut pairs = Vec::with_capacity(sources.len());
        for source in sources {
            if let Some(c) = cancellable {
                c.check()?;
            }
            let target_path = source.to_path().ok_or_else(|| {
                FileError::new(FileErrorKind::NotSupported, "Links can only point to local files")
            })?;
            let name = source.basename();
            let link = if source.parent().as_ref() == Some(dest_dir) {
                self.free_name(dest_dir, |n| link_name(&name, n), cancellable).await?
            } else {
                self.unique_target(dest_dir, &name, cancellable).await?
            };
            self.file(&link)?
                .make_symbolic_link(&target_path.to_string_lossy(), cancellable)
                .await?;
            self.notify_added(&link);
            pairs.push((source.clone(), link));
        }
        let targets = pairs.iter().map(|(_, t)| t.clone()).collect();
        let source_dir = sources.first().and_then(Location::parent);
        self.record(UndoInfo::ext(UndoOp::CreateLink, source_dir, dest_dir.clone(), pairs));
        Ok(targets)
    }

    /// Permanently deletes `files`, directories included. Not undoable.
    pub async fn delete(&self, files: &[Location], cancellable: Option<&Cancellable>) -> FileResult<()> {
        for location in files {
            self.delete_tree(location, cancellable).await?;
            self.notify_removed(location);
        }
        Ok(())
    }

    /// Moves `files` to the trash, returning their trash entries.
    pub async fn trash(&self, files: &[Location], cancellable: Option<&Cancellable>) -> FileResult<Vec<TrashEntry>> {
        let mut entries = Vec::with_capacity(files.len());
        for location in files {
            let path = location.to_path().ok_or_else(|| {
                FileError::new(FileErrorKind::NotSupported, "Only local files can be trashed")
            })?;
            let entry = self.trash.trash(&path, cancellable).await?;
            self.notify_removed(location);
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Trashes `files`. Files the trash cannot take are deleted instead,
    /// and the deletion makes the batch not undoable.
    pub async fn trash_or_delete(&self, files: &[Location], cancellable: Option<&Cancellable>) -> FileResult<()> {
        let mut trashed = Vec::with_capacity(files.len());
        let mut deleted = false;
        for location in files {
            match self.trash(std::slice::from_ref(location), cancellable).await {
                Ok(mut entries) => trashed.append(&mut entries),
                Err(e) if e.kind() == FileErrorKind::NotSupported => {
                    log::info!("cannot trash {} ({}), deleting it", location, e);
                    self.delete(std::slice::from_ref(location), cancellable).await?;
                    deleted = true;
                }
                Err(e) => return Err(e),
            }
        }
        if !trashed.is_empty() && !deleted {
            self.record(UndoInfo::trash(
                trashed
                    .into_iter()
                    .map(|e| (Location::for_path(&e.original), e.deletion_time))
                    .collect(),
            ));
        }
        Ok(())
    }

    /// Deletes everything in the trash. Trash entries in the undo manager
    /// are dropped, their files being gone.
    pub async fn empty_trash(&self, cancellable: Option<&Cancellable>) -> FileResult<()> {
        let files_dir = Location::for_path(self.trash.files_dir());
        let contents = self.trash.entries().await?;
        self.trash.empty(cancellable).await?;
        for entry in &contents {
            self.cache.file_removed(&entry.location);
        }
        if let Some(record) = self.cache.get_existing(&files_dir) {
            record.invalidate_all_attributes();
        }
        if let Some(manager) = self.scope.manager() {
            manager.on_trash_state_changed(true);
        }
        Ok(())
    }

    /// Moves trash entries back to where they came from.
    pub async fn restore_from_trash(
        &self,
        entries: &[TrashEntry],
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Vec<Location>> {
        let mut pairs = Vec::with_capacity(entries.len());
        for entry in entries {
            let path: PathBuf = self.trash.restore(entry, None, cancellable).await?;
            let restored = Location::for_path(path);
            self.notify_removed(&entry.location);
            self.notify_added(&restored);
            pairs.push((entry.location.clone(), restored));
        }
        let targets = pairs.iter().map(|(_, t)| t.clone()).collect();
        if let Some(dest_dir) = pairs.first().and_then(|(_, t)| t.parent()) {
            let trash_dir = Location::for_path(self.trash.files_dir());
            self.record(UndoInfo::ext(UndoOp::RestoreFromTrash, Some(trash_dir), dest_dir, pairs));
        }
        Ok(targets)
    }

    /// Creates a folder in `parent`, named `name` or "Untitled Folder" and
    /// numbered when taken.
    pub async fn new_folder(
        &self,
        parent: &Location,
        name: Option<&str>,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Location> {
        let name = name.unwrap_or(UNTITLED_FOLDER);
        let target = self.free_name(parent, |n| numbered_name(name, n), cancellable).await?;
        self.create_at(&target, &CreateTemplate::Folder, cancellable).await?;
        self.record(UndoInfo::create(UndoOp::CreateFolder, target.clone(), CreateTemplate::Folder));
        Ok(target)
    }

    /// Creates a file holding `contents`.
    pub async fn new_file(
        &self,
        parent: &Location,
        name: Option<&str>,
        contents: &[u8],
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Location> {
        let name = name.unwrap_or(UNTITLED_DOCUMENT);
        let target = self.free_name(parent, |n| numbered_name(name, n), cancellable).await?;
        let template = CreateTemplate::Contents(contents.to_vec());
        self.create_at(&target, &template, cancellable).await?;
        self.record(UndoInfo::create(UndoOp::CreateEmptyFile, target.clone(), template));
        Ok(target)
    }

    /// Creates a copy of `template` in `parent`, named `name` or after the
    /// template.
    pub async fn new_file_from_template(
        &self,
        parent: &Location,
        name: Option<&str>,
        template: &Location,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Location> {
        let name = name.map(str::to_string).unwrap_or_else(|| template.basename());
        let target = self.free_name(parent, |n| numbered_name(&name, n), cancellable).await?;
        let template = CreateTemplate::File(template.clone());
        self.create_at(&target, &template, cancellable).await?;
        self.record(UndoInfo::create(UndoOp::CreateFileFromTemplate, target.clone(), template));
        Ok(target)
    }

    /// Sets the permission bits selected by the masks on everything inside
    /// `dir`, and on `dir` itself.
    pub async fn set_permissions_recursive(
        &self,
        dir: &Location,
        file_permissions: u32,
        file_mask: u32,
        dir_permissions: u32,
        dir_mask: u32,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        let mut originals = Vec::new();
        let mut pending = vec![dir.clone()];
        while let Some(location) = pending.pop() {
            if let Some(c) = cancellable {
                c.check()?;
            }
            let file = self.file(&location)?;
            let info = file
                .query_info(TYPE_ATTRIBUTES, FileQueryInfoFlags::NOFOLLOW_SYMLINKS, cancellable)
                .await?;
            let is_directory = match info.get_file_type() {
                FileType::Directory => true,
                FileType::SymbolicLink => continue,
                _ => false,
            };
            let (permissions, mask) = if is_directory {
                (dir_permissions, dir_mask)
            } else {
                (file_permissions, file_mask)
            };

            let Some(current) = info.get_uint32(attr::UNIX_MODE).map(|m| m & 0o7777) else {
                continue;
            };
            let updated = (current & !mask) | (permissions & mask);
            if updated != current {
                self.set_mode(&location, updated, cancellable).await?;
                originals.push((location.clone(), current));
            }

            if is_directory {
                let mut children = file.enumerate_children(TYPE_ATTRIBUTES, cancellable).await?;
                while let Some((_, child)) = children.next_file(cancellable).await? {
                    pending.push(child);
                }
                children.close(cancellable).await?;
            }
        }

        self.record(UndoInfo::rec_permissions(
            dir.clone(),
            file_permissions,
            file_mask,
            dir_permissions,
            dir_mask,
            originals,
        ));
        Ok(())
    }

    /// Mounts `volume` and returns its mount root.
    pub async fn mount_volume(&self, volume: &dyn Volume, cancellable: Option<&Cancellable>) -> FileResult<Location> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        let root = volume.mount(cancellable).await?;
        log::info!("mounted {} at {}", volume.name(), root);
        self.cache.file_changed(&root);
        if let Some(record) = self.cache.get_existing(&root) {
            record.invalidate_attributes(Attributes::MOUNT | Attributes::FILESYSTEM_INFO);
        }
        Ok(root)
    }

    pub async fn unmount_mount(&self, mount: &dyn Mount, cancellable: Option<&Cancellable>) -> FileResult<()> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        if !mount.can_unmount() {
            return Err(FileError::new(
                FileErrorKind::NotSupported,
                format!("{} cannot be unmounted", mount.name()),
            ));
        }
        mount.unmount(cancellable).await?;
        let root = mount.root();
        log::info!("unmounted {}", root);
        if let Some(directory) = self.cache.existing_directory(&root) {
            directory.unload();
        }
        if let Some(record) = self.cache.get_existing(&root) {
            record.invalidate_attributes(Attributes::MOUNT | Attributes::FILESYSTEM_INFO | Attributes::INFO);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_count_up() {
        assert_eq!(duplicate_name("foo.txt", 1), "foo (copy).txt");
        assert_eq!(duplicate_name("foo.txt", 2), "foo (another copy).txt");
        assert_eq!(duplicate_name("foo.txt", 3), "foo (3rd copy).txt");
        assert_eq!(duplicate_name("foo.txt", 11), "foo (11th copy).txt");
        assert_eq!(duplicate_name("foo.txt", 21), "foo (21st copy).txt");
        assert_eq!(duplicate_name("Makefile", 1), "Makefile (copy)");
    }

    #[test]
    fn duplicating_a_copy_continues_its_count() {
        assert_eq!(duplicate_name("foo (copy).txt", 1), "foo (another copy).txt");
        assert_eq!(duplicate_name("foo (another copy).txt", 1), "foo (3rd copy).txt");
        assert_eq!(duplicate_name("foo (3rd copy).txt", 1), "foo (4th copy).txt");
        assert_eq!(duplicate_name("foo (3rd) copy).txt", 1), "foo (3rd) copy) (copy).txt");
    }

    #[test]
    fn link_and_numbered_names() {
        assert_eq!(link_name("foo", 1), "Link to foo");
        assert_eq!(link_name("foo", 2), "Another link to foo");
        assert_eq!(link_name("foo", 3), "3rd link to foo");
        assert_eq!(numbered_name("Untitled Folder", 1), "Untitled Folder");
        assert_eq!(numbered_name("Untitled Folder", 2), "Untitled Folder 2");
        assert_eq!(numbered_name("notes.txt", 3), "notes 3.txt");
    }
}
