//! The file cache
//!
//! `FileCache` is the registry handing out one [`FileRecord`] per location.
//! It owns the directories, the reverse index of symbolic links and the
//! background worker that fetches stale attribute categories.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::io::AsyncReadExt;
use tokio::sync::Notify;

use crate::backend::BackendRegistry;
use crate::cancellable::Cancellable;
use crate::config::CacheConfig;
use crate::error::{FileError, FileErrorKind, FileResult};
use crate::file::{File, FileQueryInfoFlags};
use crate::file_info::{attr, FileInfo, FileType, DEFAULT_ATTRIBUTES};
use crate::intern::intern;
use crate::location::Location;
use crate::metadata::{self, MimeResolver, TopLeftTextLimits};
use crate::model::attributes::{Attributes, DeepCountStatus, DeepCounts, Knowledge};
use crate::model::directory::{Directory, DirectoryEvent};
use crate::model::file::{FileEvent, FileId, FileKind, FileRecord};
use crate::model::link::{read_desktop_entry, DesktopLink};
use crate::mount::Mounter;
use crate::service::thumbnail;

#[derive(Default)]
struct LinkIndex {
    by_target: HashMap<Location, HashSet<FileId>>,
    /// Link record id to (link location, target location).
    sources: HashMap<FileId, (Location, Location)>,
}

impl LinkIndex {
    fn remove(&mut self, id: FileId) {
        if let Some((_, target)) = self.sources.remove(&id) {
            if let Some(ids) = self.by_target.get_mut(&target) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_target.remove(&target);
                }
            }
        }
    }
}

pub(crate) struct CacheInner {
    config: CacheConfig,
    backends: BackendRegistry,
    mounter: Option<Arc<dyn Mounter>>,
    directories: Mutex<HashMap<Location, Arc<Directory>>>,
    links: Mutex<LinkIndex>,
    next_id: AtomicU64,
    wake: Arc<Notify>,
    worker_running: AtomicBool,
    weak_self: Weak<CacheInner>,
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        self.wake.notify_one();
    }
}

/// Handle to a file cache. Clones share the same cache.
#[derive(Clone)]
pub struct FileCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("directories", &self.inner.lock_directories().len())
            .finish()
    }
}

async fn run_worker(inner: Weak<CacheInner>, wake: Arc<Notify>) {
    loop {
        wake.notified().await;
        let Some(cache) = inner.upgrade() else {
            break;
        };
        let processed = cache.process_pending().await;
        log::debug!("refresh worker processed {} records", processed);
    }
}

impl FileCache {
    /// A cache over the default backends, without a mounter.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_parts(config, BackendRegistry::with_defaults(), None)
    }

    /// Starts the refresh worker when `config.start_worker` is set and a
    /// tokio runtime is running.
    pub fn with_parts(
        config: CacheConfig,
        backends: BackendRegistry,
        mounter: Option<Arc<dyn Mounter>>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak| CacheInner {
            config,
            backends,
            mounter,
            directories: Mutex::new(HashMap::new()),
            links: Mutex::new(LinkIndex::default()),
            next_id: AtomicU64::new(1),
            wake: Arc::new(Notify::new()),
            worker_running: AtomicBool::new(false),
            weak_self: weak.clone(),
        });

        if inner.config.start_worker {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                inner.worker_running.store(true, Ordering::SeqCst);
                handle.spawn(run_worker(Arc::downgrade(&inner), inner.wake.clone()));
            }
        }

        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<CacheInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.inner.backends
    }

    /// The record for `location`, created and registered when absent.
    pub fn get(&self, location: &Location) -> Arc<FileRecord> {
        self.inner.get(location)
    }

    pub fn get_existing(&self, location: &Location) -> Option<Arc<FileRecord>> {
        self.inner.get_existing(location)
    }

    pub fn get_by_uri(&self, uri: &str) -> FileResult<Arc<FileRecord>> {
        Ok(self.get(&Location::parse(uri)?))
    }

    pub fn get_existing_by_uri(&self, uri: &str) -> Option<Arc<FileRecord>> {
        Location::parse(uri)
            .ok()
            .and_then(|location| self.get_existing(&location))
    }

    /// The directory object for `location`, created when absent.
    pub fn directory(&self, location: &Location) -> Arc<Directory> {
        self.inner.directory(location)
    }

    pub fn existing_directory(&self, location: &Location) -> Option<Arc<Directory>> {
        self.inner.lock_directories().get(location).cloned()
    }

    /// Registers a virtual desktop icon at `location`.
    pub fn add_desktop_link(&self, location: &Location, link: Arc<dyn DesktopLink>) -> Arc<FileRecord> {
        self.inner.add_desktop_link(location, link)
    }

    pub fn file_for(&self, location: &Location) -> FileResult<Box<dyn File>> {
        self.inner.file_for(location)
    }

    /// Fetches the stale categories of every queued record. Returns how many
    /// records were refreshed. The worker calls this when woken; caches
    /// without a worker are driven by calling it directly.
    pub async fn process_pending(&self) -> usize {
        self.inner.process_pending().await
    }

    /// A file appeared at `location`.
    pub fn file_added(&self, location: &Location) {
        let Some(parent) = location.parent() else {
            return;
        };
        let record = self.get(location);
        let directory = self.directory(&parent);
        if directory.is_loaded() && directory.activate(&record) {
            directory.emit(DirectoryEvent::FilesAdded(vec![location.clone()]));
        }
        record.invalidate_attributes(Attributes::INFO);
    }

    /// The file at `location` was deleted.
    pub fn file_removed(&self, location: &Location) {
        if let Some(record) = self.get_existing(location) {
            record.mark_gone();
            record.changed();
        }
        let removed: Vec<Arc<Directory>> = {
            let mut directories = self.inner.lock_directories();
            let doomed: Vec<Location> = directories
                .keys()
                .filter(|l| *l == location || l.has_prefix(location))
                .cloned()
                .collect();
            doomed
                .iter()
                .filter_map(|l| directories.remove(l))
                .collect()
        };
        for directory in removed {
            for record in directory.files() {
                record.mark_gone();
            }
            directory.unload();
        }
    }

    /// The contents or attributes of the file at `location` changed.
    pub fn file_changed(&self, location: &Location) {
        if let Some(record) = self.get_existing(location) {
            record.invalidate_all_attributes();
        }
    }

    /// The file at `from` is now at `to`.
    pub fn file_moved(&self, from: &Location, to: &Location) {
        let Some(record) = self.get_existing(from) else {
            self.file_added(to);
            return;
        };

        if let Some(other) = self.get_existing(to) {
            if !Arc::ptr_eq(&other, &record) {
                other.mark_gone();
                other.changed();
            }
        }

        if from.parent() == to.parent() {
            record.update_name(&to.basename());
        } else if let Some(parent) = to.parent() {
            if let Some(old_directory) = record.directory() {
                old_directory.remove_entry(&record.name(), &record);
            }
            let directory = self.directory(&parent);
            record.reparent(&directory, to.clone());
            if let Some(displaced) = directory.insert(&record) {
                displaced.mark_gone();
            }
            if directory.is_loaded() {
                directory.emit(DirectoryEvent::FilesAdded(vec![to.clone()]));
            }
        }

        self.inner.relocate(from, to);
        record.invalidate_attributes(Attributes::INFO);
        record.changed();
    }

    /// Drops directories that nothing refers to any more. Returns how many
    /// were dropped.
    pub fn collect_garbage(&self) -> usize {
        let mut directories = self.inner.lock_directories();
        let before = directories.len();
        directories.retain(|_, d| !d.is_unused());
        let dropped = before - directories.len();
        drop(directories);
        crate::intern::collect_garbage();
        dropped
    }
}

impl CacheInner {
    fn lock_directories(&self) -> MutexGuard<'_, HashMap<Location, Arc<Directory>>> {
        self.directories.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_links(&self) -> MutexGuard<'_, LinkIndex> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub(crate) fn worker_running(&self) -> bool {
        self.worker_running.load(Ordering::SeqCst)
    }

    pub(crate) fn wake(&self) {
        self.wake.notify_one();
    }

    pub(crate) fn file_for(&self, location: &Location) -> FileResult<Box<dyn File>> {
        self.backends.file_for_location(location)
    }

    fn next_id(&self) -> FileId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn directory(&self, location: &Location) -> Arc<Directory> {
        self.lock_directories()
            .entry(location.clone())
            .or_insert_with(|| Arc::new(Directory::new(location.clone(), self.weak_self.clone())))
            .clone()
    }

    fn new_record(&self, kind: FileKind, location: &Location, self_owned: bool, directory: &Arc<Directory>) -> Arc<FileRecord> {
        Arc::new(FileRecord::new(
            self.next_id(),
            kind,
            location.clone(),
            self_owned,
            self.weak_self.clone(),
            Arc::downgrade(directory),
        ))
    }

    /// The record for `location` filed in `directory`.
    pub(crate) fn record_in(&self, directory: &Arc<Directory>, location: &Location) -> Arc<FileRecord> {
        directory.get_or_insert(&location.basename(), || {
            self.new_record(FileKind::for_location(location), location, false, directory)
        })
    }

    pub(crate) fn get(&self, location: &Location) -> Arc<FileRecord> {
        match location.parent() {
            Some(parent) => {
                let directory = self.directory(&parent);
                self.record_in(&directory, location)
            }
            None => {
                let directory = self.directory(location);
                directory.self_record_or_insert(|| {
                    self.new_record(FileKind::for_location(location), location, true, &directory)
                })
            }
        }
    }

    pub(crate) fn get_existing(&self, location: &Location) -> Option<Arc<FileRecord>> {
        let record = match location.parent() {
            Some(parent) => self
                .lock_directories()
                .get(&parent)
                .cloned()?
                .find(&location.basename()),
            None => self.lock_directories().get(location).cloned()?.self_record(),
        };
        record.filter(|r| !r.is_gone())
    }

    fn add_desktop_link(&self, location: &Location, link: Arc<dyn DesktopLink>) -> Arc<FileRecord> {
        let parent = location.parent().unwrap_or_else(|| location.clone());
        let directory = self.directory(&parent);
        let record = directory.get_or_insert(&location.basename(), || {
            self.new_record(FileKind::DesktopIcon(link), location, false, &directory)
        });
        if directory.is_loaded() && directory.activate(&record) {
            directory.emit(DirectoryEvent::FilesAdded(vec![location.clone()]));
        }
        record.mark_up_to_date(Attributes::all());
        record
    }

    // Symbolic link index

    pub(crate) fn register_link(&self, id: FileId, source: Location, target: Option<Location>) {
        let mut links = self.lock_links();
        links.remove(id);
        if let Some(target) = target {
            links.by_target.entry(target.clone()).or_default().insert(id);
            links.sources.insert(id, (source, target));
        }
    }

    pub(crate) fn unregister_link(&self, id: FileId) {
        self.lock_links().remove(id);
    }

    /// Locations of the symbolic links known to point at `target`.
    pub(crate) fn links_to(&self, target: &Location) -> Vec<Location> {
        let links = self.lock_links();
        links
            .by_target
            .get(target)
            .into_iter()
            .flatten()
            .filter_map(|id| links.sources.get(id).map(|(source, _)| source.clone()))
            .collect()
    }

    /// Rewrites every location at or below `old` to live below `new`.
    pub(crate) fn relocate(&self, old: &Location, new: &Location) {
        {
            let mut directories = self.lock_directories();
            let moved: Vec<Location> = directories
                .keys()
                .filter(|l| *l == old || l.has_prefix(old))
                .cloned()
                .collect();
            for location in moved {
                let (Some(directory), Some(to)) = (directories.remove(&location), location.reparent(old, new)) else {
                    continue;
                };
                directory.set_location(to.clone());
                for record in directory.files() {
                    record.with_details_mut(|d| d.location = to.child(&d.name));
                }
                directories.insert(to, directory);
            }
        }

        let mut links = self.lock_links();
        let LinkIndex { by_target, sources } = &mut *links;
        for (source, target) in sources.values_mut() {
            if let Some(moved) = source.reparent(old, new) {
                *source = moved;
            }
            if let Some(moved) = target.reparent(old, new) {
                *target = moved;
            }
        }
        let retargeted: Vec<Location> = by_target
            .keys()
            .filter(|l| *l == old || l.has_prefix(old))
            .cloned()
            .collect();
        for target in retargeted {
            if let (Some(ids), Some(moved)) = (by_target.remove(&target), target.reparent(old, new)) {
                by_target.entry(moved).or_default().extend(ids);
            }
        }
    }

    // Queries

    pub(crate) async fn mount_enclosing_volume(
        &self,
        location: &Location,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        match &self.mounter {
            Some(mounter) => {
                log::info!("mounting the volume of {}", location);
                mounter.mount_enclosing_volume(location, cancellable).await
            }
            None => Err(FileError::new(
                FileErrorKind::NotMounted,
                format!("{} is not mounted", location),
            )),
        }
    }

    /// Queries the full attribute set, mounting the enclosing volume and
    /// retrying once when the location is not mounted.
    pub(crate) async fn query_info(
        &self,
        location: &Location,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<FileInfo> {
        let file = self.file_for(location)?;
        let flags = FileQueryInfoFlags::NOFOLLOW_SYMLINKS;
        match file.query_info(DEFAULT_ATTRIBUTES, flags, cancellable).await {
            Err(e) if e.kind() == FileErrorKind::NotMounted => {
                self.mount_enclosing_volume(location, cancellable).await?;
                file.query_info(DEFAULT_ATTRIBUTES, flags, cancellable).await
            }
            result => result,
        }
    }

    // Refresh

    async fn process_pending(&self) -> usize {
        let mut processed = 0;
        loop {
            let directories: Vec<Arc<Directory>> = self.lock_directories().values().cloned().collect();
            let batch: Vec<Arc<FileRecord>> = directories.iter().flat_map(|d| d.drain_queue()).collect();
            if batch.is_empty() {
                return processed;
            }
            for record in batch {
                let mask = record.pending_attributes();
                if !mask.is_empty() {
                    self.refresh(&record, mask).await;
                    processed += 1;
                }
            }
        }
    }

    /// Fetches the categories in `mask` for `record`, marks them up to date
    /// and emits `Changed` when any value changed.
    pub(crate) async fn refresh(&self, record: &Arc<FileRecord>, mask: Attributes) {
        let location = record.location();
        let mut changed = false;

        if mask.contains(Attributes::INFO) {
            changed |= match self.query_info(&location, None).await {
                Ok(info) => record.update_info(Some(&info)),
                Err(e) if e.kind() == FileErrorKind::NotFound => record.update_info(None),
                Err(e) => {
                    log::debug!("query of {} failed: {}", location, e);
                    record.set_info_failed(e)
                }
            };
            if record.is_gone() {
                record.mark_up_to_date(mask);
                if changed {
                    record.changed();
                }
                return;
            }
        }

        let Ok(file) = self.file_for(&location) else {
            record.mark_up_to_date(mask);
            return;
        };
        let is_directory = record.file_type() == FileType::Directory;

        if mask.contains(Attributes::FILESYSTEM_INFO) {
            let free = match file.query_filesystem_info("filesystem::*", None).await {
                Ok(info) => info
                    .get_uint64(attr::FILESYSTEM_FREE)
                    .map_or(Knowledge::Unknowable, Knowledge::Known),
                Err(_) => Knowledge::Unknowable,
            };
            changed |= record.with_details_mut(|d| std::mem::replace(&mut d.free_space, free) != free);
        }

        if mask.intersects(Attributes::DIRECTORY_ITEM_COUNT | Attributes::MIME_LIST) {
            let (count, mimes) = if is_directory {
                match list_children(file.as_ref()).await {
                    Ok(children) => {
                        let mut mimes: Vec<Arc<str>> = Vec::new();
                        for info in &children {
                            if let Some(mime) = info.get_content_type() {
                                if !mimes.iter().any(|m| &**m == mime) {
                                    mimes.push(intern(mime));
                                }
                            }
                        }
                        (Knowledge::Known(children.len() as u32), Some(mimes))
                    }
                    Err(_) => (Knowledge::Unknowable, None),
                }
            } else {
                (Knowledge::Unknowable, None)
            };
            changed |= record.with_details_mut(|d| {
                let mut changed = false;
                if mask.contains(Attributes::DIRECTORY_ITEM_COUNT) {
                    changed |= std::mem::replace(&mut d.item_count, count) != count;
                }
                if mask.contains(Attributes::MIME_LIST) && d.mime_list != mimes {
                    d.mime_list = mimes;
                    changed = true;
                }
                changed
            });
        }

        if mask.contains(Attributes::DEEP_COUNTS) && is_directory {
            self.count_deep(record, &location).await;
            changed = true;
        }

        if mask.intersects(Attributes::TOP_LEFT_TEXT | Attributes::LARGE_TOP_LEFT_TEXT) {
            let limits = if mask.contains(Attributes::LARGE_TOP_LEFT_TEXT) {
                metadata::TOP_LEFT_TEXT_LARGE
            } else {
                metadata::TOP_LEFT_TEXT_SMALL
            };
            let is_text = record
                .mime_type()
                .map_or(false, |m| MimeResolver::is_text(&m));
            let text = if is_text && record.file_type() == FileType::Regular {
                read_top_left_text(file.as_ref(), limits).await
            } else {
                None
            };
            changed |= record.with_details_mut(|d| {
                if d.top_left_text != text {
                    d.top_left_text = text;
                    true
                } else {
                    false
                }
            });
        }

        if mask.contains(Attributes::LINK_INFO) {
            let entry = match location.to_path() {
                Some(path) if record.is_desktop_file() => read_desktop_entry(&path).await.ok(),
                _ => None,
            };
            let (name, icon) = entry.map_or((None, None), |e| (e.name, e.icon));
            changed |= record.set_link_info(name, icon);
        }

        if mask.contains(Attributes::THUMBNAIL) {
            let found = match location.to_path() {
                Some(_) if record.file_type() == FileType::Regular => {
                    thumbnail::lookup(&self.config, &location.uri(), record.mtime()).await
                }
                _ => thumbnail::ThumbnailLookup::default(),
            };
            changed |= record.with_details_mut(|d| {
                let changed = d.thumbnail_path != found.path || d.thumbnailing_failed != found.failed;
                d.thumbnail_path = found.path;
                d.thumbnailing_failed = found.failed;
                changed
            });
        }

        if mask.contains(Attributes::MOUNT) {
            let root = match &self.mounter {
                Some(mounter) => match mounter.find_enclosing_mount(&location, None).await {
                    Ok(Some(mount)) if mount.root() == location => Some(location.clone()),
                    _ => None,
                },
                None => None,
            };
            changed |= record.with_details_mut(|d| {
                if d.mount_root != root {
                    d.mount_root = root;
                    true
                } else {
                    false
                }
            });
        }

        record.mark_up_to_date(mask);
        if changed {
            record.changed();
        }
    }

    /// Walks the subtree below `location` without following symbolic links,
    /// publishing partial totals after every folder.
    async fn count_deep(&self, record: &Arc<FileRecord>, location: &Location) {
        let mut counts = DeepCounts {
            status: DeepCountStatus::InProgress,
            ..DeepCounts::default()
        };
        let mut pending = VecDeque::from([location.clone()]);

        while let Some(folder) = pending.pop_front() {
            let children = match self.file_for(&folder) {
                Ok(file) => list_children(file.as_ref()).await,
                Err(e) => Err(e),
            };
            match children {
                Ok(children) => {
                    for info in children {
                        let is_link = info.get_boolean(attr::STANDARD_IS_SYMLINK).unwrap_or(false);
                        if info.get_file_type() == FileType::Directory && !is_link {
                            counts.directories += 1;
                            if let Some(name) = info.get_name() {
                                pending.push_back(folder.child(name));
                            }
                        } else {
                            counts.files += 1;
                            counts.total_size += info.get_size().max(0) as u64;
                        }
                    }
                }
                Err(_) => counts.unreadable_directories += 1,
            }
            record.with_details_mut(|d| d.deep_counts = counts);
            record.emit(FileEvent::UpdatedDeepCountInProgress);
        }

        counts.status = DeepCountStatus::Done;
        record.with_details_mut(|d| d.deep_counts = counts);
    }
}

async fn list_children(file: &dyn File) -> FileResult<Vec<FileInfo>> {
    let mut enumerator = file
        .enumerate_children("standard::*", None)
        .await?;
    let mut children = Vec::new();
    while let Some((info, _)) = enumerator.next_file(None).await? {
        children.push(info);
    }
    enumerator.close(None).await?;
    Ok(children)
}

async fn read_top_left_text(file: &dyn File, limits: TopLeftTextLimits) -> Option<String> {
    let stream = file.read(None).await.ok()?;
    let mut head = Vec::with_capacity(limits.max_bytes);
    stream
        .take(limits.max_bytes as u64)
        .read_to_end(&mut head)
        .await
        .ok()?;
    metadata::top_left_text(&head, limits)
}
