use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cancellable::Cancellable;
use crate::error::{describe_load_error, FileError, FileErrorKind, FileResult};
use crate::file_info::DEFAULT_ATTRIBUTES;
use crate::intern::intern;
use crate::location::Location;
use crate::model::cache::{CacheInner, FileCache};
use crate::model::file::FileRecord;
use crate::monitor::FileMonitorEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEvent {
    FilesAdded(Vec<Location>),
    FilesChanged(Vec<Location>),
    FilesRemoved(Vec<Location>),
    DoneLoading,
    /// Loading failed. `message` is the user-facing text for the error.
    LoadError { kind: FileErrorKind, message: String },
}

/// Smallest index size that triggers a sweep of dead entries.
const MIN_PRUNE_AT: usize = 64;

#[derive(Default)]
struct DirectoryState {
    /// Every record known by name. Entries whose record died are pruned
    /// once the map reaches `prune_at`.
    index: HashMap<Arc<str>, Weak<FileRecord>>,
    prune_at: usize,
    /// Records listed by the last load, kept alive while the directory is.
    active: HashMap<Arc<str>, Arc<FileRecord>>,
    /// The record standing for the directory itself, for parentless
    /// locations.
    self_record: Weak<FileRecord>,
    queue: VecDeque<Weak<FileRecord>>,
    hidden_names: HashSet<String>,
    loaded: bool,
}

/// The records of one folder.
pub struct Directory {
    location: RwLock<Location>,
    cache: Weak<CacheInner>,
    state: Mutex<DirectoryState>,
    events: broadcast::Sender<DirectoryEvent>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("location", &self.location())
            .finish()
    }
}

impl Directory {
    pub(crate) fn new(location: Location, cache: Weak<CacheInner>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            location: RwLock::new(location),
            cache,
            state: Mutex::new(DirectoryState::default()),
            events,
            monitor: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn location(&self) -> Location {
        self.location
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_location(&self, location: Location) {
        *self.location.write().unwrap_or_else(PoisonError::into_inner) = location;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DirectoryEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: DirectoryEvent) {
        let _ = self.events.send(event);
    }

    /// Live records of this folder, in no particular order.
    pub fn files(&self) -> Vec<Arc<FileRecord>> {
        self.lock()
            .index
            .values()
            .filter_map(Weak::upgrade)
            .filter(|r| !r.is_gone())
            .collect()
    }

    /// Records listed by the last load.
    pub fn active_files(&self) -> Vec<Arc<FileRecord>> {
        self.lock().active.values().cloned().collect()
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().loaded
    }

    /// Whether `name` is listed in the folder's `.hidden` file.
    pub fn is_hidden_name(&self, name: &str) -> bool {
        self.lock().hidden_names.contains(name)
    }

    pub(crate) fn find(&self, name: &str) -> Option<Arc<FileRecord>> {
        self.lock().index.get(name).and_then(Weak::upgrade)
    }

    pub(crate) fn self_record(&self) -> Option<Arc<FileRecord>> {
        self.lock().self_record.upgrade()
    }

    /// The live record called `name`, or a new one built by `make`.
    pub(crate) fn get_or_insert(
        &self,
        name: &str,
        make: impl FnOnce() -> Arc<FileRecord>,
    ) -> Arc<FileRecord> {
        let mut state = self.lock();
        if let Some(existing) = state.index.get(name).and_then(Weak::upgrade) {
            return existing;
        }
        if state.index.len() >= state.prune_at {
            state.index.retain(|_, w| w.strong_count() > 0);
            state.prune_at = (state.index.len() * 2).max(MIN_PRUNE_AT);
        }
        let record = make();
        state.index.insert(intern(name), Arc::downgrade(&record));
        record
    }

    #[cfg(test)]
    fn indexed_count(&self) -> usize {
        self.lock().index.len()
    }

    pub(crate) fn self_record_or_insert(
        &self,
        make: impl FnOnce() -> Arc<FileRecord>,
    ) -> Arc<FileRecord> {
        let mut state = self.lock();
        if let Some(existing) = state.self_record.upgrade() {
            return existing;
        }
        let record = make();
        state.self_record = Arc::downgrade(&record);
        record
    }

    /// Adopts a record moved in from another folder. A different record of
    /// the same name is returned so the caller can mark it gone.
    pub(crate) fn insert(&self, record: &Arc<FileRecord>) -> Option<Arc<FileRecord>> {
        let name = record.name();
        let mut state = self.lock();
        let displaced = state
            .index
            .insert(name.clone(), Arc::downgrade(record))
            .and_then(|w| w.upgrade())
            .filter(|other| !Arc::ptr_eq(other, record));
        if state.loaded {
            state.active.insert(name, record.clone());
        }
        displaced
    }

    /// Makes a record part of the listing. Returns whether it was new there.
    pub(crate) fn activate(&self, record: &Arc<FileRecord>) -> bool {
        let mut state = self.lock();
        state
            .active
            .insert(record.name(), record.clone())
            .map_or(true, |previous| !Arc::ptr_eq(&previous, record))
    }

    /// Removes `record` from the folder if it is still filed under `name`.
    pub(crate) fn remove_entry(&self, name: &str, record: &FileRecord) {
        let removed = {
            let mut state = self.lock();
            let filed = state
                .index
                .get(name)
                .map_or(false, |w| std::ptr::eq(w.as_ptr(), record));
            if filed {
                state.index.remove(name);
            }
            let listed = state
                .active
                .get(name)
                .map_or(false, |r| std::ptr::eq(Arc::as_ptr(r), record));
            if listed {
                state.active.remove(name);
            }
            listed
        };
        if removed {
            self.emit(DirectoryEvent::FilesRemoved(vec![record.location()]));
        }
    }

    pub(crate) fn clear_self_record(&self, record: &FileRecord) {
        let mut state = self.lock();
        if std::ptr::eq(state.self_record.as_ptr(), record) {
            state.self_record = Weak::new();
        }
    }

    pub(crate) fn rename_entry(&self, old_name: &str, new_name: &Arc<str>, record: &FileRecord) {
        let mut state = self.lock();
        if let Some(weak) = state.index.remove(old_name) {
            if std::ptr::eq(weak.as_ptr(), record) {
                state.index.insert(new_name.clone(), weak);
            } else {
                state.index.insert(intern(old_name), weak);
            }
        }
        if let Some(strong) = state.active.remove(old_name) {
            if std::ptr::eq(Arc::as_ptr(&strong), record) {
                state.active.insert(new_name.clone(), strong);
            } else {
                state.active.insert(intern(old_name), strong);
            }
        }
    }

    pub(crate) fn enqueue(&self, record: &Arc<FileRecord>) {
        let mut state = self.lock();
        if !state.queue.iter().any(|w| std::ptr::eq(w.as_ptr(), Arc::as_ptr(record))) {
            state.queue.push_back(Arc::downgrade(record));
        }
    }

    pub(crate) fn drain_queue(&self) -> Vec<Arc<FileRecord>> {
        self.lock()
            .queue
            .drain(..)
            .filter_map(|w| w.upgrade())
            .collect()
    }

    /// Nothing outside the cache refers to the folder or its records.
    pub(crate) fn is_unused(self: &Arc<Self>) -> bool {
        if Arc::strong_count(self) > 1 || self.events.receiver_count() > 0 {
            return false;
        }
        let mut state = self.lock();
        state.index.retain(|_, w| w.strong_count() > 0);
        state.active.is_empty() && state.index.is_empty() && state.self_record.strong_count() == 0
    }

    /// Enumerates the folder, refreshing every child record, then starts
    /// watching it when the cache is configured to.
    ///
    /// Emits `FilesAdded` for newly listed children, `FilesRemoved` for
    /// previously listed ones that vanished, then `DoneLoading`. A failure
    /// other than cancellation is also reported as `LoadError`.
    pub async fn load(self: &Arc<Self>, cancellable: Option<&Cancellable>) -> FileResult<()> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        let cache = self.cache.upgrade().ok_or_else(|| {
            FileError::new(FileErrorKind::Failed, "The file cache has been dropped")
        })?;
        let location = self.location();

        let listing = match self.enumerate(&cache, &location, cancellable).await {
            Ok(listing) => listing,
            Err(e) => {
                if let Some(msg) = describe_load_error(&e, &location) {
                    log::warn!("failed to load {}: {}", location, e);
                    self.emit(DirectoryEvent::LoadError {
                        kind: e.kind(),
                        message: format!("{} {}", msg.primary, msg.detail),
                    });
                }
                return Err(e);
            }
        };

        let hidden_names = match location.to_path() {
            Some(path) => match tokio::fs::read_to_string(path.join(".hidden")).await {
                Ok(content) => parse_hidden_file(&content),
                Err(_) => HashSet::new(),
            },
            None => HashSet::new(),
        };

        let (added, vanished) = {
            let mut state = self.lock();
            let mut active = HashMap::with_capacity(listing.len());
            let mut added = Vec::new();
            for record in listing {
                let name = record.name();
                let was_listed = state
                    .active
                    .get(&name)
                    .map_or(false, |r| Arc::ptr_eq(r, &record));
                if !was_listed {
                    added.push(record.location());
                }
                active.insert(name, record);
            }
            let previous = std::mem::replace(&mut state.active, active);
            let vanished: Vec<Arc<FileRecord>> = previous
                .into_iter()
                .filter(|(name, _)| !state.active.contains_key(name))
                .map(|(_, r)| r)
                .collect();
            state.hidden_names = hidden_names;
            state.loaded = true;
            (added, vanished)
        };

        if !vanished.is_empty() {
            for record in &vanished {
                record.mark_gone();
            }
            self.emit(DirectoryEvent::FilesRemoved(
                vanished.iter().map(|r| r.location()).collect(),
            ));
        }
        if !added.is_empty() {
            self.emit(DirectoryEvent::FilesAdded(added));
        }
        self.emit(DirectoryEvent::DoneLoading);

        if cache.config().monitor_directories {
            self.start_monitoring(&cache, &location).await;
        }
        Ok(())
    }

    async fn enumerate(
        self: &Arc<Self>,
        cache: &Arc<CacheInner>,
        location: &Location,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Vec<Arc<FileRecord>>> {
        let file = cache.file_for(location)?;
        let mut enumerator = match file.enumerate_children(DEFAULT_ATTRIBUTES, cancellable).await {
            Err(e) if e.kind() == FileErrorKind::NotMounted => {
                cache.mount_enclosing_volume(location, cancellable).await?;
                file.enumerate_children(DEFAULT_ATTRIBUTES, cancellable).await?
            }
            other => other?,
        };

        let mut listing = Vec::new();
        while let Some((info, child)) = enumerator.next_file(cancellable).await? {
            let record = cache.record_in(self, &child);
            record.update_info(Some(&info));
            if !record.is_gone() {
                listing.push(record);
            }
        }
        enumerator.close(cancellable).await?;
        Ok(listing)
    }

    async fn start_monitoring(self: &Arc<Self>, cache: &Arc<CacheInner>, location: &Location) {
        if self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(false, |h| !h.is_finished())
        {
            return;
        }

        let mut monitor = match cache.file_for(location) {
            Ok(file) => match file.monitor(None).await {
                Ok(monitor) => monitor,
                Err(e) => {
                    log::debug!("not monitoring {}: {}", location, e);
                    return;
                }
            },
            Err(_) => return,
        };

        let weak_cache = Arc::downgrade(cache);
        let handle = tokio::spawn(async move {
            while let Some(event) = monitor.next_event().await {
                let Some(inner) = weak_cache.upgrade() else {
                    break;
                };
                let cache = FileCache::from_inner(inner);
                match event {
                    FileMonitorEvent::Created(child) => cache.file_added(&child),
                    FileMonitorEvent::Deleted(child) => cache.file_removed(&child),
                    FileMonitorEvent::Changed(child) | FileMonitorEvent::AttributeChanged(child) => {
                        cache.file_changed(&child)
                    }
                    FileMonitorEvent::Moved(from, to) => cache.file_moved(&from, &to),
                }
            }
        });
        *self.monitor.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Stops watching the folder and releases the listing.
    pub fn unload(&self) {
        if let Some(handle) = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        let mut state = self.lock();
        state.active.clear();
        state.loaded = false;
    }
}

impl Drop for Directory {
    fn drop(&mut self) {
        if let Some(handle) = self
            .monitor
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

/// Names listed one per line in a folder's `.hidden` file.
pub fn parse_hidden_file(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_file_lists_names() {
        let names = parse_hidden_file("build\n\n  notes.txt \n");
        assert_eq!(names.len(), 2);
        assert!(names.contains("build"));
        assert!(names.contains("notes.txt"));
    }

    #[tokio::test]
    async fn dead_index_entries_are_pruned() {
        let root = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(crate::config::CacheConfig::with_root(root.path()).worker(false));
        let parent = Location::for_path(root.path());
        let directory = cache.directory(&parent);

        let kept = cache.get(&parent.child("kept"));
        for i in 0..(MIN_PRUNE_AT * 4) {
            drop(cache.get(&parent.child(&format!("short-lived-{}", i))));
        }

        assert!(directory.indexed_count() <= MIN_PRUNE_AT);
        assert!(Arc::ptr_eq(&kept, &cache.get(&parent.child("kept"))));
    }
}
