//! The freedesktop.org trash
//!
//! A trash directory holds the trashed items in `files/` and one
//! `NAME.trashinfo` key file per item in `info/`:
//!
//! ```text
//! [Trash Info]
//! Path=/home/ann/My%20Notes.txt
//! DeletionDate=2024-05-01T10:22:03
//! ```
//!
//! `Path` is percent-encoded, `DeletionDate` is local time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Local, NaiveDateTime, TimeZone};
use percent_encoding::utf8_percent_encode;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cancellable::Cancellable;
use crate::config::CacheConfig;
use crate::error::{FileError, FileErrorKind, FileResult};
use crate::file::local::LocalFile;
use crate::file::File;
use crate::location::{Location, PATH_ENCODE_SET};

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const INFO_SUFFIX: &str = ".trashinfo";

/// Seconds since the epoch for a `DeletionDate` value.
pub fn parse_deletion_date(value: &str) -> Option<i64> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), DATE_FORMAT).ok()?;
    Some(Local.from_local_datetime(&naive).earliest()?.timestamp())
}

/// The time `entries()` will report for an item trashed at `time`. The
/// stored date has no offset, so in a repeated hour it reads back as the
/// earlier instant.
fn recorded_deletion_time(time: i64) -> i64 {
    Local
        .timestamp_opt(time, 0)
        .single()
        .and_then(|date| parse_deletion_date(&date.format(DATE_FORMAT).to_string()))
        .unwrap_or(time)
}

pub fn format_trash_info(original: &Path, deletion_time: i64) -> String {
    let date = Local
        .timestamp_opt(deletion_time, 0)
        .single()
        .unwrap_or_else(Local::now)
        .format(DATE_FORMAT);
    format!(
        "[Trash Info]\nPath={}\nDeletionDate={}\n",
        utf8_percent_encode(&original.to_string_lossy(), PATH_ENCODE_SET),
        date
    )
}

/// Original path and deletion time of a `.trashinfo` file.
pub fn parse_trash_info(content: &str) -> Option<(PathBuf, i64)> {
    let mut original = None;
    let mut deleted = None;
    let mut in_group = false;
    for line in content.lines().map(str::trim) {
        if line.starts_with('[') {
            in_group = line == "[Trash Info]";
            continue;
        }
        if !in_group {
            continue;
        }
        if let Some(value) = line.strip_prefix("Path=") {
            original = urlencoding::decode(value).ok().map(|p| PathBuf::from(p.into_owned()));
        } else if let Some(value) = line.strip_prefix("DeletionDate=") {
            deleted = parse_deletion_date(value);
        }
    }
    Some((original?, deleted.unwrap_or(0)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashEntry {
    /// Where the item lives inside the trash.
    pub location: Location,
    pub info_path: PathBuf,
    pub original: PathBuf,
    pub deletion_time: i64,
}

#[derive(Debug, Clone)]
pub struct TrashDir {
    root: PathBuf,
}

impl TrashDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.trash_root.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    pub fn info_dir(&self) -> PathBuf {
        self.root.join("info")
    }

    /// True for items inside `files/`.
    pub fn contains(&self, path: &Path) -> bool {
        let files = self.files_dir();
        path != files && path.starts_with(&files)
    }

    /// Moves `path` into the trash. Fails with `NotSupported` when the item
    /// lives on another filesystem.
    pub async fn trash(&self, path: &Path, cancellable: Option<&Cancellable>) -> FileResult<TrashEntry> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        fs::symlink_metadata(path).await?;
        if self.contains(path) {
            return Err(FileError::new(
                FileErrorKind::NotSupported,
                "The item is already in the trash",
            ));
        }

        let files_dir = self.files_dir();
        let info_dir = self.info_dir();
        fs::create_dir_all(&files_dir).await?;
        fs::create_dir_all(&info_dir).await?;

        let original = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let basename = original
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| FileError::new(FileErrorKind::InvalidArg, "Cannot trash the root directory"))?;

        let deletion_time = recorded_deletion_time(Local::now().timestamp());
        let content = format_trash_info(&original, deletion_time);

        // Claiming the info file first reserves the name.
        let mut counter = 1;
        let (name, info_path) = loop {
            let name = if counter == 1 {
                basename.clone()
            } else {
                numbered_name(&basename, counter)
            };
            counter += 1;
            if fs::symlink_metadata(files_dir.join(&name)).await.is_ok() {
                continue;
            }
            let info_path = info_dir.join(format!("{}{}", name, INFO_SUFFIX));
            match OpenOptions::new().write(true).create_new(true).open(&info_path).await {
                Ok(mut file) => {
                    file.write_all(content.as_bytes()).await?;
                    file.flush().await?;
                    break (name, info_path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        };

        let target = files_dir.join(&name);
        if let Err(e) = fs::rename(&original, &target).await {
            let _ = fs::remove_file(&info_path).await;
            if e.raw_os_error() == Some(libc::EXDEV) {
                return Err(FileError::with_source(
                    FileErrorKind::NotSupported,
                    "Unable to trash items on another filesystem",
                    Box::new(e),
                ));
            }
            return Err(e.into());
        }

        log::debug!("trashed {} as {}", original.display(), name);
        Ok(TrashEntry {
            location: Location::for_path(target),
            info_path,
            original,
            deletion_time,
        })
    }

    /// Everything currently in the trash that has a readable info file.
    pub async fn entries(&self) -> FileResult<Vec<TrashEntry>> {
        let mut entries = Vec::new();
        let mut dir = match fs::read_dir(self.info_dir()).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };
        let files_dir = self.files_dir();
        while let Some(item) = dir.next_entry().await? {
            let file_name = item.file_name().to_string_lossy().into_owned();
            let Some(name) = file_name.strip_suffix(INFO_SUFFIX) else {
                continue;
            };
            let target = files_dir.join(name);
            if fs::symlink_metadata(&target).await.is_err() {
                continue;
            }
            let Ok(content) = fs::read_to_string(item.path()).await else {
                continue;
            };
            if let Some((original, deletion_time)) = parse_trash_info(&content) {
                entries.push(TrashEntry {
                    location: Location::for_path(target),
                    info_path: item.path(),
                    original,
                    deletion_time,
                });
            }
        }
        Ok(entries)
    }

    /// Moves an item back to `destination`, or to where it came from.
    pub async fn restore(
        &self,
        entry: &TrashEntry,
        destination: Option<&Path>,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<PathBuf> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        let source = entry.location.to_path().ok_or_else(|| {
            FileError::new(FileErrorKind::InvalidArg, "Trash entries are local files")
        })?;
        let target = destination.unwrap_or(&entry.original).to_path_buf();
        if fs::symlink_metadata(&target).await.is_ok() {
            return Err(FileError::new(
                FileErrorKind::Exists,
                format!("{} already exists", target.display()),
            ));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&source, &target).await?;
        if let Err(e) = fs::remove_file(&entry.info_path).await {
            log::warn!("failed to remove {}: {}", entry.info_path.display(), e);
        }
        Ok(target)
    }

    /// Permanently deletes everything in the trash.
    pub async fn empty(&self, cancellable: Option<&Cancellable>) -> FileResult<()> {
        for dir in [self.files_dir(), self.info_dir()] {
            let mut items = match fs::read_dir(&dir).await {
                Ok(items) => items,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(item) = items.next_entry().await? {
                if let Some(c) = cancellable {
                    c.check()?;
                }
                let path = item.path();
                if item.file_type().await?.is_dir() {
                    fs::remove_dir_all(&path).await?;
                } else {
                    fs::remove_file(&path).await?;
                }
            }
        }
        Ok(())
    }

    pub async fn is_empty(&self) -> bool {
        match fs::read_dir(self.files_dir()).await {
            Ok(mut items) => matches!(items.next_entry().await, Ok(None)),
            Err(_) => true,
        }
    }
}

/// `notes.txt` becomes `notes.2.txt`.
fn numbered_name(name: &str, counter: u32) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}.{}{}", &name[..dot], counter, &name[dot..]),
        _ => format!("{}.{}", name, counter),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashEvent {
    StateChanged { is_empty: bool },
}

/// Watches a trash directory and reports when it becomes empty or stops
/// being empty.
pub struct TrashMonitor {
    events: broadcast::Sender<TrashEvent>,
    is_empty: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl TrashMonitor {
    pub async fn new(trash: &TrashDir) -> FileResult<Self> {
        fs::create_dir_all(trash.files_dir()).await?;
        let mut monitor = LocalFile::new(trash.files_dir()).monitor(None).await?;

        let is_empty = Arc::new(AtomicBool::new(trash.is_empty().await));
        let (events, _) = broadcast::channel(16);

        let trash = trash.clone();
        let state = is_empty.clone();
        let tx = events.clone();
        let task = tokio::spawn(async move {
            while monitor.next_event().await.is_some() {
                let now_empty = trash.is_empty().await;
                if state.swap(now_empty, Ordering::SeqCst) != now_empty {
                    log::debug!("trash is now {}", if now_empty { "empty" } else { "full" });
                    let _ = tx.send(TrashEvent::StateChanged { is_empty: now_empty });
                }
            }
        });

        Ok(Self {
            events,
            is_empty,
            task,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrashEvent> {
        self.events.subscribe()
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty.load(Ordering::SeqCst)
    }
}

impl Drop for TrashMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_round_trips_encoded_path() {
        let content = format_trash_info(Path::new("/home/ann/My Notes #1.txt"), 1_700_000_000);
        assert!(content.contains("Path=/home/ann/My%20Notes%20%231.txt\n"));
        let (original, time) = parse_trash_info(&content).expect("parse");
        assert_eq!(original, PathBuf::from("/home/ann/My Notes #1.txt"));
        assert_eq!(time, 1_700_000_000);
    }

    #[test]
    fn info_without_path_is_rejected() {
        assert!(parse_trash_info("[Trash Info]\nDeletionDate=2024-01-01T00:00:00\n").is_none());
    }

    #[test]
    fn recorded_times_survive_the_info_file() {
        // Hourly across a year, so local DST changes are crossed.
        let start = 1_704_067_200;
        for hour in 0..(366 * 24) {
            let time = recorded_deletion_time(start + hour * 3600 + 1234);
            let content = format_trash_info(Path::new("/tmp/x"), time);
            assert_eq!(parse_trash_info(&content).map(|(_, t)| t), Some(time));
        }
    }

    #[test]
    fn numbered_names_keep_extension() {
        assert_eq!(numbered_name("notes.txt", 2), "notes.2.txt");
        assert_eq!(numbered_name("Makefile", 3), "Makefile.3");
        assert_eq!(numbered_name(".bashrc", 2), ".bashrc.2");
    }
}
