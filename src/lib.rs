//! # npfm - Nepsod file model
//!
//! The data layer of a Linux file manager: an async cache of file records,
//! directory listings kept in step with the disk, and undoable file
//! operations.
//!
//! ## Core Concepts
//!
//! - **FileCache**: hands out one shared `FileRecord` per location and
//!   refreshes stale attribute categories in the background
//! - **FileRecord**: the cached view of one file, with its mutators
//!   (rename, permissions, owner, group)
//! - **Directory**: the listing of one folder, loaded on demand and
//!   followed with a file monitor
//! - **FileOperations**: copy, move, trash, link and create files, leaving
//!   an undo entry behind
//! - **UndoManager**: holds the last undoable operation and replays it
//! - **Backend**: pluggable filesystem implementations per URI scheme
//!
//! ## Example
//!
//! ```no_run
//! use npfm::{Attributes, CacheConfig, FileCache, FileOperations, Location, UndoManager, UndoScope};
//!
//! # async fn example() -> npfm::FileResult<()> {
//! let cache = FileCache::new(CacheConfig::from_env());
//! let manager = UndoManager::get();
//! let ops = FileOperations::new(cache.clone(), UndoScope::Record(manager.clone()));
//!
//! let home = Location::for_path(&cache.config().home_dir);
//! let folder = ops.new_folder(&home, None, None).await?;
//!
//! let record = cache.get(&folder);
//! record.call_when_ready(Attributes::INFO).await;
//! println!("created {}", record.display_name());
//!
//! // Removes the folder again.
//! manager.undo(&ops, None).await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cancellable;
pub mod config;
pub mod error;
pub mod file;
pub mod file_enumerator;
pub mod file_info;
pub mod intern;
pub mod iostream;
pub mod job;
pub mod location;
pub mod metadata;
pub mod model;
pub mod monitor;
pub mod mount;
pub mod service;
pub mod undo;
pub mod volume;

pub use backend::{Backend, BackendRegistry};
pub use backend::mount::MountTable;
pub use backend::udisks2::UDisks2Backend;
pub use cancellable::Cancellable;
pub use config::CacheConfig;
pub use error::{FileError, FileErrorKind, FileResult};
pub use file::{File, FileQueryInfoFlags};
pub use file_enumerator::FileEnumerator;
pub use file_info::{FileAttributeType, FileInfo, FileType};
pub use iostream::{InputStream, OutputStream};
pub use job::{CopyFlags, FileOperations, ProgressCallback};
pub use location::Location;
pub use metadata::MimeResolver;
pub use model::attributes::{Attributes, DeepCountStatus, DeepCounts, Knowledge};
pub use model::cache::FileCache;
pub use model::directory::{Directory, DirectoryEvent};
pub use model::file::{AccessFlags, DateKind, FileEvent, FileKind, FileRecord};
pub use model::link::DesktopLink;
pub use model::sort::SortKey;
pub use monitor::{FileMonitor, FileMonitorEvent};
pub use mount::{Mount, Mounter};
pub use service::trash::{TrashDir, TrashEntry, TrashEvent, TrashMonitor};
pub use undo::{UndoInfo, UndoManager, UndoOp, UndoScope, UndoState};
pub use volume::Volume;
