//! Undo entries
//!
//! One [`UndoInfo`] describes one completed operation with enough data to
//! run it backward (undo) and forward again (redo). Redo may move things to
//! new places (a new copy, a new trash name), so the payload is updated
//! after each forward replay.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::cancellable::Cancellable;
use crate::error::{FileError, FileErrorKind, FileResult};
use crate::job::FileOperations;
use crate::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UndoOp {
    Copy,
    Duplicate,
    Move,
    Rename,
    CreateEmptyFile,
    CreateFileFromTemplate,
    CreateFolder,
    MoveToTrash,
    RestoreFromTrash,
    CreateLink,
    RecursiveSetPermissions,
    SetPermissions,
    ChangeGroup,
    ChangeOwner,
}

/// What a created file is made from when it is created again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateTemplate {
    Folder,
    Contents(Vec<u8>),
    File(Location),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UndoPayload {
    /// Copy, duplicate, move, link and restore from trash: each origin with
    /// where it ended up.
    Ext {
        source_dir: Option<Location>,
        dest_dir: Location,
        pairs: Vec<(Location, Location)>,
    },
    Create {
        target: Location,
        template: CreateTemplate,
    },
    Rename {
        old: Location,
        new: Location,
    },
    /// Original locations with the time they were trashed at.
    Trash { items: Vec<(Location, i64)> },
    RecPermissions {
        dest_dir: Location,
        file_permissions: u32,
        file_mask: u32,
        dir_permissions: u32,
        dir_mask: u32,
        originals: Vec<(Location, u32)>,
    },
    Permissions {
        target: Location,
        old: u32,
        new: u32,
    },
    Ownership {
        target: Location,
        old: String,
        new: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoStrings {
    pub undo_label: String,
    pub undo_description: String,
    pub redo_label: String,
    pub redo_description: String,
}

#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub success: bool,
    /// The replay was cancelled by the user.
    pub user_cancel: bool,
    pub error: Option<FileError>,
}

#[derive(Debug)]
pub struct UndoInfo {
    op: UndoOp,
    item_count: usize,
    payload: Mutex<UndoPayload>,
}

fn quoted(location: &Location) -> String {
    format!("\u{201c}{}\u{201d}", location.basename())
}

fn quoted_path(location: &Location) -> String {
    format!("\u{201c}{}\u{201d}", location.path())
}

impl UndoInfo {
    pub fn new(op: UndoOp, item_count: usize, payload: UndoPayload) -> Self {
        Self {
            op,
            item_count,
            payload: Mutex::new(payload),
        }
    }

    pub fn ext(op: UndoOp, source_dir: Option<Location>, dest_dir: Location, pairs: Vec<(Location, Location)>) -> Self {
        Self::new(
            op,
            pairs.len(),
            UndoPayload::Ext {
                source_dir,
                dest_dir,
                pairs,
            },
        )
    }

    pub fn create(op: UndoOp, target: Location, template: CreateTemplate) -> Self {
        Self::new(op, 1, UndoPayload::Create { target, template })
    }

    pub fn rename(old: Location, new: Location) -> Self {
        Self::new(UndoOp::Rename, 1, UndoPayload::Rename { old, new })
    }

    pub fn trash(items: Vec<(Location, i64)>) -> Self {
        Self::new(UndoOp::MoveToTrash, items.len(), UndoPayload::Trash { items })
    }

    pub fn rec_permissions(
        dest_dir: Location,
        file_permissions: u32,
        file_mask: u32,
        dir_permissions: u32,
        dir_mask: u32,
        originals: Vec<(Location, u32)>,
    ) -> Self {
        Self::new(
            UndoOp::RecursiveSetPermissions,
            1,
            UndoPayload::RecPermissions {
                dest_dir,
                file_permissions,
                file_mask,
                dir_permissions,
                dir_mask,
                originals,
            },
        )
    }

    pub fn permissions(target: Location, old: u32, new: u32) -> Self {
        Self::new(UndoOp::SetPermissions, 1, UndoPayload::Permissions { target, old, new })
    }

    /// `op` is `ChangeOwner` or `ChangeGroup`.
    pub fn ownership(op: UndoOp, target: Location, old: String, new: String) -> Self {
        Self::new(op, 1, UndoPayload::Ownership { target, old, new })
    }

    fn lock(&self) -> MutexGuard<'_, UndoPayload> {
        self.payload.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn op(&self) -> UndoOp {
        self.op
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn payload(&self) -> UndoPayload {
        self.lock().clone()
    }

    pub fn is_trash(&self) -> bool {
        self.op == UndoOp::MoveToTrash
    }

    /// Runs the operation backward (`undo`) or forward. Recording is
    /// suppressed for everything done on the way.
    pub async fn apply(
        &self,
        undo: bool,
        ops: &FileOperations,
        cancellable: Option<&Cancellable>,
    ) -> ApplyOutcome {
        let ops = ops.for_replay();
        let payload = self.payload();
        let result = if undo {
            self.run_backward(payload, &ops, cancellable).await
        } else {
            self.run_forward(payload, &ops, cancellable).await
        };

        match result {
            Ok(()) => ApplyOutcome {
                success: true,
                ..ApplyOutcome::default()
            },
            Err(e) if e.is_cancelled() => ApplyOutcome {
                user_cancel: true,
                error: Some(e),
                ..ApplyOutcome::default()
            },
            Err(e) => ApplyOutcome {
                error: Some(e),
                ..ApplyOutcome::default()
            },
        }
    }

    async fn run_backward(
        &self,
        payload: UndoPayload,
        ops: &FileOperations,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        match payload {
            UndoPayload::Ext { pairs, .. } => match self.op {
                UndoOp::Move => {
                    for (origin, target) in pairs.iter().rev() {
                        ops.move_exact(target, origin, cancellable).await?;
                    }
                    Ok(())
                }
                UndoOp::RestoreFromTrash => {
                    let targets: Vec<Location> = pairs.into_iter().map(|(_, t)| t).collect();
                    ops.trash(&targets, cancellable).await.map(|_| ())
                }
                _ => {
                    let targets: Vec<Location> = pairs.into_iter().rev().map(|(_, t)| t).collect();
                    ops.delete(&targets, cancellable).await
                }
            },
            UndoPayload::Create { target, .. } => ops.delete(&[target], cancellable).await,
            UndoPayload::Rename { old, new } => {
                let record = ops.cache().get(&new);
                record
                    .rename(&old.basename(), ops.scope(), cancellable)
                    .await
                    .map(|_| ())
            }
            UndoPayload::Trash { items } => {
                let entries = ops.trash_dir().entries().await?;
                let mut restore = Vec::with_capacity(items.len());
                for (original, time) in &items {
                    let path = original.to_path();
                    let entry = entries
                        .iter()
                        .find(|e| Some(&e.original) == path.as_ref() && e.deletion_time == *time)
                        .cloned()
                        .ok_or_else(|| {
                            FileError::new(
                                FileErrorKind::NotFound,
                                format!("{} is no longer in the trash", original),
                            )
                        })?;
                    restore.push(entry);
                }
                ops.restore_from_trash(&restore, cancellable).await.map(|_| ())
            }
            UndoPayload::RecPermissions { originals, .. } => {
                for (location, mode) in originals {
                    ops.set_mode(&location, mode, cancellable).await?;
                }
                Ok(())
            }
            UndoPayload::Permissions { target, old, .. } => {
                ops.cache()
                    .get(&target)
                    .set_permissions(old, ops.scope(), cancellable)
                    .await
            }
            UndoPayload::Ownership { target, old, .. } => self.set_ownership(ops, &target, &old, cancellable).await,
        }
    }

    async fn run_forward(
        &self,
        payload: UndoPayload,
        ops: &FileOperations,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        match payload {
            UndoPayload::Ext {
                source_dir,
                dest_dir,
                pairs,
            } => {
                let origins: Vec<Location> = pairs.iter().map(|(o, _)| o.clone()).collect();
                let targets = match self.op {
                    UndoOp::Copy => ops.copy(&origins, &dest_dir, cancellable).await?,
                    UndoOp::Duplicate => ops.duplicate(&origins, cancellable).await?,
                    UndoOp::CreateLink => ops.link(&origins, &dest_dir, cancellable).await?,
                    UndoOp::Move => {
                        for (origin, target) in &pairs {
                            ops.move_exact(origin, target, cancellable).await?;
                        }
                        pairs.iter().map(|(_, t)| t.clone()).collect()
                    }
                    UndoOp::RestoreFromTrash => {
                        let wanted: Vec<PathBuf> = pairs.iter().filter_map(|(_, t)| t.to_path()).collect();
                        let mut entries = ops.trash_dir().entries().await?;
                        entries.retain(|e| wanted.contains(&e.original));
                        // The latest trashing of each original wins.
                        entries.sort_by_key(|e| std::cmp::Reverse(e.deletion_time));
                        let mut chosen = Vec::new();
                        for path in &wanted {
                            if let Some(entry) = entries.iter().find(|e| &e.original == path) {
                                chosen.push(entry.clone());
                            }
                        }
                        ops.restore_from_trash(&chosen, cancellable).await?;
                        chosen.into_iter().map(|e| e.location).collect()
                    }
                    _ => return Err(FileError::new(FileErrorKind::NotSupported, "Cannot replay this operation")),
                };
                if targets.len() == origins.len() && self.op != UndoOp::RestoreFromTrash {
                    *self.lock() = UndoPayload::Ext {
                        source_dir,
                        dest_dir,
                        pairs: origins.into_iter().zip(targets).collect(),
                    };
                }
                Ok(())
            }
            UndoPayload::Create { target, template } => ops.create_at(&target, &template, cancellable).await,
            UndoPayload::Rename { old, new } => {
                let record = ops.cache().get(&old);
                record
                    .rename(&new.basename(), ops.scope(), cancellable)
                    .await
                    .map(|_| ())
            }
            UndoPayload::Trash { items } => {
                let originals: Vec<Location> = items.iter().map(|(l, _)| l.clone()).collect();
                let entries = ops.trash(&originals, cancellable).await?;
                *self.lock() = UndoPayload::Trash {
                    items: entries
                        .into_iter()
                        .map(|e| (Location::for_path(&e.original), e.deletion_time))
                        .collect(),
                };
                Ok(())
            }
            UndoPayload::RecPermissions {
                dest_dir,
                file_permissions,
                file_mask,
                dir_permissions,
                dir_mask,
                ..
            } => {
                ops.set_permissions_recursive(
                    &dest_dir,
                    file_permissions,
                    file_mask,
                    dir_permissions,
                    dir_mask,
                    cancellable,
                )
                .await
            }
            UndoPayload::Permissions { target, new, .. } => {
                ops.cache()
                    .get(&target)
                    .set_permissions(new, ops.scope(), cancellable)
                    .await
            }
            UndoPayload::Ownership { target, new, .. } => self.set_ownership(ops, &target, &new, cancellable).await,
        }
    }

    async fn set_ownership(
        &self,
        ops: &FileOperations,
        target: &Location,
        value: &str,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        let record = ops.cache().get(target);
        if self.op == UndoOp::ChangeOwner {
            record.set_owner(value, ops.scope(), cancellable).await
        } else {
            record.set_group(value, ops.scope(), cancellable).await
        }
    }

    /// Menu labels and descriptions for undoing and redoing this entry.
    pub fn strings(&self) -> UndoStrings {
        let payload = self.lock();
        let count = self.item_count;
        let (undo_label, redo_label, undo_description, redo_description) = match (&*payload, self.op) {
            (UndoPayload::Ext { dest_dir, pairs, source_dir }, op) => {
                let single = (count == 1).then(|| pairs.first()).flatten();
                let dest = quoted_path(dest_dir);
                match op {
                    UndoOp::Copy => (
                        "_Undo Copy",
                        "_Redo Copy",
                        match single {
                            Some((_, t)) => format!("Delete {}", quoted(t)),
                            None => format!("Delete {} copied items", count),
                        },
                        match single {
                            Some((o, _)) => format!("Copy {} to {}", quoted(o), dest),
                            None => format!("Copy {} items to {}", count, dest),
                        },
                    ),
                    UndoOp::Duplicate => (
                        "_Undo Duplicate",
                        "_Redo Duplicate",
                        match single {
                            Some((_, t)) => format!("Delete {}", quoted(t)),
                            None => format!("Delete {} duplicated items", count),
                        },
                        match single {
                            Some((o, _)) => format!("Duplicate {} in {}", quoted(o), dest),
                            None => format!("Duplicate {} items in {}", count, dest),
                        },
                    ),
                    UndoOp::Move => {
                        let source = source_dir.as_ref().map(quoted_path).unwrap_or_default();
                        (
                            "_Undo Move",
                            "_Redo Move",
                            match single {
                                Some((_, t)) => format!("Move {} back to {}", quoted(t), source),
                                None => format!("Move {} items back to {}", count, source),
                            },
                            match single {
                                Some((o, _)) => format!("Move {} to {}", quoted(o), dest),
                                None => format!("Move {} items to {}", count, dest),
                            },
                        )
                    }
                    UndoOp::RestoreFromTrash => (
                        "_Undo Restore from Trash",
                        "_Redo Restore from Trash",
                        match single {
                            Some((_, t)) => format!("Move {} back to trash", quoted(t)),
                            None => format!("Move {} items back to trash", count),
                        },
                        match single {
                            Some((_, t)) => format!("Restore {} from trash", quoted(t)),
                            None => format!("Restore {} items from trash", count),
                        },
                    ),
                    _ => (
                        "_Undo Create Link",
                        "_Redo Create Link",
                        match single {
                            Some((o, _)) => format!("Delete link to {}", quoted(o)),
                            None => format!("Delete links to {} items", count),
                        },
                        match single {
                            Some((o, _)) => format!("Create link to {}", quoted(o)),
                            None => format!("Create links to {} items", count),
                        },
                    ),
                }
            }
            (UndoPayload::Create { target, .. }, op) => {
                let name = quoted(target);
                let (undo_label, redo_label, redo) = match op {
                    UndoOp::CreateFolder => (
                        "_Undo Create Folder",
                        "_Redo Create Folder",
                        format!("Create a new folder {}", name),
                    ),
                    UndoOp::CreateFileFromTemplate => (
                        "_Undo Create from Template",
                        "_Redo Create from Template",
                        format!("Create new file {} from template", name),
                    ),
                    _ => (
                        "_Undo Create Empty File",
                        "_Redo Create Empty File",
                        format!("Create an empty file {}", name),
                    ),
                };
                (undo_label, redo_label, format!("Delete {}", name), redo)
            }
            (UndoPayload::Rename { old, new }, _) => (
                "_Undo Rename",
                "_Redo Rename",
                format!("Rename {} as {}", quoted(new), quoted(old)),
                format!("Rename {} as {}", quoted(old), quoted(new)),
            ),
            (UndoPayload::Trash { items }, _) => {
                let single = (count == 1).then(|| items.first()).flatten();
                (
                    "_Undo Trash",
                    "_Redo Trash",
                    match single {
                        Some((o, _)) => format!(
                            "Restore {} to {}",
                            quoted(o),
                            o.parent().as_ref().map(quoted_path).unwrap_or_default()
                        ),
                        None => format!("Restore {} items from trash", count),
                    },
                    match single {
                        Some((o, _)) => format!("Move {} to trash", quoted(o)),
                        None => format!("Move {} items to trash", count),
                    },
                )
            }
            (UndoPayload::RecPermissions { dest_dir, .. }, _) => (
                "_Undo Change Permissions",
                "_Redo Change Permissions",
                format!("Restore original permissions of items enclosed in {}", quoted(dest_dir)),
                format!("Set permissions of items enclosed in {}", quoted(dest_dir)),
            ),
            (UndoPayload::Permissions { target, .. }, _) => (
                "_Undo Change Permissions",
                "_Redo Change Permissions",
                format!("Restore original permissions of {}", quoted(target)),
                format!("Set permissions of {}", quoted(target)),
            ),
            (UndoPayload::Ownership { target, old, new }, op) => {
                let (undo_label, redo_label, what) = if op == UndoOp::ChangeOwner {
                    ("_Undo Change Owner", "_Redo Change Owner", "owner")
                } else {
                    ("_Undo Change Group", "_Redo Change Group", "group")
                };
                (
                    undo_label,
                    redo_label,
                    format!("Restore {} of {} to \u{201c}{}\u{201d}", what, quoted(target), old),
                    format!("Set {} of {} to \u{201c}{}\u{201d}", what, quoted(target), new),
                )
            }
        };

        UndoStrings {
            undo_label: undo_label.to_string(),
            undo_description,
            redo_label: redo_label.to_string(),
            redo_description,
        }
    }
}
