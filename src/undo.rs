//! Undo and redo of file operations
//!
//! Completed operations describe themselves as an [`UndoInfo`]; the
//! [`UndoManager`] holds the single live one and replays it backward or
//! forward on request.
//!
//! Operations run during a replay must not record a new entry. Callers pass
//! an [`UndoScope`] down into every mutation to say whether it records.

pub mod info;
pub mod manager;

use std::sync::Arc;

pub use info::{ApplyOutcome, CreateTemplate, UndoInfo, UndoOp, UndoPayload, UndoStrings};
pub use manager::{UndoManager, UndoState};

#[derive(Debug, Clone)]
pub enum UndoScope {
    /// Record completed operations into this manager.
    Record(Arc<UndoManager>),
    /// Running on behalf of an undo or redo.
    Replay,
    /// Never record.
    Disabled,
}

impl UndoScope {
    /// The manager a completed operation should be recorded into.
    ///
    /// Consumes the manager's replay flag: a pending flag means the caller
    /// is part of a replay, and nothing is recorded.
    pub fn recorder(&self) -> Option<Arc<UndoManager>> {
        match self {
            UndoScope::Record(manager) if !manager.pop_flag() => Some(manager.clone()),
            _ => None,
        }
    }

    pub fn manager(&self) -> Option<&Arc<UndoManager>> {
        match self {
            UndoScope::Record(manager) => Some(manager),
            _ => None,
        }
    }
}
