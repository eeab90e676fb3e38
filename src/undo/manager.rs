use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use once_cell::sync::Lazy;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cancellable::Cancellable;
use crate::job::FileOperations;
use crate::service::trash::{TrashEvent, TrashMonitor};
use crate::undo::info::{ApplyOutcome, UndoInfo, UndoStrings};
use crate::undo::UndoScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UndoState {
    #[default]
    None,
    Undo,
    Redo,
}

#[derive(Default)]
struct Slot {
    info: Option<Arc<UndoInfo>>,
    state: UndoState,
    last_state: UndoState,
}

impl Slot {
    fn clear(&mut self) {
        self.info = None;
        self.state = UndoState::None;
    }
}

static INSTANCE: Lazy<Mutex<Weak<UndoManager>>> = Lazy::new(|| Mutex::new(Weak::new()));

/// Holds the most recent undoable operation.
pub struct UndoManager {
    slot: Mutex<Slot>,
    replay_flag: AtomicBool,
    events: broadcast::Sender<UndoState>,
}

impl std::fmt::Debug for UndoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoManager")
            .field("state", &self.get_state())
            .finish()
    }
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoManager {
    /// An isolated manager.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            slot: Mutex::new(Slot::default()),
            replay_flag: AtomicBool::new(false),
            events,
        }
    }

    /// The process-wide manager. It lives as long as someone holds it and
    /// is rebuilt on the next call after that.
    pub fn get() -> Arc<Self> {
        let mut instance = INSTANCE.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(manager) = instance.upgrade() {
            return manager;
        }
        let manager = Arc::new(Self::new());
        *instance = Arc::downgrade(&manager);
        manager
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, state: UndoState) {
        let _ = self.events.send(state);
    }

    /// Fires with the new state whenever the undoable operation or the
    /// state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<UndoState> {
        self.events.subscribe()
    }

    /// Replaces the live entry. `None` only clears.
    pub fn set_action(&self, info: Option<Arc<UndoInfo>>) {
        let state = {
            let mut slot = self.lock();
            slot.clear();
            if let Some(info) = info {
                log::debug!("setting undo information for {:?}", info.op());
                slot.info = Some(info);
                slot.state = UndoState::Undo;
                slot.last_state = UndoState::None;
            }
            slot.state
        };
        self.emit(state);
    }

    pub fn get_action(&self) -> Option<Arc<UndoInfo>> {
        self.lock().info.clone()
    }

    pub fn get_state(&self) -> UndoState {
        self.lock().state
    }

    /// Labels of the live entry, if any.
    pub fn strings(&self) -> Option<UndoStrings> {
        self.lock().info.as_ref().map(|info| info.strings())
    }

    pub fn push_flag(&self) {
        self.replay_flag.store(true, Ordering::SeqCst);
    }

    /// Clears the replay flag and returns whether it was set.
    pub fn pop_flag(&self) -> bool {
        self.replay_flag.swap(false, Ordering::SeqCst)
    }

    /// Runs the live entry backward. Does nothing unless the state is
    /// `Undo`.
    pub async fn undo(self: &Arc<Self>, ops: &FileOperations, cancellable: Option<&Cancellable>) {
        self.replay(UndoState::Undo, ops, cancellable).await;
    }

    pub async fn redo(self: &Arc<Self>, ops: &FileOperations, cancellable: Option<&Cancellable>) {
        self.replay(UndoState::Redo, ops, cancellable).await;
    }

    async fn replay(
        self: &Arc<Self>,
        expected: UndoState,
        ops: &FileOperations,
        cancellable: Option<&Cancellable>,
    ) {
        let info = {
            let mut slot = self.lock();
            if slot.state != expected {
                log::warn!("called {:?}, but state is {:?}", expected, slot.state);
                return;
            }
            let Some(info) = slot.info.clone() else {
                return;
            };
            slot.last_state = slot.state;
            self.push_flag();
            slot.clear();
            info
        };
        self.emit(UndoState::None);

        let ops = ops.with_scope(UndoScope::Record(self.clone()));
        let outcome = info.apply(expected == UndoState::Undo, &ops, cancellable).await;
        self.complete(&info, &outcome);
    }

    fn complete(&self, info: &Arc<UndoInfo>, outcome: &ApplyOutcome) {
        let state = {
            let mut slot = self.lock();
            if let Some(current) = &slot.info {
                if !Arc::ptr_eq(current, info) {
                    log::debug!("ignoring completion of a superseded undo entry");
                    return;
                }
            }

            if outcome.success {
                slot.state = match slot.last_state {
                    UndoState::Undo => UndoState::Redo,
                    UndoState::Redo => UndoState::Undo,
                    UndoState::None => slot.state,
                };
                slot.info = Some(info.clone());
            } else if outcome.user_cancel {
                slot.state = slot.last_state;
                slot.info = Some(info.clone());
            } else {
                if let Some(e) = &outcome.error {
                    log::warn!("undo of {:?} failed: {}", info.op(), e);
                }
                slot.clear();
            }
            slot.state
        };
        self.emit(state);
    }

    /// Drops a trash entry once the trash is emptied: the files it would
    /// restore no longer exist.
    pub fn on_trash_state_changed(&self, is_empty: bool) {
        if !is_empty {
            return;
        }
        {
            let mut slot = self.lock();
            if slot.state == UndoState::None {
                return;
            }
            if !slot.info.as_ref().map_or(false, |info| info.is_trash()) {
                return;
            }
            slot.clear();
        }
        self.emit(UndoState::None);
    }

    /// Follows `monitor` until either side goes away.
    pub fn watch_trash(self: &Arc<Self>, monitor: &TrashMonitor) -> JoinHandle<()> {
        let mut events = monitor.subscribe();
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(TrashEvent::StateChanged { is_empty }) => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        manager.on_trash_state_changed(is_empty);
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FileError;
    use crate::location::Location;

    fn entry(name: &str) -> Arc<UndoInfo> {
        Arc::new(UndoInfo::rename(
            Location::for_path(format!("/tmp/{}", name)),
            Location::for_path(format!("/tmp/{}.new", name)),
        ))
    }

    /// Puts `manager` in the middle of a replay of its live entry.
    fn begin(manager: &UndoManager) -> Arc<UndoInfo> {
        let mut slot = manager.lock();
        let info = slot.info.clone().expect("live entry");
        slot.last_state = slot.state;
        slot.clear();
        info
    }

    fn success() -> ApplyOutcome {
        ApplyOutcome {
            success: true,
            ..ApplyOutcome::default()
        }
    }

    #[test]
    fn success_toggles_between_undo_and_redo() {
        let manager = UndoManager::new();
        manager.set_action(Some(entry("a")));
        assert_eq!(manager.get_state(), UndoState::Undo);

        let info = begin(&manager);
        manager.complete(&info, &success());
        assert_eq!(manager.get_state(), UndoState::Redo);

        let info = begin(&manager);
        manager.complete(&info, &success());
        assert_eq!(manager.get_state(), UndoState::Undo);
    }

    #[test]
    fn stale_completion_is_ignored() {
        let manager = UndoManager::new();
        manager.set_action(Some(entry("old")));
        let old = begin(&manager);

        let newer = entry("new");
        manager.set_action(Some(newer.clone()));
        manager.complete(&old, &success());

        assert_eq!(manager.get_state(), UndoState::Undo);
        assert!(Arc::ptr_eq(&manager.get_action().expect("action"), &newer));
    }

    #[test]
    fn user_cancel_restores_previous_state() {
        let manager = UndoManager::new();
        manager.set_action(Some(entry("a")));
        let info = begin(&manager);
        manager.complete(
            &info,
            &ApplyOutcome {
                user_cancel: true,
                error: Some(FileError::cancelled()),
                ..ApplyOutcome::default()
            },
        );
        assert_eq!(manager.get_state(), UndoState::Undo);
        assert!(manager.get_action().is_some());
    }

    #[test]
    fn failure_clears() {
        let manager = UndoManager::new();
        manager.set_action(Some(entry("a")));
        let info = begin(&manager);
        manager.complete(&info, &ApplyOutcome::default());
        assert_eq!(manager.get_state(), UndoState::None);
        assert!(manager.get_action().is_none());
    }

    #[test]
    fn trash_emptied_only_drops_trash_entries() {
        let manager = UndoManager::new();
        manager.set_action(Some(entry("a")));
        manager.on_trash_state_changed(true);
        assert_eq!(manager.get_state(), UndoState::Undo);

        manager.set_action(Some(Arc::new(UndoInfo::trash(vec![(
            Location::for_path("/tmp/t"),
            0,
        )]))));
        manager.on_trash_state_changed(false);
        assert_eq!(manager.get_state(), UndoState::Undo);
        manager.on_trash_state_changed(true);
        assert_eq!(manager.get_state(), UndoState::None);
    }

    #[test]
    fn replay_flag_suppresses_one_recording() {
        let manager = Arc::new(UndoManager::new());
        let scope = UndoScope::Record(manager.clone());
        manager.push_flag();
        assert!(scope.recorder().is_none());
        assert!(scope.recorder().is_some());
        assert!(UndoScope::Replay.recorder().is_none());
    }

    #[test]
    fn shared_instance_lives_while_held() {
        let first = UndoManager::get();
        let second = UndoManager::get();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
