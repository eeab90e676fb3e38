use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;

use npfm::{
    Attributes, Cancellable, CacheConfig, FileCache, FileOperations, Location, UndoManager, UndoOp,
    UndoScope, UndoState,
};
use tempfile::TempDir;

struct Fixture {
    root: TempDir,
    cache: FileCache,
    manager: Arc<UndoManager>,
    ops: FileOperations,
}

fn setup() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let cache = FileCache::new(CacheConfig::with_root(root.path()).worker(false));
    let manager = Arc::new(UndoManager::new());
    let ops = FileOperations::new(cache.clone(), UndoScope::Record(manager.clone()));
    Fixture {
        root,
        cache,
        manager,
        ops,
    }
}

fn loc(path: impl AsRef<Path>) -> Location {
    Location::for_path(path)
}

fn mode(path: impl AsRef<Path>) -> u32 {
    std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

#[tokio::test]
async fn test_copy_undo_redo() {
    let f = setup();
    let src = f.root.path().join("src");
    let dest = f.root.path().join("dest");
    std::fs::create_dir_all(src.join("folder")).unwrap();
    std::fs::create_dir(&dest).unwrap();
    std::fs::write(src.join("a.txt"), b"a").unwrap();
    std::fs::write(src.join("folder/inner"), b"inner").unwrap();

    let copied = f
        .ops
        .copy(&[loc(src.join("a.txt")), loc(src.join("folder"))], &loc(&dest), None)
        .await
        .expect("copy");
    assert_eq!(copied, vec![loc(dest.join("a.txt")), loc(dest.join("folder"))]);
    assert_eq!(std::fs::read(dest.join("folder/inner")).unwrap(), b"inner");

    assert_eq!(f.manager.get_state(), UndoState::Undo);
    let action = f.manager.get_action().expect("action");
    assert_eq!(action.op(), UndoOp::Copy);
    assert_eq!(action.item_count(), 2);

    // 1. Undo deletes the copies
    f.manager.undo(&f.ops, None).await;
    assert!(!dest.join("a.txt").exists());
    assert!(!dest.join("folder").exists());
    assert!(src.join("a.txt").exists());
    assert_eq!(f.manager.get_state(), UndoState::Redo);

    // 2. Redo copies again
    f.manager.redo(&f.ops, None).await;
    assert!(dest.join("a.txt").exists());
    assert!(dest.join("folder/inner").exists());
    assert_eq!(f.manager.get_state(), UndoState::Undo);

    // 3. Undo works on the fresh copies
    f.manager.undo(&f.ops, None).await;
    assert!(!dest.join("a.txt").exists());
    assert_eq!(f.manager.get_state(), UndoState::Redo);

    // Replays never record a new entry.
    assert!(Arc::ptr_eq(&action, &f.manager.get_action().expect("action")));
    assert!(!f.manager.pop_flag());
}

#[tokio::test]
async fn test_move_undo_redo() {
    let f = setup();
    let src = f.root.path().join("src");
    let dest = f.root.path().join("dest");
    std::fs::create_dir(&src).unwrap();
    std::fs::create_dir(&dest).unwrap();
    std::fs::write(src.join("m"), b"m").unwrap();

    let record = f.cache.get(&loc(src.join("m")));
    f.ops.move_(&[loc(src.join("m"))], &loc(&dest), None).await.expect("move");
    assert!(dest.join("m").exists());
    assert_eq!(record.location(), loc(dest.join("m")));

    let strings = f.manager.strings().expect("strings");
    assert_eq!(strings.undo_label, "_Undo Move");

    f.manager.undo(&f.ops, None).await;
    assert!(src.join("m").exists());
    assert!(!dest.join("m").exists());
    assert_eq!(record.location(), loc(src.join("m")));

    f.manager.redo(&f.ops, None).await;
    assert!(dest.join("m").exists());
    assert_eq!(f.manager.get_state(), UndoState::Undo);
}

#[tokio::test]
async fn test_new_folder_undo_redo() {
    let f = setup();
    let parent = loc(f.root.path());

    let first = f.ops.new_folder(&parent, None, None).await.expect("folder");
    let second = f.ops.new_folder(&parent, None, None).await.expect("folder");
    assert_eq!(first.basename(), "Untitled Folder");
    assert_eq!(second.basename(), "Untitled Folder 2");

    // Only the last operation is undoable.
    let strings = f.manager.strings().expect("strings");
    assert_eq!(strings.redo_description, "Create a new folder \u{201c}Untitled Folder 2\u{201d}");

    f.manager.undo(&f.ops, None).await;
    assert!(!f.root.path().join("Untitled Folder 2").exists());
    assert!(f.root.path().join("Untitled Folder").exists());

    f.manager.redo(&f.ops, None).await;
    assert!(f.root.path().join("Untitled Folder 2").is_dir());
}

#[tokio::test]
async fn test_permissions_undo_redo() {
    let f = setup();
    let path = f.root.path().join("secret");
    std::fs::write(&path, b"").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

    let record = f.cache.get(&loc(&path));
    record.call_when_ready(Attributes::INFO).await;
    record
        .set_permissions(0o600, f.ops.scope(), None)
        .await
        .expect("chmod");
    assert_eq!(mode(&path), 0o600);
    assert_eq!(record.permissions(), Some(0o600));

    f.manager.undo(&f.ops, None).await;
    assert_eq!(mode(&path), 0o644);
    assert_eq!(f.manager.get_state(), UndoState::Redo);

    f.manager.redo(&f.ops, None).await;
    assert_eq!(mode(&path), 0o600);
}

#[tokio::test]
async fn test_unchanged_permissions_record_nothing() {
    let f = setup();
    let path = f.root.path().join("plain");
    std::fs::write(&path, b"").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

    let record = f.cache.get(&loc(&path));
    record.call_when_ready(Attributes::INFO).await;
    let mut events = record.subscribe();
    record
        .set_permissions(0o640, f.ops.scope(), None)
        .await
        .expect("no-op chmod");
    assert_eq!(f.manager.get_state(), UndoState::None);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_trash_undo_and_empty_trash() {
    let f = setup();
    let path = f.root.path().join("doomed.txt");
    std::fs::write(&path, b"bye").unwrap();

    f.ops.trash_or_delete(&[loc(&path)], None).await.expect("trash");
    assert!(!path.exists());
    assert_eq!(f.ops.trash_dir().entries().await.unwrap().len(), 1);
    assert!(f.manager.get_action().expect("action").is_trash());

    // 1. Undo restores the file
    f.manager.undo(&f.ops, None).await;
    assert_eq!(std::fs::read(&path).unwrap(), b"bye");
    assert!(f.ops.trash_dir().is_empty().await);

    // 2. Redo trashes it again
    f.manager.redo(&f.ops, None).await;
    assert!(!path.exists());
    assert_eq!(f.manager.get_state(), UndoState::Undo);

    // 3. Emptying the trash drops the entry
    f.ops.empty_trash(None).await.expect("empty trash");
    assert!(f.ops.trash_dir().is_empty().await);
    assert_eq!(f.manager.get_state(), UndoState::None);
    assert!(f.manager.get_action().is_none());
}

#[tokio::test]
async fn test_empty_trash_keeps_other_entries() {
    let f = setup();
    let parent = loc(f.root.path());
    f.ops.new_folder(&parent, Some("kept"), None).await.expect("folder");

    f.ops.empty_trash(None).await.expect("empty trash");
    assert_eq!(f.manager.get_state(), UndoState::Undo);
}

#[tokio::test]
async fn test_cancelled_undo_keeps_the_entry() {
    let f = setup();
    let folder = f.ops.new_folder(&loc(f.root.path()), Some("stay"), None).await.expect("folder");

    let cancellable = Cancellable::new();
    cancellable.cancel();
    f.manager.undo(&f.ops, Some(&cancellable)).await;

    assert!(folder.to_path().unwrap().exists());
    assert_eq!(f.manager.get_state(), UndoState::Undo);
    assert!(f.manager.get_action().is_some());
}

#[tokio::test]
async fn test_failed_undo_clears_the_entry() {
    let f = setup();
    let folder = f.ops.new_folder(&loc(f.root.path()), Some("vanishing"), None).await.expect("folder");
    std::fs::remove_dir(folder.to_path().unwrap()).unwrap();

    f.manager.undo(&f.ops, None).await;

    assert_eq!(f.manager.get_state(), UndoState::None);
    assert!(f.manager.get_action().is_none());
}

#[tokio::test]
async fn test_replay_in_wrong_state_does_nothing() {
    let f = setup();
    f.ops.new_folder(&loc(f.root.path()), Some("here"), None).await.expect("folder");
    let mut events = f.manager.subscribe();

    f.manager.redo(&f.ops, None).await;

    assert!(f.root.path().join("here").exists());
    assert_eq!(f.manager.get_state(), UndoState::Undo);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_disabled_scope_records_nothing() {
    let f = setup();
    let ops = f.ops.with_scope(UndoScope::Disabled);
    ops.new_folder(&loc(f.root.path()), None, None).await.expect("folder");
    assert_eq!(f.manager.get_state(), UndoState::None);
}

#[tokio::test]
async fn test_undo_emits_state_changes() {
    let f = setup();
    let mut events = f.manager.subscribe();
    f.ops.new_folder(&loc(f.root.path()), None, None).await.expect("folder");
    assert_eq!(events.recv().await.unwrap(), UndoState::Undo);

    f.manager.undo(&f.ops, None).await;
    assert_eq!(events.recv().await.unwrap(), UndoState::None);
    assert_eq!(events.recv().await.unwrap(), UndoState::Redo);
}
