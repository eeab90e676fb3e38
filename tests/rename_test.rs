use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;

use npfm::{
    Attributes, CacheConfig, FileCache, FileErrorKind, FileOperations, Location, UndoManager, UndoScope,
    UndoState,
};
use tempfile::TempDir;

fn setup() -> (TempDir, FileCache) {
    let root = tempfile::tempdir().unwrap();
    let cache = FileCache::new(CacheConfig::with_root(root.path()).worker(false));
    (root, cache)
}

#[tokio::test]
async fn test_rename_rejects_slashes() {
    let (root, cache) = setup();
    std::fs::write(root.path().join("a"), b"").unwrap();
    let record = cache.get(&Location::for_path(root.path().join("a")));
    record.call_when_ready(Attributes::INFO).await;

    let err = record
        .rename("b/c", &UndoScope::Disabled, None)
        .await
        .err()
        .expect("slash is rejected");
    assert_eq!(err.kind(), FileErrorKind::InvalidArg);
    assert!(root.path().join("a").exists());
}

#[tokio::test]
async fn test_rename_of_gone_file_fails() {
    let (root, cache) = setup();
    let record = cache.get(&Location::for_path(root.path().join("never-existed")));
    record.call_when_ready(Attributes::INFO).await;
    assert!(record.is_gone());

    let err = record
        .rename("other", &UndoScope::Disabled, None)
        .await
        .err()
        .expect("gone file");
    assert_eq!(err.kind(), FileErrorKind::NotFound);
}

#[tokio::test]
async fn test_rename_to_same_name_is_a_no_op() {
    let (root, cache) = setup();
    std::fs::write(root.path().join("same"), b"").unwrap();
    let record = cache.get(&Location::for_path(root.path().join("same")));
    record.call_when_ready(Attributes::INFO).await;

    let manager = Arc::new(UndoManager::new());
    let mut events = record.subscribe();
    let location = record
        .rename("same", &UndoScope::Record(manager.clone()), None)
        .await
        .expect("no-op rename");

    assert_eq!(location, record.location());
    assert_eq!(manager.get_state(), UndoState::None);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_toplevel_files_cannot_be_renamed() {
    let (_root, cache) = setup();
    let record = cache.get(&Location::for_path("/"));
    assert!(record.is_self_owned());

    let err = record
        .rename("elsewhere", &UndoScope::Disabled, None)
        .await
        .err()
        .expect("toplevel rename");
    assert_eq!(err.kind(), FileErrorKind::NotSupported);
}

#[tokio::test]
async fn test_rename_moves_the_record_and_is_undoable() {
    let (root, cache) = setup();
    std::fs::write(root.path().join("before.txt"), b"x").unwrap();
    let record = cache.get(&Location::for_path(root.path().join("before.txt")));
    record.call_when_ready(Attributes::INFO).await;

    let manager = Arc::new(UndoManager::new());
    let scope = UndoScope::Record(manager.clone());
    let new_location = record.rename("after.txt", &scope, None).await.expect("rename");

    assert_eq!(new_location, Location::for_path(root.path().join("after.txt")));
    assert_eq!(record.location(), new_location);
    assert_eq!(record.name().as_ref(), "after.txt");
    assert!(Arc::ptr_eq(&record, &cache.get(&new_location)));
    assert!(root.path().join("after.txt").exists());
    assert!(!record.rename_in_progress());

    assert_eq!(manager.get_state(), UndoState::Undo);
    let strings = manager.strings().expect("strings");
    assert_eq!(strings.undo_label, "_Undo Rename");

    let ops = FileOperations::new(cache.clone(), scope);
    manager.undo(&ops, None).await;
    assert!(root.path().join("before.txt").exists());
    assert!(!root.path().join("after.txt").exists());
    assert_eq!(record.name().as_ref(), "before.txt");
    assert_eq!(manager.get_state(), UndoState::Redo);

    manager.redo(&ops, None).await;
    assert!(root.path().join("after.txt").exists());
    assert_eq!(manager.get_state(), UndoState::Undo);
}

#[tokio::test]
async fn test_rename_onto_existing_file_fails() {
    let (root, cache) = setup();
    std::fs::write(root.path().join("one"), b"").unwrap();
    std::fs::write(root.path().join("two"), b"").unwrap();
    let record = cache.get(&Location::for_path(root.path().join("one")));
    record.call_when_ready(Attributes::INFO).await;

    let err = record
        .rename("two", &UndoScope::Disabled, None)
        .await
        .err()
        .expect("target exists");
    assert_eq!(err.kind(), FileErrorKind::Exists);
    assert_eq!(record.name().as_ref(), "one");
}

#[tokio::test]
async fn test_desktop_file_rename_changes_name_and_file() {
    let (root, cache) = setup();
    let path = root.path().join("app.desktop");
    std::fs::write(&path, "[Desktop Entry]\nType=Application\nName=Old\nExec=true\n").unwrap();
    let record = cache.get(&Location::for_path(&path));
    record.call_when_ready(Attributes::INFO | Attributes::LINK_INFO).await;
    assert!(record.is_desktop_file());
    assert_eq!(record.display_name(), "Old");

    let location = record
        .rename("New Name", &UndoScope::Disabled, None)
        .await
        .expect("rename desktop file");

    let renamed = root.path().join("New Name.desktop");
    assert_eq!(location, Location::for_path(&renamed));
    let content = std::fs::read_to_string(&renamed).unwrap();
    assert!(content.contains("Name=New Name\n"));
}
