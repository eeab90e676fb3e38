use std::sync::Arc;
use std::time::Duration;

use npfm::{FileErrorKind, Location, TrashDir, TrashEvent, TrashMonitor, UndoInfo, UndoManager, UndoState};

#[tokio::test]
async fn test_trash_and_restore() {
    let root = tempfile::tempdir().unwrap();
    let trash = TrashDir::new(root.path().join("Trash"));
    let path = root.path().join("test_file.txt");
    tokio::fs::write(&path, b"test content").await.unwrap();

    // 1. Trash the file
    let entry = trash.trash(&path, None).await.expect("Failed to trash file");
    assert!(!path.exists());
    assert_eq!(entry.original, path);
    assert!(trash.contains(&entry.location.to_path().unwrap()));

    let info = tokio::fs::read_to_string(&entry.info_path).await.unwrap();
    assert!(info.starts_with("[Trash Info]\n"));
    assert!(info.contains("DeletionDate="));

    // 2. The entry is listed
    let entries = trash.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].original, path);
    assert_eq!(entries[0].deletion_time, entry.deletion_time);

    // 3. Restore it
    let restored = trash.restore(&entry, None, None).await.expect("restore");
    assert_eq!(restored, path);
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"test content");
    assert!(trash.is_empty().await);
    assert!(!entry.info_path.exists());
}

#[tokio::test]
async fn test_same_name_gets_numbered() {
    let root = tempfile::tempdir().unwrap();
    let trash = TrashDir::new(root.path().join("Trash"));
    let path = root.path().join("notes.txt");

    tokio::fs::write(&path, b"first").await.unwrap();
    let first = trash.trash(&path, None).await.unwrap();
    tokio::fs::write(&path, b"second").await.unwrap();
    let second = trash.trash(&path, None).await.unwrap();

    assert_eq!(first.location.basename(), "notes.txt");
    assert_eq!(second.location.basename(), "notes.2.txt");
    assert_eq!(trash.entries().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_restore_onto_existing_file_fails() {
    let root = tempfile::tempdir().unwrap();
    let trash = TrashDir::new(root.path().join("Trash"));
    let path = root.path().join("taken");
    tokio::fs::write(&path, b"old").await.unwrap();
    let entry = trash.trash(&path, None).await.unwrap();
    tokio::fs::write(&path, b"new").await.unwrap();

    let err = trash.restore(&entry, None, None).await.err().expect("target exists");
    assert_eq!(err.kind(), FileErrorKind::Exists);
    assert_eq!(trash.entries().await.unwrap().len(), 1);

    let elsewhere = root.path().join("restored/taken");
    let restored = trash.restore(&entry, Some(&elsewhere), None).await.expect("restore elsewhere");
    assert_eq!(tokio::fs::read(&restored).await.unwrap(), b"old");
}

#[tokio::test]
async fn test_items_in_trash_cannot_be_trashed_again() {
    let root = tempfile::tempdir().unwrap();
    let trash = TrashDir::new(root.path().join("Trash"));
    let path = root.path().join("once");
    tokio::fs::write(&path, b"").await.unwrap();
    let entry = trash.trash(&path, None).await.unwrap();

    let err = trash
        .trash(&entry.location.to_path().unwrap(), None)
        .await
        .err()
        .expect("already trashed");
    assert_eq!(err.kind(), FileErrorKind::NotSupported);
}

#[tokio::test]
async fn test_empty_removes_everything() {
    let root = tempfile::tempdir().unwrap();
    let trash = TrashDir::new(root.path().join("Trash"));
    let dir = root.path().join("dir");
    tokio::fs::create_dir_all(dir.join("nested")).await.unwrap();
    tokio::fs::write(dir.join("nested/file"), b"").await.unwrap();
    tokio::fs::write(root.path().join("loose"), b"").await.unwrap();

    trash.trash(&dir, None).await.unwrap();
    trash.trash(&root.path().join("loose"), None).await.unwrap();
    assert!(!trash.is_empty().await);

    trash.empty(None).await.expect("empty");
    assert!(trash.is_empty().await);
    assert!(trash.entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_monitor_reports_transitions() {
    let root = tempfile::tempdir().unwrap();
    let trash = TrashDir::new(root.path().join("Trash"));
    let path = root.path().join("watched");
    tokio::fs::write(&path, b"").await.unwrap();

    let monitor = TrashMonitor::new(&trash).await.expect("monitor");
    assert!(monitor.is_empty());
    let mut events = monitor.subscribe();

    trash.trash(&path, None).await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(event, TrashEvent::StateChanged { is_empty: false });

    trash.empty(None).await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(event, TrashEvent::StateChanged { is_empty: true });
}

#[tokio::test]
async fn test_emptied_trash_clears_trash_undo_entry() {
    let root = tempfile::tempdir().unwrap();
    let trash = TrashDir::new(root.path().join("Trash"));
    let path = root.path().join("gone-soon");
    tokio::fs::write(&path, b"").await.unwrap();

    let monitor = TrashMonitor::new(&trash).await.expect("monitor");
    let mut trash_events = monitor.subscribe();
    let manager = Arc::new(UndoManager::new());
    let _watch = manager.watch_trash(&monitor);

    let entry = trash.trash(&path, None).await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), trash_events.recv())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(event, TrashEvent::StateChanged { is_empty: false });
    manager.set_action(Some(Arc::new(UndoInfo::trash(vec![(
        Location::for_path(&path),
        entry.deletion_time,
    )]))));
    let mut states = manager.subscribe();

    trash.empty(None).await.unwrap();
    let state = tokio::time::timeout(Duration::from_secs(5), states.recv())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(state, UndoState::None);
    assert!(manager.get_action().is_none());
}
