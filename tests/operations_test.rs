use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use npfm::{
    Attributes, CacheConfig, FileCache, FileErrorKind, FileOperations, Location, UndoManager, UndoOp, UndoScope, UndoState,
};
use tempfile::TempDir;

fn setup() -> (TempDir, FileOperations, Arc<UndoManager>) {
    let root = tempfile::tempdir().unwrap();
    let cache = FileCache::new(CacheConfig::with_root(root.path()).worker(false));
    let manager = Arc::new(UndoManager::new());
    let ops = FileOperations::new(cache, UndoScope::Record(manager.clone()));
    (root, ops, manager)
}

fn loc(path: impl AsRef<Path>) -> Location {
    Location::for_path(path)
}

fn mode(path: impl AsRef<Path>) -> u32 {
    std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

#[tokio::test]
async fn test_duplicate_names() {
    let (root, ops, manager) = setup();
    let original = root.path().join("foo.txt");
    std::fs::write(&original, b"x").unwrap();

    let mut names = Vec::new();
    for _ in 0..3 {
        let copies = ops.duplicate(&[loc(&original)], None).await.expect("duplicate");
        names.push(copies[0].basename());
    }
    assert_eq!(names, vec!["foo (copy).txt", "foo (another copy).txt", "foo (3rd copy).txt"]);

    let copy_of_copy = ops
        .duplicate(&[loc(root.path().join("foo (copy).txt"))], None)
        .await
        .expect("duplicate");
    assert_eq!(copy_of_copy[0].basename(), "foo (4th copy).txt");
    assert_eq!(manager.get_action().expect("action").op(), UndoOp::Duplicate);
}

#[tokio::test]
async fn test_copy_conflicts_are_uniquified() {
    let (root, ops, _manager) = setup();
    let dest = root.path().join("dest");
    std::fs::create_dir(&dest).unwrap();
    std::fs::write(root.path().join("same"), b"new").unwrap();
    std::fs::write(dest.join("same"), b"old").unwrap();

    let copied = ops.copy(&[loc(root.path().join("same"))], &loc(&dest), None).await.expect("copy");
    assert_eq!(copied[0].basename(), "same (copy)");
    assert_eq!(std::fs::read(dest.join("same")).unwrap(), b"old");
    assert_eq!(std::fs::read(dest.join("same (copy)")).unwrap(), b"new");
}

#[tokio::test]
async fn test_copy_into_itself_fails() {
    let (root, ops, manager) = setup();
    let dir = root.path().join("dir");
    std::fs::create_dir_all(dir.join("child")).unwrap();

    let err = ops
        .copy(&[loc(&dir)], &loc(dir.join("child")), None)
        .await
        .err()
        .expect("copy into itself");
    assert_eq!(err.kind(), FileErrorKind::InvalidArg);
    assert_eq!(manager.get_state(), UndoState::None);
}

#[tokio::test]
async fn test_copy_file_picks_target_name() {
    let (root, ops, _manager) = setup();
    let source = root.path().join("source.bin");
    let dest = root.path().join("dest");
    std::fs::write(&source, b"data").unwrap();
    std::fs::create_dir(&dest).unwrap();

    let named = ops
        .copy_file(&loc(&source), Some("Shown"), &loc(&dest), Some("chosen"), None)
        .await
        .expect("copy");
    assert_eq!(named.basename(), "chosen");

    let displayed = ops
        .copy_file(&loc(&source), Some("Shown"), &loc(&dest), None, None)
        .await
        .expect("copy");
    assert_eq!(displayed.basename(), "Shown");

    let plain = ops.copy_file(&loc(&source), None, &loc(&dest), None, None).await.expect("copy");
    assert_eq!(plain.basename(), "source.bin");
}

#[tokio::test]
async fn test_links_are_named_after_their_target() {
    let (root, ops, manager) = setup();
    let target = root.path().join("foo");
    std::fs::write(&target, b"").unwrap();

    let first = ops.link(&[loc(&target)], &loc(root.path()), None).await.expect("link");
    let second = ops.link(&[loc(&target)], &loc(root.path()), None).await.expect("link");
    assert_eq!(first[0].basename(), "Link to foo");
    assert_eq!(second[0].basename(), "Another link to foo");
    assert_eq!(std::fs::read_link(root.path().join("Link to foo")).unwrap(), target);

    manager.undo(&ops, None).await;
    assert!(std::fs::symlink_metadata(root.path().join("Another link to foo")).is_err());
    assert!(target.exists());
}

#[tokio::test]
async fn test_new_file_and_template() {
    let (root, ops, manager) = setup();
    let parent = loc(root.path());

    let file = ops.new_file(&parent, Some("notes.txt"), b"hello", None).await.expect("new file");
    assert_eq!(std::fs::read(file.to_path().unwrap()).unwrap(), b"hello");
    let again = ops.new_file(&parent, Some("notes.txt"), b"", None).await.expect("new file");
    assert_eq!(again.basename(), "notes 2.txt");

    let template = root.path().join("Letter.odt");
    std::fs::write(&template, b"template").unwrap();
    let from_template = ops
        .new_file_from_template(&parent, Some("Mine.odt"), &loc(&template), None)
        .await
        .expect("from template");
    assert_eq!(std::fs::read(from_template.to_path().unwrap()).unwrap(), b"template");
    assert_eq!(
        manager.strings().expect("strings").undo_label,
        "_Undo Create from Template"
    );

    manager.undo(&ops, None).await;
    assert!(!root.path().join("Mine.odt").exists());
    manager.redo(&ops, None).await;
    assert_eq!(std::fs::read(root.path().join("Mine.odt")).unwrap(), b"template");
}

#[tokio::test]
async fn test_delete_removes_trees() {
    let (root, ops, manager) = setup();
    let tree = root.path().join("tree");
    std::fs::create_dir_all(tree.join("a/b")).unwrap();
    std::fs::write(tree.join("a/b/leaf"), b"").unwrap();
    std::os::unix::fs::symlink("/nonexistent", tree.join("dangling")).unwrap();

    ops.delete(&[loc(&tree)], None).await.expect("delete");
    assert!(!tree.exists());
    assert_eq!(manager.get_state(), UndoState::None);
}

#[tokio::test]
async fn test_recursive_permissions_undo() {
    let (root, ops, manager) = setup();
    let dir = root.path().join("shared");
    std::fs::create_dir_all(dir.join("sub")).unwrap();
    std::fs::write(dir.join("file"), b"").unwrap();
    std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();
    std::fs::set_permissions(dir.join("sub"), std::fs::Permissions::from_mode(0o755)).unwrap();
    std::fs::set_permissions(dir.join("file"), std::fs::Permissions::from_mode(0o644)).unwrap();

    ops.set_permissions_recursive(&loc(&dir), 0o000, 0o077, 0o000, 0o077, None)
        .await
        .expect("chmod -R");
    assert_eq!(mode(&dir), 0o700);
    assert_eq!(mode(dir.join("sub")), 0o700);
    assert_eq!(mode(dir.join("file")), 0o600);
    assert_eq!(
        manager.strings().expect("strings").redo_description,
        "Set permissions of items enclosed in \u{201c}shared\u{201d}"
    );

    manager.undo(&ops, None).await;
    assert_eq!(mode(&dir), 0o755);
    assert_eq!(mode(dir.join("sub")), 0o755);
    assert_eq!(mode(dir.join("file")), 0o644);
}

#[tokio::test]
async fn test_restore_from_trash_is_undoable() {
    let (root, ops, manager) = setup();
    let path = root.path().join("back.txt");
    std::fs::write(&path, b"").unwrap();

    let entries = ops.trash(&[loc(&path)], None).await.expect("trash");
    assert_eq!(manager.get_state(), UndoState::None);

    let restored = ops.restore_from_trash(&entries, None).await.expect("restore");
    assert_eq!(restored, vec![loc(&path)]);
    assert!(path.exists());
    assert_eq!(manager.get_action().expect("action").op(), UndoOp::RestoreFromTrash);

    manager.undo(&ops, None).await;
    assert!(!path.exists());
    assert_eq!(ops.trash_dir().entries().await.unwrap().len(), 1);

    manager.redo(&ops, None).await;
    assert!(path.exists());
}

#[tokio::test]
async fn test_recursive_permissions_undo_with_loaded_records() {
    let (root, ops, manager) = setup();
    let dir = root.path().join("shared");
    std::fs::create_dir(&dir).unwrap();
    std::fs::write(dir.join("file"), b"").unwrap();
    std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();
    std::fs::set_permissions(dir.join("file"), std::fs::Permissions::from_mode(0o644)).unwrap();

    // Cached modes must not hide the restore
    let dir_record = ops.cache().get(&loc(&dir));
    let file_record = ops.cache().get(&loc(dir.join("file")));
    dir_record.call_when_ready(Attributes::INFO).await;
    file_record.call_when_ready(Attributes::INFO).await;
    assert_eq!(file_record.permissions(), Some(0o644));

    ops.set_permissions_recursive(&loc(&dir), 0o000, 0o077, 0o000, 0o077, None)
        .await
        .expect("chmod -R");
    assert_eq!(mode(dir.join("file")), 0o600);

    manager.undo(&ops, None).await;
    assert_eq!(manager.get_state(), UndoState::Redo);
    assert_eq!(mode(&dir), 0o755);
    assert_eq!(mode(dir.join("file")), 0o644);

    file_record.call_when_ready(Attributes::INFO).await;
    assert_eq!(file_record.permissions(), Some(0o644));

    manager.redo(&ops, None).await;
    assert_eq!(mode(dir.join("file")), 0o600);
}
