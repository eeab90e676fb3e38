use std::sync::Arc;

use npfm::model::sort::{compare_for_sort, sort_records};
use npfm::{
    Attributes, CacheConfig, DeepCountStatus, DirectoryEvent, FileCache, FileErrorKind, Knowledge, Location,
    SortKey,
};
use tempfile::TempDir;

fn setup() -> (TempDir, FileCache) {
    let root = tempfile::tempdir().unwrap();
    let cache = FileCache::new(CacheConfig::with_root(root.path()).worker(false));
    (root, cache)
}

#[tokio::test]
async fn test_one_record_per_location() {
    let (root, cache) = setup();
    let location = Location::for_path(root.path().join("a.txt"));

    let first = cache.get(&location);
    let second = cache.get(&location);
    assert!(Arc::ptr_eq(&first, &second));

    let by_uri = cache.get_by_uri(&location.uri()).expect("valid uri");
    assert!(Arc::ptr_eq(&first, &by_uri));
    assert!(cache.get_existing(&location).is_some());

    // The parent directory is shared too.
    let directory = first.directory().expect("directory");
    assert_eq!(directory.location(), Location::for_path(root.path()));
    assert!(Arc::ptr_eq(&directory, &cache.directory(&Location::for_path(root.path()))));
}

#[tokio::test]
async fn test_records_are_dropped_with_their_holders() {
    let (root, cache) = setup();
    let location = Location::for_path(root.path().join("short-lived"));

    let record = cache.get(&location);
    let id = record.id();
    drop(record);

    assert!(cache.get_existing(&location).is_none());
    assert_ne!(cache.get(&location).id(), id);
}

#[tokio::test]
async fn test_missing_file_is_gone() {
    let (root, cache) = setup();
    let record = cache.get(&Location::for_path(root.path().join("missing")));

    record.call_when_ready(Attributes::INFO).await;

    assert!(record.is_gone());
    assert!(cache.get_existing(&record.location()).is_none());
}

#[tokio::test]
async fn test_directory_load_lists_children_and_hidden_names() {
    let (root, cache) = setup();
    std::fs::write(root.path().join("a.txt"), b"a").unwrap();
    std::fs::write(root.path().join("b.txt"), b"bb").unwrap();
    std::fs::write(root.path().join(".hidden"), b"b.txt\n").unwrap();

    let directory = cache.directory(&Location::for_path(root.path()));
    let mut events = directory.subscribe();
    directory.load(None).await.expect("load");

    assert!(directory.is_loaded());
    let mut names: Vec<String> = directory.active_files().iter().map(|r| r.name().to_string()).collect();
    names.sort();
    assert_eq!(names, vec![".hidden", "a.txt", "b.txt"]);

    match events.recv().await.expect("event") {
        DirectoryEvent::FilesAdded(added) => assert_eq!(added.len(), 3),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(events.recv().await.expect("event"), DirectoryEvent::DoneLoading));

    let b = cache.get(&Location::for_path(root.path().join("b.txt")));
    assert!(b.got_file_info());
    assert_eq!(b.size(), 2);
    assert!(!b.should_show(false, true));
    assert!(b.should_show(true, true));

    let a = cache.get(&Location::for_path(root.path().join("a.txt")));
    assert!(a.should_show(false, true));
}

#[tokio::test]
async fn test_reload_reports_vanished_files() {
    let (root, cache) = setup();
    std::fs::write(root.path().join("keep"), b"").unwrap();
    std::fs::write(root.path().join("drop"), b"").unwrap();

    let directory = cache.directory(&Location::for_path(root.path()));
    directory.load(None).await.expect("load");
    let dropped = cache.get(&Location::for_path(root.path().join("drop")));

    std::fs::remove_file(root.path().join("drop")).unwrap();
    let mut events = directory.subscribe();
    directory.load(None).await.expect("reload");

    match events.recv().await.expect("event") {
        DirectoryEvent::FilesRemoved(removed) => assert_eq!(removed, vec![dropped.location()]),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(dropped.is_gone());
    assert_eq!(directory.active_files().len(), 1);
}

#[tokio::test]
async fn test_load_error_is_reported() {
    let (root, cache) = setup();
    let directory = cache.directory(&Location::for_path(root.path().join("nowhere")));
    let mut events = directory.subscribe();

    let err = directory.load(None).await.err().expect("load fails");
    assert_eq!(err.kind(), FileErrorKind::NotFound);

    match events.recv().await.expect("event") {
        DirectoryEvent::LoadError { kind, message } => {
            assert_eq!(kind, FileErrorKind::NotFound);
            assert!(message.starts_with("Unable to find the requested file."));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_item_counts_and_deep_counts() {
    let (root, cache) = setup();
    let top = root.path().join("top");
    std::fs::create_dir_all(top.join("sub/inner")).unwrap();
    std::fs::write(top.join("one"), b"12345").unwrap();
    std::fs::write(top.join("sub/two"), b"123").unwrap();

    let record = cache.get(&Location::for_path(&top));
    assert_eq!(record.directory_item_count(), Knowledge::Unknown);

    record
        .call_when_ready(Attributes::INFO | Attributes::DIRECTORY_ITEM_COUNT | Attributes::DEEP_COUNTS)
        .await;

    assert_eq!(record.directory_item_count(), Knowledge::Known(2));
    let deep = record.deep_counts();
    assert_eq!(deep.status, DeepCountStatus::Done);
    assert_eq!(deep.files, 2);
    assert_eq!(deep.directories, 2);
    assert_eq!(deep.unreadable_directories, 0);
    assert_eq!(deep.total_size, 8);

    let file = cache.get(&Location::for_path(top.join("one")));
    file.call_when_ready(Attributes::INFO | Attributes::DIRECTORY_ITEM_COUNT).await;
    assert_eq!(file.directory_item_count(), Knowledge::Unknowable);
}

#[tokio::test]
async fn test_invalidation_refetches() {
    let (root, cache) = setup();
    let path = root.path().join("grows");
    std::fs::write(&path, b"1").unwrap();

    let record = cache.get(&Location::for_path(&path));
    record.call_when_ready(Attributes::INFO).await;
    assert_eq!(record.size(), 1);
    assert!(record.check_if_ready(Attributes::INFO));

    std::fs::write(&path, b"1234").unwrap();
    cache.file_changed(&record.location());
    assert!(!record.check_if_ready(Attributes::INFO));

    assert_eq!(cache.process_pending().await, 1);
    assert_eq!(record.size(), 4);
}

#[tokio::test]
async fn test_moved_file_keeps_its_record() {
    let (root, cache) = setup();
    std::fs::create_dir(root.path().join("dest")).unwrap();
    std::fs::write(root.path().join("file"), b"").unwrap();
    let from = Location::for_path(root.path().join("file"));
    let to = Location::for_path(root.path().join("dest/file"));

    let record = cache.get(&from);
    std::fs::rename(root.path().join("file"), root.path().join("dest/file")).unwrap();
    cache.file_moved(&from, &to);

    assert_eq!(record.location(), to);
    assert!(Arc::ptr_eq(&record, &cache.get(&to)));
    assert!(cache.get_existing(&from).is_none());
}

#[tokio::test]
async fn test_sort_by_name_and_size() {
    let (root, cache) = setup();
    std::fs::create_dir(root.path().join("folder")).unwrap();
    std::fs::write(root.path().join("file10"), b"1").unwrap();
    std::fs::write(root.path().join("file9"), b"123").unwrap();
    std::fs::write(root.path().join("#notes"), b"12").unwrap();

    let directory = cache.directory(&Location::for_path(root.path()));
    directory.load(None).await.expect("load");
    let mut records = directory.active_files();

    sort_records(&mut records, SortKey::DisplayName, true, false);
    let names: Vec<String> = records.iter().map(|r| r.name().to_string()).collect();
    assert_eq!(names, vec!["folder", "file9", "file10", "#notes"]);

    sort_records(&mut records, SortKey::Size, false, false);
    let names: Vec<String> = records.iter().map(|r| r.name().to_string()).collect();
    assert_eq!(names, vec!["folder", "file10", "#notes", "file9"]);

    // Folders stay first when the order is reversed.
    sort_records(&mut records, SortKey::DisplayName, true, true);
    assert_eq!(records[0].name().as_ref(), "folder");
    assert_eq!(records[1].name().as_ref(), "#notes");
}

#[tokio::test]
async fn test_unknown_sizes_sort_together() {
    let (root, cache) = setup();
    std::fs::write(root.path().join("known"), b"1").unwrap();
    let known = cache.get(&Location::for_path(root.path().join("known")));
    known.call_when_ready(Attributes::INFO).await;

    let a = cache.get(&Location::for_path(root.path().join("a")));
    let b = cache.get(&Location::for_path(root.path().join("b")));

    // Neither has info: equal on size, so the name decides.
    assert_eq!(
        compare_for_sort(&a, &b, SortKey::Size, false, false),
        std::cmp::Ordering::Less
    );
    assert_eq!(
        compare_for_sort(&a, &known, SortKey::Size, false, false),
        std::cmp::Ordering::Less
    );
}

#[tokio::test]
async fn test_collect_garbage_drops_unused_directories() {
    let (root, cache) = setup();
    let sub = root.path().join("sub");
    std::fs::create_dir(&sub).unwrap();

    let record = cache.get(&Location::for_path(sub.join("x")));
    drop(record);

    assert!(cache.collect_garbage() >= 1);
    assert!(cache.existing_directory(&Location::for_path(&sub)).is_none());
}
