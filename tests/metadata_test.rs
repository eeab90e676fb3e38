use npfm::metadata::MimeResolver;
use npfm::{Attributes, CacheConfig, FileCache, Location};

#[tokio::test]
async fn test_metadata_detection() {
    // 1. Cache over a temporary root, refreshed inline
    let root = tempfile::tempdir().unwrap();
    let cache = FileCache::new(CacheConfig::with_root(root.path()).worker(false));

    // 2. Create a text file
    let path = root.path().join("npfm_test_metadata.txt");
    tokio::fs::write(&path, b"Hello, Metadata!\nsecond line").await.unwrap();

    // 3. Fetch info and the icon preview text
    let record = cache.get(&Location::for_path(&path));
    record
        .call_when_ready(Attributes::INFO | Attributes::TOP_LEFT_TEXT)
        .await;

    // 4. Verify MIME type and icon
    assert_eq!(record.mime_type().as_deref(), Some("text/plain"));
    assert_eq!(MimeResolver::get_icon_name("text/plain"), "text-plain");
    assert_eq!(record.type_description().as_deref(), Some("plain (text)"));

    // 5. Verify preview text is cut at the column limit
    assert_eq!(record.top_left_text().as_deref(), Some("Hello, Met\nsecond lin"));
}

#[tokio::test]
async fn test_directory_and_empty_file_types() {
    let root = tempfile::tempdir().unwrap();
    let cache = FileCache::new(CacheConfig::with_root(root.path()).worker(false));

    let dir = root.path().join("folder");
    tokio::fs::create_dir(&dir).await.unwrap();
    let empty = root.path().join("README");
    tokio::fs::write(&empty, b"").await.unwrap();

    let dir_record = cache.get(&Location::for_path(&dir));
    dir_record.call_when_ready(Attributes::INFO).await;
    assert!(dir_record.is_directory());
    assert_eq!(dir_record.type_description().as_deref(), Some("Folder"));

    let empty_record = cache.get(&Location::for_path(&empty));
    empty_record
        .call_when_ready(Attributes::INFO | Attributes::TOP_LEFT_TEXT)
        .await;
    assert_eq!(empty_record.size(), 0);
    assert_eq!(empty_record.top_left_text(), None);
}
