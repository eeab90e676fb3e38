use tokio::io::{AsyncReadExt, AsyncWriteExt};
use npfm::backend::local::LocalBackend;
use npfm::{BackendRegistry, FileErrorKind, FileQueryInfoFlags, FileType, Location};
use std::sync::Arc;

#[tokio::test]
async fn test_local_backend_lifecycle() {
    // 1. Register backend
    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(LocalBackend::new()));

    // 2. Define test file path
    let test_dir = tempfile::tempdir().unwrap();
    let test_file_path = test_dir.path().join("npfm_test_file.txt");
    let uri = Location::for_path(&test_file_path).uri();

    // 3. Get file handle
    let file = registry.file_for_uri(&uri).expect("Failed to get file handle");

    // 4. Create/Write file
    {
        let mut output = file.create_file(None).await.expect("Failed to create file");
        output.write_all(b"Hello, NPFM!").await.expect("Failed to write");
        output.close(None).expect("Failed to close output");
    }

    // 5. A second create fails
    let err = file.create_file(None).await.err().expect("create should fail");
    assert_eq!(err.kind(), FileErrorKind::Exists);

    // 6. Query info
    let info = file
        .query_info("standard::*", FileQueryInfoFlags::NONE, None)
        .await
        .expect("Failed to query info");
    assert_eq!(info.get_name().unwrap(), "npfm_test_file.txt");
    assert_eq!(info.get_size(), 12);
    assert_eq!(info.get_file_type(), FileType::Regular);

    // 7. Read file
    {
        let mut input = file.read(None).await.expect("Failed to open for read");
        let mut buffer = String::new();
        input.read_to_string(&mut buffer).await.expect("Failed to read");
        assert_eq!(buffer, "Hello, NPFM!");
        input.close(None).expect("Failed to close input");
    }

    // 8. Rename within the directory
    let renamed = file
        .set_display_name("renamed.txt", None)
        .await
        .expect("Failed to rename");
    assert_eq!(renamed, Location::for_path(test_dir.path().join("renamed.txt")));
    assert!(!file.exists(None).await.expect("Failed to check existence"));

    // 9. Delete file
    let renamed_file = registry.file_for_location(&renamed).unwrap();
    renamed_file.delete(None).await.expect("Failed to delete");

    // 10. Verify deleted
    assert!(!renamed_file.exists(None).await.expect("Failed to check existence"));
}

#[tokio::test]
async fn test_unknown_scheme_is_not_supported() {
    let registry = BackendRegistry::with_defaults();
    let err = registry.file_for_uri("sftp://host/tmp/a").err().expect("no sftp backend");
    assert_eq!(err.kind(), FileErrorKind::NotSupported);
}
