// Thumbnail lookup
// Finds existing thumbnails per the freedesktop.org thumbnail specification

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::config::CacheConfig;

/// Thumbnail size variants according to freedesktop.org spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailSize {
    Normal,  // 128x128
    Large,   // 256x256
    XLarge,  // 512x512
    XXLarge, // 1024x1024
}

impl ThumbnailSize {
    pub fn directory_name(&self) -> &'static str {
        match self {
            ThumbnailSize::Normal => "normal",
            ThumbnailSize::Large => "large",
            ThumbnailSize::XLarge => "x-large",
            ThumbnailSize::XXLarge => "xx-large",
        }
    }
}

/// Directory the default thumbnailer records its failures in.
const FAIL_DIR: &str = "fail/gnome-thumbnail-factory";

/// Thumbnails are named with the MD5 hash of the file URI.
pub fn thumbnail_name(uri: &str) -> String {
    format!("{:x}.png", md5::compute(uri.as_bytes()))
}

pub fn thumbnail_path(config: &CacheConfig, uri: &str, size: ThumbnailSize) -> PathBuf {
    config
        .thumbnail_root
        .join(size.directory_name())
        .join(thumbnail_name(uri))
}

pub fn failed_marker_path(config: &CacheConfig, uri: &str) -> PathBuf {
    config.thumbnail_root.join(FAIL_DIR).join(thumbnail_name(uri))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThumbnailLookup {
    pub path: Option<PathBuf>,
    /// A previous attempt to thumbnail the file failed.
    pub failed: bool,
}

async fn modified_secs(path: &Path) -> Option<i64> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    Some(modified.duration_since(UNIX_EPOCH).ok()?.as_secs() as i64)
}

/// The largest thumbnail of `uri` that is not older than the file.
pub async fn lookup(config: &CacheConfig, uri: &str, file_mtime: i64) -> ThumbnailLookup {
    for size in [
        ThumbnailSize::XXLarge,
        ThumbnailSize::XLarge,
        ThumbnailSize::Large,
        ThumbnailSize::Normal,
    ] {
        let path = thumbnail_path(config, uri, size);
        if let Some(mtime) = modified_secs(&path).await {
            if mtime >= file_mtime {
                return ThumbnailLookup {
                    path: Some(path),
                    failed: false,
                };
            }
        }
    }

    ThumbnailLookup {
        path: None,
        failed: tokio::fs::try_exists(failed_marker_path(config, uri))
            .await
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_md5_of_uri() {
        assert_eq!(
            thumbnail_name("file:///home/jens/photos/me.png"),
            "c6ee772d9e49320e97ec29a7eb5b1697.png"
        );
    }

    #[tokio::test]
    async fn finds_fresh_thumbnail_and_failure_marker() {
        let root = tempfile::tempdir().expect("tempdir");
        let config = CacheConfig::with_root(root.path());
        let uri = "file:///tmp/a.png";

        let found = lookup(&config, uri, 0).await;
        assert_eq!(found, ThumbnailLookup::default());

        let marker = failed_marker_path(&config, uri);
        std::fs::create_dir_all(marker.parent().expect("parent")).expect("mkdir");
        std::fs::write(&marker, b"").expect("write");
        assert!(lookup(&config, uri, 0).await.failed);

        let path = thumbnail_path(&config, uri, ThumbnailSize::Normal);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, b"png").expect("write");
        let found = lookup(&config, uri, 0).await;
        assert_eq!(found.path, Some(path));
        assert!(!found.failed);
    }
}
