//! Cache configuration
//!
//! Paths default to the XDG base directories of the current user, read from
//! the environment first and from `directories` otherwise. Tests build a
//! config rooted in a temporary directory with [`CacheConfig::with_root`].

use std::path::{Path, PathBuf};

use directories::{BaseDirs, UserDirs};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// The user's home directory.
    pub home_dir: PathBuf,
    /// Root of the freedesktop trash (`files/` and `info/` live below it).
    pub trash_root: PathBuf,
    /// Root of the freedesktop thumbnail cache.
    pub thumbnail_root: PathBuf,
    /// The `user-dirs.dirs` file naming the special user directories.
    pub user_dirs_file: PathBuf,
    /// Spawn the background refresh task when a runtime is available.
    pub start_worker: bool,
    /// Watch loaded directories for changes.
    pub monitor_directories: bool,
}

fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var(var)
        .ok()
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
}

fn home_dir() -> PathBuf {
    env_dir("HOME")
        .or_else(|| UserDirs::new().map(|d| d.home_dir().to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

impl CacheConfig {
    /// Builds the configuration from `XDG_*` variables.
    pub fn from_env() -> Self {
        let home = home_dir();

        let data_home = env_dir("XDG_DATA_HOME")
            .or_else(|| BaseDirs::new().map(|d| d.data_dir().to_path_buf()))
            .unwrap_or_else(|| home.join(".local").join("share"));
        let cache_home = env_dir("XDG_CACHE_HOME")
            .or_else(|| BaseDirs::new().map(|d| d.cache_dir().to_path_buf()))
            .unwrap_or_else(|| home.join(".cache"));
        let config_home = env_dir("XDG_CONFIG_HOME")
            .or_else(|| BaseDirs::new().map(|d| d.config_dir().to_path_buf()))
            .unwrap_or_else(|| home.join(".config"));

        Self {
            trash_root: data_home.join("Trash"),
            thumbnail_root: cache_home.join("thumbnails"),
            user_dirs_file: config_home.join("user-dirs.dirs"),
            home_dir: home,
            start_worker: true,
            monitor_directories: true,
        }
    }

    /// Everything below `root`: `home/`, `home/.local/share/Trash`,
    /// `home/.cache/thumbnails` and `home/.config/user-dirs.dirs`.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let home = root.as_ref().join("home");
        Self {
            trash_root: home.join(".local").join("share").join("Trash"),
            thumbnail_root: home.join(".cache").join("thumbnails"),
            user_dirs_file: home.join(".config").join("user-dirs.dirs"),
            home_dir: home,
            start_worker: true,
            monitor_directories: false,
        }
    }

    pub fn worker(mut self, start: bool) -> Self {
        self.start_worker = start;
        self
    }

    pub fn monitoring(mut self, monitor: bool) -> Self {
        self.monitor_directories = monitor;
        self
    }

    pub fn trash_files_dir(&self) -> PathBuf {
        self.trash_root.join("files")
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_config_stays_inside_root() {
        let config = CacheConfig::with_root("/tmp/npfm-root");
        assert!(config.trash_root.starts_with("/tmp/npfm-root"));
        assert!(config.thumbnail_root.starts_with("/tmp/npfm-root"));
        assert_eq!(config.trash_files_dir(), config.trash_root.join("files"));
        assert!(!config.monitor_directories);
    }
}
