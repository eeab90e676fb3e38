//! XDG user directories
//!
//! Reads the special user directories (Desktop, Documents, ...) from the
//! `user-dirs.dirs` file named by the cache configuration, and keeps that
//! file in step when one of those directories is renamed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::CacheConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserDirectory {
    Desktop,
    Documents,
    Download,
    Music,
    Pictures,
    PublicShare,
    Templates,
    Videos,
}

const ALL: [UserDirectory; 8] = [
    UserDirectory::Desktop,
    UserDirectory::Documents,
    UserDirectory::Download,
    UserDirectory::Music,
    UserDirectory::Pictures,
    UserDirectory::PublicShare,
    UserDirectory::Templates,
    UserDirectory::Videos,
];

impl UserDirectory {
    /// The name `xdg-user-dirs-update` knows the directory by.
    pub fn xdg_name(self) -> &'static str {
        match self {
            UserDirectory::Desktop => "DESKTOP",
            UserDirectory::Documents => "DOCUMENTS",
            UserDirectory::Download => "DOWNLOAD",
            UserDirectory::Music => "MUSIC",
            UserDirectory::Pictures => "PICTURES",
            UserDirectory::PublicShare => "PUBLICSHARE",
            UserDirectory::Templates => "TEMPLATES",
            UserDirectory::Videos => "VIDEOS",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        let name = key.strip_prefix("XDG_")?.strip_suffix("_DIR")?;
        ALL.into_iter().find(|d| d.xdg_name() == name)
    }
}

/// Parses `user-dirs.dirs` lines of the form `XDG_NAME_DIR="$HOME/Path"` or
/// `XDG_NAME_DIR="/abs/path"`. Later lines override earlier ones.
pub fn parse_user_dirs_file(content: &str, home_dir: &Path) -> HashMap<UserDirectory, PathBuf> {
    let mut dirs = HashMap::new();

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let Some(directory) = UserDirectory::from_key(key.trim()) else {
            continue;
        };
        let Some(value) = value.trim().strip_prefix('"') else {
            continue;
        };
        let value = value.split('"').next().unwrap_or_default();

        let path = if let Some(rest) = value.strip_prefix("$HOME") {
            if !(rest.is_empty() || rest.starts_with('/')) {
                continue;
            }
            let rest = rest.trim_matches('/');
            if rest.is_empty() {
                home_dir.to_path_buf()
            } else {
                home_dir.join(rest)
            }
        } else if value.starts_with('/') {
            match value.trim_end_matches('/') {
                "" => PathBuf::from("/"),
                trimmed => PathBuf::from(trimmed),
            }
        } else {
            continue;
        };

        dirs.insert(directory, path);
    }

    dirs
}

/// The special directories of the configured user. The desktop defaults to
/// `~/Desktop` when the file does not name one.
pub fn user_special_dirs(config: &CacheConfig) -> HashMap<UserDirectory, PathBuf> {
    let mut dirs = match std::fs::read_to_string(&config.user_dirs_file) {
        Ok(content) => parse_user_dirs_file(&content, &config.home_dir),
        Err(_) => HashMap::new(),
    };
    dirs.entry(UserDirectory::Desktop)
        .or_insert_with(|| config.home_dir.join("Desktop"));
    dirs
}

pub fn is_home(config: &CacheConfig, path: &Path) -> bool {
    path == config.home_dir
}

pub fn user_directory_for_path(config: &CacheConfig, path: &Path) -> Option<UserDirectory> {
    user_special_dirs(config)
        .into_iter()
        .find(|(_, p)| p == path && !is_home(config, p))
        .map(|(d, _)| d)
}

pub fn is_user_special_directory(config: &CacheConfig, path: &Path) -> bool {
    user_directory_for_path(config, path).is_some()
}

/// Points the user-dirs configuration at `new_path` when `old_path` was one
/// of the special directories. Runs `xdg-user-dirs-update` synchronously.
pub fn user_special_dir_moved(config: &CacheConfig, old_path: &Path, new_path: &Path) {
    let Some(directory) = user_directory_for_path(config, old_path) else {
        return;
    };
    let status = Command::new("xdg-user-dirs-update")
        .env("XDG_CONFIG_HOME", config.user_dirs_file.parent().unwrap_or(&config.home_dir))
        .arg("--set")
        .arg(directory.xdg_name())
        .arg(new_path)
        .status();
    match status {
        Ok(status) if status.success() => {
            log::info!("{} directory moved to {}", directory.xdg_name(), new_path.display());
        }
        Ok(status) => log::warn!("xdg-user-dirs-update exited with {}", status),
        Err(e) => log::warn!("failed to run xdg-user-dirs-update: {}", e),
    }
}
