//! Desktop links
//!
//! Two kinds of "link" show up on a desktop: `.desktop` key files on disk,
//! whose visible name is their `Name=` key, and virtual desktop icons (home,
//! trash, mounted volumes) provided by the caller through [`DesktopLink`].

use std::path::Path;

use async_trait::async_trait;

use crate::error::{FileError, FileErrorKind, FileResult};

const DESKTOP_GROUP: &str = "[Desktop Entry]";

/// A virtual desktop icon.
#[async_trait]
pub trait DesktopLink: Send + Sync + std::fmt::Debug {
    fn display_name(&self) -> String;

    fn icon(&self) -> Option<String>;

    /// Where activating the icon leads.
    fn activation_uri(&self) -> Option<String>;

    /// Whether the icon belongs to another desktop, hidden unless asked for.
    fn is_foreign(&self) -> bool {
        false
    }

    fn can_rename(&self) -> bool;

    async fn rename(&self, new_name: &str) -> FileResult<()>;
}

/// The keys of a `.desktop` file the cache cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesktopEntry {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub url: Option<String>,
}

fn entry_lines(content: &str) -> impl Iterator<Item = (&str, &str)> {
    let mut in_group = false;
    content.lines().filter_map(move |line| {
        let line = line.trim();
        if line.starts_with('[') {
            in_group = line == DESKTOP_GROUP;
            return None;
        }
        if !in_group || line.starts_with('#') {
            return None;
        }
        let (key, value) = line.split_once('=')?;
        Some((key.trim(), value.trim()))
    })
}

pub fn parse_desktop_entry(content: &str) -> DesktopEntry {
    let mut entry = DesktopEntry::default();
    for (key, value) in entry_lines(content) {
        match key {
            "Name" => entry.name = Some(value.to_string()),
            "Icon" => entry.icon = Some(value.to_string()),
            "URL" => entry.url = Some(value.to_string()),
            _ => {}
        }
    }
    entry
}

/// Replaces (or adds) the `Name=` key of the desktop group.
pub fn set_desktop_name(content: &str, name: &str) -> String {
    let mut out = Vec::new();
    let mut in_group = false;
    let mut written = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            if in_group && !written {
                out.push(format!("Name={}", name));
                written = true;
            }
            in_group = trimmed == DESKTOP_GROUP;
            out.push(line.to_string());
            continue;
        }
        if in_group && !written && trimmed.split_once('=').map(|(k, _)| k.trim()) == Some("Name") {
            out.push(format!("Name={}", name));
            written = true;
            continue;
        }
        out.push(line.to_string());
    }

    if !written {
        if !in_group {
            out.push(DESKTOP_GROUP.to_string());
        }
        out.push(format!("Name={}", name));
    }

    let mut text = out.join("\n");
    text.push('\n');
    text
}

pub async fn read_desktop_entry(path: &Path) -> FileResult<DesktopEntry> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(parse_desktop_entry(&content))
}

/// Rewrites the visible name of a desktop file. Returns whether the text
/// actually changed.
pub async fn rename_desktop_file(path: &Path, new_name: &str) -> FileResult<bool> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        FileError::with_source(FileErrorKind::Failed, "Unable to rename desktop file", Box::new(e))
    })?;
    if parse_desktop_entry(&content).name.as_deref() == Some(new_name) {
        return Ok(false);
    }
    tokio::fs::write(path, set_desktop_name(&content, new_name))
        .await
        .map_err(|e| {
            FileError::with_source(FileErrorKind::Failed, "Unable to rename desktop file", Box::new(e))
        })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY: &str = "[Desktop Entry]\nType=Link\nName=Old\nIcon=folder\n\n[Other]\nName=Ignored\n";

    #[test]
    fn reads_only_the_desktop_group() {
        let entry = parse_desktop_entry(ENTRY);
        assert_eq!(entry.name.as_deref(), Some("Old"));
        assert_eq!(entry.icon.as_deref(), Some("folder"));
    }

    #[test]
    fn replaces_name_in_place() {
        let text = set_desktop_name(ENTRY, "New");
        assert_eq!(parse_desktop_entry(&text).name.as_deref(), Some("New"));
        assert!(text.contains("[Other]\nName=Ignored"));
    }

    #[test]
    fn adds_missing_name() {
        let text = set_desktop_name("[Desktop Entry]\nType=Link\n[Other]\nX=1\n", "Fresh");
        assert_eq!(parse_desktop_entry(&text).name.as_deref(), Some("Fresh"));
        let text = set_desktop_name("", "Fresh");
        assert_eq!(parse_desktop_entry(&text).name.as_deref(), Some("Fresh"));
    }
}
