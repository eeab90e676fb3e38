//! Absolute locations
//!
//! A `Location` is the identity of everything in the cache: a URI scheme, an
//! optional authority and a decoded absolute path. Local files use the
//! `file` scheme; virtual locations (search results, desktop icons) use their
//! own schemes and are never handed to the local backend.

use std::fmt;
use std::path::{Path, PathBuf};

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};

use crate::error::{FileError, FileErrorKind, FileResult};

/// Characters escaped in the path part of a URI. `/` stays literal.
pub(crate) const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'{')
    .add(b'}')
    .add(b'[')
    .add(b']')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'%');

pub const FILE_SCHEME: &str = "file";
pub const SEARCH_SCHEME: &str = "x-nautilus-search";
pub const DESKTOP_SCHEME: &str = "x-nautilus-desktop";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    scheme: String,
    authority: String,
    path: String,
}

impl Location {
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        Self {
            scheme: FILE_SCHEME.to_string(),
            authority: String::new(),
            path: normalize(&path.as_ref().to_string_lossy()),
        }
    }

    pub fn new(scheme: &str, authority: &str, path: &str) -> Self {
        Self {
            scheme: scheme.to_ascii_lowercase(),
            authority: authority.to_string(),
            path: normalize(path),
        }
    }

    /// Parses a URI, or a bare absolute path.
    pub fn parse(uri: &str) -> FileResult<Self> {
        if uri.starts_with('/') {
            return Ok(Self::for_path(uri));
        }

        let (scheme, rest) = uri.split_once("://").ok_or_else(|| {
            FileError::new(FileErrorKind::InvalidArg, format!("Not a valid URI: {}", uri))
        })?;
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(FileError::new(
                FileErrorKind::InvalidArg,
                format!("Invalid URI scheme in {}", uri),
            ));
        }

        let (authority, raw_path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        let path = urlencoding::decode(raw_path).map_err(|e| {
            FileError::new(FileErrorKind::InvalidArg, format!("Invalid URI {}: {}", uri, e))
        })?;

        Ok(Self::new(scheme, authority, &path))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Decoded absolute path, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_native(&self) -> bool {
        self.scheme == FILE_SCHEME && self.authority.is_empty()
    }

    /// Filesystem path of a native location.
    pub fn to_path(&self) -> Option<PathBuf> {
        self.is_native().then(|| PathBuf::from(&self.path))
    }

    pub fn uri(&self) -> String {
        format!(
            "{}://{}{}",
            self.scheme,
            self.authority,
            utf8_percent_encode(&self.path, PATH_ENCODE_SET)
        )
    }

    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let idx = self.path.rfind('/')?;
        let parent = if idx == 0 { "/" } else { &self.path[..idx] };
        Some(Self {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            path: parent.to_string(),
        })
    }

    pub fn child(&self, name: &str) -> Self {
        let path = if self.is_root() {
            format!("/{}", name)
        } else {
            format!("{}/{}", self.path, name)
        };
        Self {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            path: normalize(&path),
        }
    }

    pub fn basename(&self) -> String {
        if self.is_root() {
            return "/".to_string();
        }
        self.path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// True when `self` lies strictly below `prefix`.
    pub fn has_prefix(&self, prefix: &Location) -> bool {
        if self.scheme != prefix.scheme || self.authority != prefix.authority || self == prefix {
            return false;
        }
        if prefix.is_root() {
            return true;
        }
        self.path
            .strip_prefix(&prefix.path)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
    }

    /// Rewrites `self` from below `from` to below `to`, or to `to` itself
    /// when `self == from`.
    pub fn reparent(&self, from: &Location, to: &Location) -> Option<Self> {
        if self == from {
            return Some(to.clone());
        }
        if !self.has_prefix(from) {
            return None;
        }
        let rest = if from.is_root() {
            &self.path[1..]
        } else {
            &self.path[from.path.len() + 1..]
        };
        Some(to.child(rest))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
        out.push('/');
        out.push_str(part);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_encode() {
        let loc = Location::parse("file:///home/user/My%20Docs/a%23b.txt").expect("parse");
        assert_eq!(loc.path(), "/home/user/My Docs/a#b.txt");
        assert_eq!(loc.uri(), "file:///home/user/My%20Docs/a%23b.txt");
        assert_eq!(loc.basename(), "a#b.txt");
        assert!(loc.is_native());
    }

    #[test]
    fn parent_and_child() {
        let loc = Location::for_path("/tmp/x/");
        assert_eq!(loc.path(), "/tmp/x");
        assert_eq!(loc.parent().expect("parent").path(), "/tmp");
        assert_eq!(Location::for_path("/tmp").parent().expect("root").path(), "/");
        assert!(Location::for_path("/").parent().is_none());
        assert_eq!(Location::for_path("/").child("etc").path(), "/etc");
    }

    #[test]
    fn prefix_and_reparent() {
        let a = Location::for_path("/a");
        let ab = Location::for_path("/a/b/c");
        let ax = Location::for_path("/ab");
        assert!(ab.has_prefix(&a));
        assert!(!ax.has_prefix(&a));
        assert!(!a.has_prefix(&a));

        let moved = ab.reparent(&a, &Location::for_path("/z")).expect("below");
        assert_eq!(moved.path(), "/z/b/c");
        assert!(ax.reparent(&a, &Location::for_path("/z")).is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Location::parse("no scheme here").is_err());
        let search = Location::parse("x-nautilus-search:///").expect("search");
        assert!(!search.is_native());
        assert!(search.is_root());
    }
}
