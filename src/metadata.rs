use std::path::Path;

use mime_guess::MimeGuess;

pub const DIRECTORY_MIME_TYPE: &str = "inode/directory";
pub const SYMLINK_MIME_TYPE: &str = "inode/symlink";
pub const DESKTOP_MIME_TYPE: &str = "application/x-desktop";
pub const SAVED_SEARCH_MIME_TYPE: &str = "x-directory/nautilus-saved-search";
pub const ZERO_SIZE_MIME_TYPE: &str = "application/x-zerosize";
pub const OCTET_STREAM_MIME_TYPE: &str = "application/octet-stream";

/// Bytes read from the head of a file for content sniffing.
pub const SNIFF_LENGTH: usize = 8192;

pub struct MimeResolver;

impl MimeResolver {
    /// MIME type from the file name alone, `None` when the extension says
    /// nothing.
    pub fn guess_from_name(path: &Path) -> Option<String> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("desktop") => return Some(DESKTOP_MIME_TYPE.to_string()),
            Some("savedSearch") => return Some(SAVED_SEARCH_MIME_TYPE.to_string()),
            _ => {}
        }
        MimeGuess::from_path(path).first().map(|m| m.to_string())
    }

    /// MIME type from the leading bytes of the file.
    pub fn sniff(head: &[u8]) -> String {
        if head.is_empty() {
            return ZERO_SIZE_MIME_TYPE.to_string();
        }
        if let Some(kind) = infer::get(head) {
            return kind.mime_type().to_string();
        }
        if looks_like_text(head) {
            "text/plain".to_string()
        } else {
            OCTET_STREAM_MIME_TYPE.to_string()
        }
    }

    pub fn guess_mime_type(path: &Path) -> String {
        Self::guess_from_name(path).unwrap_or_else(|| OCTET_STREAM_MIME_TYPE.to_string())
    }

    /// Gets the icon name for a given MIME type.
    /// Follows the freedesktop.org Icon Naming Specification.
    pub fn get_icon_name(mime_type: &str) -> String {
        if mime_type == DIRECTORY_MIME_TYPE {
            return "folder".to_string();
        }
        mime_type.replace('/', "-")
    }

    /// Human readable type description used for type sorting.
    pub fn describe(mime_type: &str) -> String {
        match mime_type {
            DIRECTORY_MIME_TYPE => "Folder".to_string(),
            SYMLINK_MIME_TYPE => "Link".to_string(),
            DESKTOP_MIME_TYPE => "Desktop configuration file".to_string(),
            ZERO_SIZE_MIME_TYPE => "Empty document".to_string(),
            OCTET_STREAM_MIME_TYPE => "Binary".to_string(),
            other => match other.split_once('/') {
                Some((top, sub)) => format!("{} ({})", sub, top),
                None => other.to_string(),
            },
        }
    }

    pub fn is_text(mime_type: &str) -> bool {
        mime_type.starts_with("text/")
            || matches!(
                mime_type,
                "application/x-shellscript" | "application/json" | "application/xml"
            )
    }
}

fn looks_like_text(head: &[u8]) -> bool {
    match std::str::from_utf8(head) {
        Ok(s) => !s.contains('\0'),
        // A multibyte sequence may be cut at the end of the sniff window.
        Err(e) => e.error_len().is_none() && !head[..e.valid_up_to()].contains(&0),
    }
}

/// Layout limits for the text preview drawn on top of a file icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopLeftTextLimits {
    pub max_lines: usize,
    pub max_chars_per_line: usize,
    pub max_bytes: usize,
}

pub const TOP_LEFT_TEXT_SMALL: TopLeftTextLimits = TopLeftTextLimits {
    max_lines: 5,
    max_chars_per_line: 10,
    max_bytes: 1024,
};

pub const TOP_LEFT_TEXT_LARGE: TopLeftTextLimits = TopLeftTextLimits {
    max_lines: 24,
    max_chars_per_line: 80,
    max_bytes: 10000,
};

/// Extracts the icon preview text from the head of a text file.
///
/// Keeps printable characters only, truncates each line to the column
/// limit and drops the rest of it. Returns `None` for empty input and for
/// input that is not UTF-8 (a multibyte character cut at the read limit is
/// tolerated).
pub fn top_left_text(head: &[u8], limits: TopLeftTextLimits) -> Option<String> {
    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        Err(e) => {
            let cut_at_limit = head.len() >= limits.max_bytes && head.len() - e.valid_up_to() < 6;
            if !cut_at_limit {
                return None;
            }
            // valid_up_to is a char boundary
            std::str::from_utf8(&head[..e.valid_up_to()]).ok()?
        }
    };
    if text.is_empty() || text.starts_with('\0') {
        return None;
    }

    let mut out = String::with_capacity(limits.max_lines * limits.max_chars_per_line);
    let mut lines = text.split('\n').peekable();
    let mut line_no = 0;
    while let Some(line) = lines.next() {
        out.extend(
            line.chars()
                .filter(|c| !c.is_control())
                .take(limits.max_chars_per_line),
        );
        line_no += 1;
        if line_no == limits.max_lines {
            break;
        }
        match lines.peek().copied() {
            Some(next) if !next.is_empty() || lines.clone().nth(1).is_some() => out.push('\n'),
            _ => break,
        }
    }
    Some(out)
}
