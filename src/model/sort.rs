//! Ordering of file records for views.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::model::file::{DateKind, FileRecord};

/// Names starting with one of these sort after all others.
const SORT_LAST_CHARS: [char; 2] = ['.', '#'];

/// Width digit runs are padded to in collation keys.
const DIGIT_RUN_WIDTH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    DisplayName,
    Size,
    Type,
    Mtime,
    Atime,
    TrashedTime,
}

impl SortKey {
    /// The key for a view column name.
    pub fn from_attribute(name: &str) -> Option<Self> {
        match name {
            "name" => Some(SortKey::DisplayName),
            "size" => Some(SortKey::Size),
            "type" => Some(SortKey::Type),
            "date_modified" | "modification_date" => Some(SortKey::Mtime),
            "date_accessed" | "accessed_date" => Some(SortKey::Atime),
            "trashed_on" => Some(SortKey::TrashedTime),
            _ => None,
        }
    }
}

/// Case-folded sort key in which digit runs compare by numeric value, so
/// `file9` sorts before `file10`.
pub fn collation_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len() + 8);
    let mut digits = String::new();

    let flush = |digits: &mut String, key: &mut String| {
        if digits.is_empty() {
            return;
        }
        let trimmed = digits.trim_start_matches('0');
        for _ in trimmed.len()..DIGIT_RUN_WIDTH {
            key.push('0');
        }
        key.push_str(trimmed);
        digits.clear();
    };

    for c in name.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            flush(&mut digits, &mut key);
            key.extend(c.to_lowercase());
        }
    }
    flush(&mut digits, &mut key);
    key
}

fn compare_internal(a: &FileRecord, b: &FileRecord, directories_first: bool, reversed: bool) -> Ordering {
    if directories_first {
        match (a.is_directory(), b.is_directory()) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
    }
    let order = a.sort_order().cmp(&b.sort_order());
    if reversed {
        order.reverse()
    } else {
        order
    }
}

fn compare_by_display_name(a: &FileRecord, b: &FileRecord) -> Ordering {
    let last_a = a.display_name().starts_with(SORT_LAST_CHARS);
    let last_b = b.display_name().starts_with(SORT_LAST_CHARS);
    match (last_a, last_b) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => a.collation_key().cmp(&b.collation_key()),
    }
}

fn compare_by_directory_name(a: &FileRecord, b: &FileRecord) -> Ordering {
    let (parent_a, parent_b) = (a.parent_location(), b.parent_location());
    if parent_a == parent_b {
        return Ordering::Equal;
    }
    let key = |parent: Option<crate::location::Location>| parent.map(|p| collation_key(&p.uri()));
    key(parent_a).cmp(&key(parent_b))
}

fn compare_by_full_path(a: &FileRecord, b: &FileRecord) -> Ordering {
    compare_by_directory_name(a, b).then_with(|| compare_by_display_name(a, b))
}

/// Folders before files. Folders by item count and files by size, each
/// with unknown values first, then undeterminable ones, then ascending.
fn compare_by_size(a: &FileRecord, b: &FileRecord) -> Ordering {
    match (a.is_directory(), b.is_directory()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => a.directory_item_count().cmp(&b.directory_item_count()),
        (false, false) => a.size_knowledge().cmp(&b.size_knowledge()),
    }
}

fn compare_by_type(a: &FileRecord, b: &FileRecord) -> Ordering {
    match (a.is_directory(), b.is_directory()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    if let (Some(mime_a), Some(mime_b)) = (a.mime_type(), b.mime_type()) {
        if mime_a == mime_b {
            return Ordering::Equal;
        }
    }
    match (a.type_description(), b.type_description()) {
        (Some(ta), Some(tb)) => collation_key(&ta).cmp(&collation_key(&tb)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_by_time(a: &FileRecord, b: &FileRecord, kind: DateKind) -> Ordering {
    a.time_knowledge(kind).cmp(&b.time_knowledge(kind))
}

/// Orders two records for a view sorted by `key`.
///
/// Folders come first when `directories_first` is set, regardless of
/// `reversed`. Ties on the key fall back to the full path.
pub fn compare_for_sort(
    a: &FileRecord,
    b: &FileRecord,
    key: SortKey,
    directories_first: bool,
    reversed: bool,
) -> Ordering {
    if std::ptr::eq(a, b) {
        return Ordering::Equal;
    }

    let result = compare_internal(a, b, directories_first, reversed);
    if result != Ordering::Equal {
        return result;
    }

    let result = match key {
        SortKey::DisplayName => {
            compare_by_display_name(a, b).then_with(|| compare_by_directory_name(a, b))
        }
        SortKey::Size => compare_by_size(a, b).then_with(|| compare_by_full_path(a, b)),
        SortKey::Type => compare_by_type(a, b).then_with(|| compare_by_full_path(a, b)),
        SortKey::Mtime => {
            compare_by_time(a, b, DateKind::Modified).then_with(|| compare_by_full_path(a, b))
        }
        SortKey::Atime => {
            compare_by_time(a, b, DateKind::Accessed).then_with(|| compare_by_full_path(a, b))
        }
        SortKey::TrashedTime => {
            compare_by_time(a, b, DateKind::Trashed).then_with(|| compare_by_full_path(a, b))
        }
    };

    if reversed {
        result.reverse()
    } else {
        result
    }
}

/// Like [`compare_for_sort`] for a column name. Columns without a sort key
/// compare by their string values, when both records have one.
pub fn compare_for_sort_by_attribute(
    a: &FileRecord,
    b: &FileRecord,
    attribute: &str,
    directories_first: bool,
    reversed: bool,
) -> Ordering {
    if let Some(key) = SortKey::from_attribute(attribute) {
        return compare_for_sort(a, b, key, directories_first, reversed);
    }

    let result = compare_internal(a, b, directories_first, reversed);
    if result != Ordering::Equal {
        return result;
    }
    let result = match (a.string_attribute(attribute), b.string_attribute(attribute)) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        _ => Ordering::Equal,
    };
    if reversed {
        result.reverse()
    } else {
        result
    }
}

pub fn sort_records(records: &mut [Arc<FileRecord>], key: SortKey, directories_first: bool, reversed: bool) {
    records.sort_by(|a, b| compare_for_sort(a, b, key, directories_first, reversed));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_runs_sort_numerically() {
        assert!(collation_key("file9") < collation_key("file10"));
        assert!(collation_key("File2.txt") < collation_key("file10.txt"));
        assert_eq!(collation_key("a007"), collation_key("A7"));
    }

    #[test]
    fn column_names_map_to_keys() {
        assert_eq!(SortKey::from_attribute("modification_date"), Some(SortKey::Mtime));
        assert_eq!(SortKey::from_attribute("trashed_on"), Some(SortKey::TrashedTime));
        assert_eq!(SortKey::from_attribute("owner"), None);
    }
}
