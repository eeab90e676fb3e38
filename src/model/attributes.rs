use bitflags::bitflags;

bitflags! {
    /// Categories of cached file data that are fetched and invalidated
    /// together.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Attributes: u32 {
        const INFO = 1 << 0;
        const LINK_INFO = 1 << 1;
        const DIRECTORY_ITEM_COUNT = 1 << 2;
        const DEEP_COUNTS = 1 << 3;
        const MIME_LIST = 1 << 4;
        const TOP_LEFT_TEXT = 1 << 5;
        const LARGE_TOP_LEFT_TEXT = 1 << 6;
        const EXTENSION_INFO = 1 << 7;
        const THUMBNAIL = 1 << 8;
        const MOUNT = 1 << 9;
        const FILESYSTEM_INFO = 1 << 10;
    }
}

/// How much is known about a lazily fetched value.
///
/// Variant order is the sort order: a value nobody asked for yet comes first,
/// then one that could not be determined, then known values ascending. Two
/// `Unknown` (or two `Unknowable`) values compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Knowledge<T> {
    #[default]
    Unknown,
    Unknowable,
    Known(T),
}

impl<T> Knowledge<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Knowledge::Known(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Knowledge::Known(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeepCountStatus {
    #[default]
    NotStarted,
    InProgress,
    Done,
}

/// Recursive totals for a directory subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeepCounts {
    pub status: DeepCountStatus,
    pub files: u64,
    pub directories: u64,
    pub unreadable_directories: u64,
    pub total_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knowledge_orders_unknown_first() {
        let mut values = vec![
            Knowledge::Known(3u32),
            Knowledge::Unknowable,
            Knowledge::Known(0),
            Knowledge::Unknown,
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Knowledge::Unknown,
                Knowledge::Unknowable,
                Knowledge::Known(0),
                Knowledge::Known(3)
            ]
        );
        assert_eq!(Knowledge::<u32>::Unknown.cmp(&Knowledge::Unknown), std::cmp::Ordering::Equal);
    }
}
