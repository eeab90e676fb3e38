//! The file-info cache: records, directories and their registry.

pub mod attributes;
pub mod cache;
pub mod directory;
pub mod file;
pub mod link;
pub mod sort;
