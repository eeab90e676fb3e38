use crate::backend::Backend;
use crate::error::{FileError, FileErrorKind, FileResult};
use crate::file::local::LocalFile;
use crate::file::File;
use crate::location::{Location, FILE_SCHEME};

pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for LocalBackend {
    fn scheme(&self) -> &'static str {
        FILE_SCHEME
    }

    fn file_for_location(&self, location: &Location) -> FileResult<Box<dyn File>> {
        let path = location.to_path().ok_or_else(|| {
            FileError::new(
                FileErrorKind::InvalidArg,
                format!("Invalid URI scheme for LocalBackend: {}", location.scheme()),
            )
        })?;
        Ok(Box::new(LocalFile::new(path)))
    }
}
