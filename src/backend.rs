pub mod local;
pub mod mount;
pub mod udisks2;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{FileError, FileErrorKind, FileResult};
use crate::file::File;
use crate::location::Location;

/// Trait that all backends must implement.
/// A backend handles a specific URI scheme (e.g., "file://", "sftp://").
pub trait Backend: Send + Sync {
    fn scheme(&self) -> &'static str;

    fn file_for_location(&self, location: &Location) -> FileResult<Box<dyn File>>;
}

/// Scheme to backend table. Each `FileCache` owns one.
#[derive(Clone)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// A registry with the local `file` backend registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(local::LocalBackend::new()));
        registry
    }

    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.scheme().to_string(), backend);
    }

    pub fn get_backend(&self, scheme: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(scheme).cloned()
    }

    pub fn file_for_location(&self, location: &Location) -> FileResult<Box<dyn File>> {
        match self.get_backend(location.scheme()) {
            Some(backend) => backend.file_for_location(location),
            None => Err(FileError::new(
                FileErrorKind::NotSupported,
                format!("No backend found for scheme: {}", location.scheme()),
            )),
        }
    }

    pub fn file_for_uri(&self, uri: &str) -> FileResult<Box<dyn File>> {
        self.file_for_location(&Location::parse(uri)?)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
