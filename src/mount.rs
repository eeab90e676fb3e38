use std::sync::Arc;

use async_trait::async_trait;

use crate::cancellable::Cancellable;
use crate::error::{FileError, FileErrorKind, FileResult};
use crate::location::Location;

/// A mounted filesystem.
#[async_trait]
pub trait Mount: Send + Sync + std::fmt::Debug {
    /// Gets the root location of this mount.
    fn root(&self) -> Location;

    /// Gets the name of the mount.
    fn name(&self) -> String;

    /// Gets the icon name for the mount.
    fn icon(&self) -> String;

    /// Checks if the mount can be unmounted.
    fn can_unmount(&self) -> bool;

    async fn unmount(&self, cancellable: Option<&Cancellable>) -> FileResult<()>;
}

/// Resolves and mounts the filesystems behind locations.
///
/// The file cache consults it when a query fails with `NotMounted` and when
/// a record asks for its MOUNT attribute.
#[async_trait]
pub trait Mounter: Send + Sync {
    /// The mount whose root is `location` or one of its ancestors.
    async fn find_enclosing_mount(
        &self,
        location: &Location,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Option<Arc<dyn Mount>>>;

    /// Mounts the volume `location` lives on.
    async fn mount_enclosing_volume(
        &self,
        location: &Location,
        _cancellable: Option<&Cancellable>,
    ) -> FileResult<()> {
        Err(FileError::new(
            FileErrorKind::NotSupported,
            format!("Cannot mount the volume for {}", location),
        ))
    }
}
