use async_trait::async_trait;

use crate::cancellable::Cancellable;
use crate::error::FileResult;
use crate::location::Location;

#[async_trait]
pub trait Volume: Send + Sync + std::fmt::Debug {
    /// Gets the name of the volume.
    fn name(&self) -> String;

    /// Gets the icon name for the volume.
    fn icon(&self) -> String;

    /// Gets the UUID of the volume.
    fn uuid(&self) -> Option<String>;

    /// Where the volume is mounted, if it is.
    fn mount_root(&self) -> Option<Location>;

    /// Checks if the volume can be mounted.
    fn can_mount(&self) -> bool;

    /// Mounts the volume and returns its mount root.
    async fn mount(&self, cancellable: Option<&Cancellable>) -> FileResult<Location>;

    /// Gets an identifier of the given kind.
    /// Common kinds: "unix-device", "label", "uuid"
    fn identifier(&self, kind: &str) -> Option<String>;
}
