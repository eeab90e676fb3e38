use async_trait::async_trait;

use crate::cancellable::Cancellable;
use crate::error::FileResult;
use crate::file_info::FileInfo;
use crate::location::Location;

#[async_trait]
pub trait FileEnumerator: Send + Sync {
    /// Returns the next child with its info, `Ok(None)` once exhausted.
    async fn next_file(
        &mut self,
        cancellable: Option<&Cancellable>,
    ) -> FileResult<Option<(FileInfo, Location)>>;

    async fn close(&mut self, cancellable: Option<&Cancellable>) -> FileResult<()>;
}
