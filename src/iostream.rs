use tokio::io::{AsyncRead, AsyncWrite};

use crate::cancellable::Cancellable;
use crate::error::FileResult;

/// Source of bytes returned by `File::read`.
pub trait InputStream: AsyncRead + Send + Unpin {
    fn close(&mut self, cancellable: Option<&Cancellable>) -> FileResult<()>;
}

/// Sink of bytes returned by `File::create_file` and `File::replace`.
pub trait OutputStream: AsyncWrite + Send + Unpin {
    fn close(&mut self, cancellable: Option<&Cancellable>) -> FileResult<()>;
}

impl InputStream for Box<dyn InputStream> {
    fn close(&mut self, cancellable: Option<&Cancellable>) -> FileResult<()> {
        (**self).close(cancellable)
    }
}

impl OutputStream for Box<dyn OutputStream> {
    fn close(&mut self, cancellable: Option<&Cancellable>) -> FileResult<()> {
        (**self).close(cancellable)
    }
}
