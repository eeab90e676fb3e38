use std::fmt;
use std::io;

use crate::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileErrorKind {
    NotFound,
    Exists,
    IsDirectory,
    NotDirectory,
    NotEmpty,
    NotSupported,
    NotMounted,
    PermissionDenied,
    InvalidArg,
    Cancelled,
    HostNotFound,
    TimedOut,
    NoSpace,
    Failed,
    Other,
}

#[derive(Debug)]
pub struct FileError {
    kind: FileErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FileError {
    pub fn new(kind: FileErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: FileErrorKind,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FileErrorKind::Cancelled, "Operation was cancelled")
    }

    pub fn kind(&self) -> FileErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == FileErrorKind::Cancelled
    }

    /// Copy of kind and message without the boxed source.
    pub fn shallow_clone(&self) -> Self {
        Self::new(self.kind, self.message.clone())
    }
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &dyn std::error::Error)
    }
}

impl From<io::Error> for FileError {
    fn from(err: io::Error) -> Self {
        let kind = match err.raw_os_error() {
            Some(libc::ENOTDIR) => FileErrorKind::NotDirectory,
            Some(libc::EISDIR) => FileErrorKind::IsDirectory,
            Some(libc::ENOTEMPTY) => FileErrorKind::NotEmpty,
            Some(libc::ENOSPC) => FileErrorKind::NoSpace,
            Some(libc::EXDEV) => FileErrorKind::NotSupported,
            Some(libc::EHOSTUNREACH) => FileErrorKind::HostNotFound,
            _ => match err.kind() {
                io::ErrorKind::NotFound => FileErrorKind::NotFound,
                io::ErrorKind::PermissionDenied => FileErrorKind::PermissionDenied,
                io::ErrorKind::AlreadyExists => FileErrorKind::Exists,
                io::ErrorKind::InvalidInput => FileErrorKind::InvalidArg,
                io::ErrorKind::TimedOut => FileErrorKind::TimedOut,
                io::ErrorKind::Unsupported => FileErrorKind::NotSupported,
                _ => FileErrorKind::Failed,
            },
        };

        Self::with_source(kind, err.to_string(), Box::new(err))
    }
}

impl From<notify::Error> for FileError {
    fn from(err: notify::Error) -> Self {
        Self::with_source(FileErrorKind::Failed, err.to_string(), Box::new(err))
    }
}

impl From<zbus::Error> for FileError {
    fn from(err: zbus::Error) -> Self {
        Self::with_source(FileErrorKind::Failed, err.to_string(), Box::new(err))
    }
}

pub type FileResult<T> = Result<T, FileError>;

/// User-facing text for a location that could not be displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadErrorMessage {
    pub primary: String,
    pub detail: String,
}

/// Picks the message shown when `location` cannot be opened.
///
/// Returns `None` for cancellation, which is never reported.
pub fn describe_load_error(error: &FileError, location: &Location) -> Option<LoadErrorMessage> {
    let mut primary = "Oops! Something went wrong.".to_string();
    let detail = match error.kind() {
        FileErrorKind::Cancelled => return None,
        FileErrorKind::NotFound => {
            primary = "Unable to find the requested file. Please check the spelling and try again."
                .to_string();
            None
        }
        FileErrorKind::NotSupported => Some(match location.scheme() {
            "" => "Unable to handle this kind of location.".to_string(),
            scheme => format!("\u{201c}{}\u{201d} locations are not supported.", scheme),
        }),
        FileErrorKind::NotMounted => Some("Unable to access the requested location.".to_string()),
        FileErrorKind::PermissionDenied => {
            Some("Don't have permission to access the requested location.".to_string())
        }
        FileErrorKind::HostNotFound => Some(
            "Unable to find the requested location. Please check the spelling or the network settings."
                .to_string(),
        ),
        _ => None,
    };

    Some(LoadErrorMessage {
        primary,
        detail: detail.unwrap_or_else(|| format!("Unhandled error message: {}", error.message())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_kinds() {
        let err: FileError = io::Error::from(io::ErrorKind::NotFound).into();
        assert_eq!(err.kind(), FileErrorKind::NotFound);

        let err: FileError = io::Error::from_raw_os_error(libc::ENOTEMPTY).into();
        assert_eq!(err.kind(), FileErrorKind::NotEmpty);

        let err: FileError = io::Error::from_raw_os_error(libc::EACCES).into();
        assert_eq!(err.kind(), FileErrorKind::PermissionDenied);
    }

    #[test]
    fn load_error_messages_by_kind() {
        let location = Location::parse("sftp://host/dir").expect("valid uri");

        let msg = describe_load_error(
            &FileError::new(FileErrorKind::NotSupported, "nope"),
            &location,
        )
        .expect("message");
        assert_eq!(msg.detail, "\u{201c}sftp\u{201d} locations are not supported.");

        let msg = describe_load_error(
            &FileError::new(FileErrorKind::PermissionDenied, "denied"),
            &location,
        )
        .expect("message");
        assert_eq!(msg.detail, "Don't have permission to access the requested location.");

        let msg = describe_load_error(&FileError::new(FileErrorKind::Exists, "boom"), &location)
            .expect("message");
        assert_eq!(msg.detail, "Unhandled error message: boom");

        assert!(describe_load_error(&FileError::cancelled(), &location).is_none());
    }
}
