//! Session bus service
//!
//! Exposes a small set of file operations to other applications under
//! `org.gnome.Nautilus.FileOperations`. Every method returns as soon as the
//! operation is started; failures are logged, not returned.

use zbus::{connection, fdo, interface, Connection};

use crate::error::FileResult;
use crate::job::FileOperations;
use crate::location::Location;

pub const SERVICE_NAME: &str = "org.gnome.Nautilus";
pub const OBJECT_PATH: &str = "/org/gnome/Nautilus";

fn parse_location(uri: &str) -> fdo::Result<Location> {
    Location::parse(uri).map_err(|e| fdo::Error::InvalidArgs(e.to_string()))
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

pub struct FileOperationsService {
    ops: FileOperations,
}

impl FileOperationsService {
    pub fn new(ops: FileOperations) -> Self {
        Self { ops }
    }
}

#[interface(name = "org.gnome.Nautilus.FileOperations")]
impl FileOperationsService {
    #[zbus(name = "CopyURIs")]
    fn copy_uris(&self, sources: Vec<String>, destination: String) -> fdo::Result<()> {
        let sources = sources
            .iter()
            .map(|uri| parse_location(uri))
            .collect::<fdo::Result<Vec<_>>>()?;
        let destination = parse_location(&destination)?;
        let ops = self.ops.clone();
        tokio::spawn(async move {
            if let Err(e) = ops.copy(&sources, &destination, None).await {
                log::warn!("CopyURIs to {} failed: {}", destination, e);
            }
        });
        Ok(())
    }

    #[zbus(name = "CopyFile")]
    fn copy_file(
        &self,
        source_uri: String,
        source_display_name: String,
        dest_dir_uri: String,
        dest_name: String,
    ) -> fdo::Result<()> {
        let source = parse_location(&source_uri)?;
        let dest_dir = parse_location(&dest_dir_uri)?;
        let ops = self.ops.clone();
        tokio::spawn(async move {
            let result = ops
                .copy_file(
                    &source,
                    non_empty(&source_display_name),
                    &dest_dir,
                    non_empty(&dest_name),
                    None,
                )
                .await;
            if let Err(e) = result {
                log::warn!("CopyFile of {} failed: {}", source, e);
            }
        });
        Ok(())
    }

    #[zbus(name = "EmptyTrash")]
    fn empty_trash(&self) {
        let ops = self.ops.clone();
        tokio::spawn(async move {
            if let Err(e) = ops.empty_trash(None).await {
                log::warn!("EmptyTrash failed: {}", e);
            }
        });
    }
}

/// Owns [`SERVICE_NAME`] on the session bus and serves `ops` until the
/// returned connection is dropped.
pub async fn serve(ops: FileOperations) -> FileResult<Connection> {
    let connection = connection::Builder::session()?
        .name(SERVICE_NAME)?
        .serve_at(OBJECT_PATH, FileOperationsService::new(ops))?
        .build()
        .await?;
    log::info!("serving {} at {}", SERVICE_NAME, OBJECT_PATH);
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_uris_are_invalid_args() {
        assert!(matches!(parse_location("not a uri"), Err(fdo::Error::InvalidArgs(_))));
        assert_eq!(
            parse_location("file:///tmp/a%20b").map(|l| l.path().to_string()).ok(),
            Some("/tmp/a b".to_string())
        );
    }

    #[test]
    fn empty_names_are_absent() {
        assert_eq!(non_empty(""), None);
        assert_eq!(non_empty("x"), Some("x"));
    }
}
