//! UDisks2 backend implementation
//!
//! Lists mountable filesystems over the system bus and mounts them. Used
//! by `FileOperations::mount_volume`.

use std::collections::HashMap;
use std::sync::Arc;

use zbus::{zvariant, Connection};

use crate::cancellable::Cancellable;
use crate::error::{FileError, FileErrorKind, FileResult};
use crate::location::Location;
use crate::volume::Volume;

/// UDisks2 D-Bus service name
const UDISKS2_SERVICE: &str = "org.freedesktop.UDisks2";
/// UDisks2 manager path
const UDISKS2_MANAGER_PATH: &str = "/org/freedesktop/UDisks2/Manager";
const UDISKS2_MANAGER_IFACE: &str = "org.freedesktop.UDisks2.Manager";
const UDISKS2_BLOCK_IFACE: &str = "org.freedesktop.UDisks2.Block";
const UDISKS2_FILESYSTEM_IFACE: &str = "org.freedesktop.UDisks2.Filesystem";

type ManagedObjects = HashMap<
    zvariant::OwnedObjectPath,
    HashMap<String, HashMap<String, zvariant::OwnedValue>>,
>;

fn bus_error(context: &str, err: impl std::fmt::Display) -> FileError {
    FileError::new(FileErrorKind::Failed, format!("{}: {}", context, err))
}

/// Decodes a NUL-terminated byte array property (`ay`).
fn bytestring(value: &zvariant::Value<'_>) -> Option<String> {
    let zvariant::Value::Array(arr) = value else {
        return None;
    };
    let bytes: Vec<u8> = arr
        .iter()
        .filter_map(|b| match b {
            zvariant::Value::U8(byte) => Some(*byte),
            _ => None,
        })
        .take_while(|b| *b != 0)
        .collect();
    String::from_utf8(bytes).ok()
}

fn string_property(props: &HashMap<String, zvariant::OwnedValue>, key: &str) -> Option<String> {
    match props.get(key).map(|v| &**v) {
        Some(zvariant::Value::Str(s)) if !s.is_empty() => Some(s.to_string()),
        _ => None,
    }
}

/// UDisks2 backend for device management
pub struct UDisks2Backend {
    connection: Option<Arc<Connection>>,
}

impl UDisks2Backend {
    /// Creates a new UDisks2 backend
    pub fn new() -> Self {
        Self { connection: None }
    }

    /// Connects to UDisks2 D-Bus service
    pub async fn connect(&mut self) -> FileResult<Arc<Connection>> {
        if let Some(conn) = &self.connection {
            return Ok(conn.clone());
        }
        let connection = Connection::system()
            .await
            .map_err(|e| bus_error("Failed to connect to system D-Bus", e))?;
        let connection = Arc::new(connection);
        self.connection = Some(connection.clone());
        Ok(connection)
    }

    /// Checks if UDisks2 is available
    pub async fn is_available(&mut self) -> bool {
        let Ok(conn) = self.connect().await else {
            return false;
        };
        zbus::Proxy::new(&*conn, UDISKS2_SERVICE, UDISKS2_MANAGER_PATH, UDISKS2_MANAGER_IFACE)
            .await
            .is_ok()
    }

    /// Gets all block devices carrying a filesystem.
    pub async fn volumes(&mut self, cancellable: Option<&Cancellable>) -> FileResult<Vec<Arc<dyn Volume>>> {
        if let Some(c) = cancellable {
            c.check()?;
        }

        let conn = self.connect().await?;
        let manager = zbus::Proxy::new(
            &*conn,
            UDISKS2_SERVICE,
            "/org/freedesktop/UDisks2",
            "org.freedesktop.DBus.ObjectManager",
        )
        .await
        .map_err(|e| bus_error("Failed to get UDisks2 object manager", e))?;

        // GetManagedObjects returns: a{oa{sa{sv}}}
        let reply = manager
            .call_method("GetManagedObjects", &())
            .await
            .map_err(|e| bus_error("Failed to get managed objects", e))?;
        let objects: ManagedObjects = reply
            .body()
            .deserialize()
            .map_err(|e| bus_error("Failed to parse response", e))?;

        let mut result = Vec::new();
        for (path, interfaces) in objects {
            if !path.as_str().contains("/block_devices/") {
                continue;
            }
            let (Some(block), Some(filesystem)) = (
                interfaces.get(UDISKS2_BLOCK_IFACE),
                interfaces.get(UDISKS2_FILESYSTEM_IFACE),
            ) else {
                continue;
            };
            if let Some(c) = cancellable {
                c.check()?;
            }
            result.push(Arc::new(UDisks2Volume::from_properties(
                conn.clone(),
                path.as_str(),
                block,
                filesystem,
            )) as Arc<dyn Volume>);
        }

        Ok(result)
    }
}

impl Default for UDisks2Backend {
    fn default() -> Self {
        Self::new()
    }
}

/// UDisks2 Volume implementation
#[derive(Debug)]
pub struct UDisks2Volume {
    connection: Arc<Connection>,
    path: String,
    name: String,
    uuid: Option<String>,
    label: Option<String>,
    mount_point: Option<String>,
    device: Option<String>,
}

impl UDisks2Volume {
    fn from_properties(
        connection: Arc<Connection>,
        path: &str,
        block: &HashMap<String, zvariant::OwnedValue>,
        filesystem: &HashMap<String, zvariant::OwnedValue>,
    ) -> Self {
        let label = string_property(block, "IdLabel");
        let uuid = string_property(block, "IdUUID");
        let device = block.get("Device").and_then(|v| bytestring(v));

        // MountPoints is an array of byte arrays
        let mount_point = match filesystem.get("MountPoints").map(|v| &**v) {
            Some(zvariant::Value::Array(points)) => points.iter().find_map(bytestring),
            _ => None,
        };

        let name = label
            .clone()
            .or_else(|| uuid.clone())
            .unwrap_or_else(|| path.rsplit('/').next().unwrap_or("Unknown Volume").to_string());

        Self {
            connection,
            path: path.to_string(),
            name,
            uuid,
            label,
            mount_point,
            device,
        }
    }
}

#[async_trait::async_trait]
impl Volume for UDisks2Volume {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn icon(&self) -> String {
        match self.device.as_deref() {
            Some(d) if d.contains("sr") => "drive-optical".to_string(),
            Some(d) if d.contains("mmc") => "media-flash".to_string(),
            _ => "drive-harddisk".to_string(),
        }
    }

    fn uuid(&self) -> Option<String> {
        self.uuid.clone()
    }

    fn mount_root(&self) -> Option<Location> {
        self.mount_point.as_deref().map(Location::for_path)
    }

    fn can_mount(&self) -> bool {
        self.mount_point.is_none()
    }

    async fn mount(&self, cancellable: Option<&Cancellable>) -> FileResult<Location> {
        if let Some(c) = cancellable {
            c.check()?;
        }
        if let Some(root) = self.mount_root() {
            return Ok(root);
        }

        let path_obj = zvariant::ObjectPath::try_from(self.path.as_str())
            .map_err(|e| bus_error("Invalid object path", e))?;
        let proxy = zbus::Proxy::new(&*self.connection, UDISKS2_SERVICE, path_obj, UDISKS2_FILESYSTEM_IFACE)
            .await
            .map_err(|e| bus_error("Failed to create filesystem proxy", e))?;

        let mut options = HashMap::<String, zvariant::Value>::new();
        options.insert("auth.no_user_interaction".to_string(), true.into());

        let reply = proxy
            .call_method("Mount", &(options))
            .await
            .map_err(|e| bus_error("Failed to mount volume", e))?;
        let mount_path: String = reply
            .body()
            .deserialize()
            .map_err(|e| bus_error("Failed to parse mount reply", e))?;

        log::info!("mounted {} at {}", self.name, mount_path);
        Ok(Location::for_path(mount_path))
    }

    fn identifier(&self, kind: &str) -> Option<String> {
        match kind {
            "uuid" => self.uuid.clone(),
            "label" => self.label.clone(),
            "unix-device" => self.device.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytestring_stops_at_nul() {
        let value = zvariant::Value::from(b"/dev/sdb1\0\0".to_vec());
        assert_eq!(bytestring(&value).as_deref(), Some("/dev/sdb1"));
        assert_eq!(bytestring(&zvariant::Value::from("text")), None);
    }
}
