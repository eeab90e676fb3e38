use tokio::sync::mpsc;

use crate::cancellable::Cancellable;
use crate::location::Location;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMonitorEvent {
    Changed(Location),
    Deleted(Location),
    Created(Location),
    AttributeChanged(Location),
    /// Source, destination.
    Moved(Location, Location),
}

/// Stream of change events for one watched location. Dropping the monitor
/// stops the underlying watcher.
pub struct FileMonitor {
    receiver: mpsc::Receiver<FileMonitorEvent>,
    cancellable: Option<Cancellable>,
    _watcher: Option<Box<dyn std::any::Any + Send + Sync>>,
}

impl FileMonitor {
    pub fn new(
        receiver: mpsc::Receiver<FileMonitorEvent>,
        cancellable: Option<Cancellable>,
        watcher: Option<Box<dyn std::any::Any + Send + Sync>>,
    ) -> Self {
        Self {
            receiver,
            cancellable,
            _watcher: watcher,
        }
    }

    /// Next event, or `None` once the watcher is gone or the monitor was
    /// cancelled.
    pub async fn next_event(&mut self) -> Option<FileMonitorEvent> {
        match &self.cancellable {
            Some(c) => {
                tokio::select! {
                    _ = c.cancelled() => None,
                    event = self.receiver.recv() => event,
                }
            }
            None => self.receiver.recv().await,
        }
    }
}
