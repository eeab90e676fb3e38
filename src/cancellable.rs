use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::error::{FileError, FileResult};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Cancellation token shared between an operation and whoever may abort it.
///
/// Clones refer to the same token; `id` tells tokens apart when they are
/// tracked in lists.
#[derive(Clone, Debug)]
pub struct Cancellable {
    inner: Arc<CancellableInner>,
}

#[derive(Debug)]
struct CancellableInner {
    id: u64,
    cancelled: Mutex<bool>,
    notify: Notify,
}

impl Cancellable {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellableInner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                cancelled: Mutex::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        match self.inner.cancelled.lock() {
            Ok(guard) => guard,
            Err(e) => {
                log::warn!("recovering poisoned cancellable state: {}", e);
                e.into_inner()
            }
        }
    }

    pub fn cancel(&self) {
        let mut cancelled = self.state();
        if !*cancelled {
            *cancelled = true;
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state()
    }

    pub fn check(&self) -> FileResult<()> {
        if self.is_cancelled() {
            Err(FileError::cancelled())
        } else {
            Ok(())
        }
    }

    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for Cancellable {
    fn default() -> Self {
        Self::new()
    }
}

