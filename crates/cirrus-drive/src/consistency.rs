//! Gate for eventually-consistent folder visibility.
//!
//! A folder created a moment ago may not yet be visible to the lookup index
//! behind other endpoints, which then 404. `track` records the creation
//! instant; `await_folder` blocks follow-up calls for whatever remains of
//! the window. Entries self-evict, keeping the map bounded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use cirrus_core::error::Result;
use cirrus_core::sleep_cancellable;

#[derive(Debug, Clone)]
pub struct ConsistencyTracker {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    window: Duration,
    recent: Mutex<HashMap<String, Instant>>,
}

impl ConsistencyTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                window,
                recent: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Record that a folder was just created. The entry self-deletes after
    /// the window elapses.
    pub fn track(&self, folder_uuid: &str) {
        let created = Instant::now();
        self.inner
            .recent
            .lock()
            .expect("consistency map lock poisoned")
            .insert(folder_uuid.to_string(), created);

        let inner = Arc::clone(&self.inner);
        let uuid = folder_uuid.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(inner.window).await;
            let mut recent = inner.recent.lock().expect("consistency map lock poisoned");
            // only evict our own entry; the folder may have been re-tracked
            if recent.get(&uuid) == Some(&created) {
                recent.remove(&uuid);
            }
        });
    }

    /// Block until the consistency window has elapsed for a recently created
    /// folder. Returns immediately for unknown or already-consistent folders.
    pub async fn await_folder(&self, cancel: &CancellationToken, folder_uuid: &str) -> Result<()> {
        let remaining = {
            let recent = self
                .inner
                .recent
                .lock()
                .expect("consistency map lock poisoned");
            match recent.get(folder_uuid) {
                Some(created) => self.inner.window.saturating_sub(created.elapsed()),
                None => return Ok(()),
            }
        };

        if remaining.is_zero() {
            return Ok(());
        }
        sleep_cancellable(cancel, remaining).await
    }

    /// Whether the folder is currently inside its consistency window.
    pub fn is_tracked(&self, folder_uuid: &str) -> bool {
        self.inner
            .recent
            .lock()
            .expect("consistency map lock poisoned")
            .contains_key(folder_uuid)
    }
}
