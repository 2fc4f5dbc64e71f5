//! Deferred artifact deletion.
//!
//! Response paths hand artifacts to the [`Janitor`] and move on; deletions
//! run on their own tasks after a bounded delay and never fail a response.
//! The sweeper bounds how long an unclaimed output can sit on disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::{ArtifactStore, delete_file};

#[derive(Debug, Clone)]
pub struct Janitor {
    store: ArtifactStore,
    pending: Arc<AtomicUsize>,
}

impl Janitor {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Delete `path` after `delay`.
    ///
    /// The returned handle exists for tests; request handlers drop it.
    pub fn schedule(&self, path: PathBuf, delay: Duration) -> JoinHandle<()> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let pending = Arc::clone(&self.pending);
        debug!(path = %path.display(), delay_ms = delay.as_millis() as u64, "artifact deletion scheduled");

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match delete_file(&path).await {
                Ok(true) => debug!(path = %path.display(), "artifact deleted"),
                Ok(false) => debug!(path = %path.display(), "artifact already gone"),
                Err(e) => warn!(path = %path.display(), error = %e, "deferred artifact deletion failed"),
            }
            pending.fetch_sub(1, Ordering::SeqCst);
        })
    }

    /// Number of scheduled deletions that have not run yet.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Run one retention sweep now.
    pub async fn sweep(&self, max_age: Duration) -> usize {
        match self.store.sweep(max_age).await {
            Ok(0) => 0,
            Ok(n) => {
                info!(removed = n, max_age_secs = max_age.as_secs(), "retention sweep reclaimed artifacts");
                n
            }
            Err(e) => {
                warn!(error = %e, "retention sweep failed");
                0
            }
        }
    }

    /// Sweep immediately, then every `interval`, for the life of the runtime.
    pub fn spawn_sweeper(&self, max_age: Duration, interval: Duration) -> JoinHandle<()> {
        let janitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                janitor.sweep(max_age).await;
            }
        })
    }
}
