//! Filesystem watching and startup reconciliation.
//!
//! [`VaultWatcher`] subscribes to every vault root through the provider and
//! hands settled events to the [`WatchReconciler`]. Changes that touch the
//! library poke the [`RefreshDebouncer`]. [`ReconcilePass`] covers what
//! happened while nothing was watching.

pub mod debouncer;
pub mod pass;
pub mod reconciler;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub use debouncer::RefreshDebouncer;
pub use pass::{ReconcilePass, ReconcileSummary};
pub use reconciler::{SkipReason, WatchOutcome, WatchReconciler};

use crate::error::Result;
use crate::provider::FsProvider;
use crate::vault::path_key;

/// One watch task per vault root.
pub struct VaultWatcher {
    provider: Arc<dyn FsProvider>,
    reconciler: Arc<WatchReconciler>,
    debouncer: Arc<RefreshDebouncer>,
    tasks: Mutex<HashMap<String, (PathBuf, JoinHandle<()>)>>,
}

impl fmt::Debug for VaultWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultWatcher")
            .field("roots", &self.roots())
            .finish()
    }
}

impl VaultWatcher {
    pub fn new(
        provider: Arc<dyn FsProvider>,
        reconciler: Arc<WatchReconciler>,
        debouncer: Arc<RefreshDebouncer>,
    ) -> Self {
        Self {
            provider,
            reconciler,
            debouncer,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start watching `root`. Watching a root twice is a no-op.
    pub async fn watch(&self, root: &Path) -> Result<()> {
        let key = path_key(root);
        if self.tasks.lock().contains_key(&key) {
            return Ok(());
        }

        let mut subscription = self.provider.watch_directory(root).await?;
        let reconciler = Arc::clone(&self.reconciler);
        let debouncer = Arc::clone(&self.debouncer);
        let watched = subscription.root.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                let outcome = reconciler.handle_event(&event).await;
                if outcome.wants_refresh() {
                    debouncer.poke();
                }
            }
            debug!(root = %subscription.root.display(), "watch stream ended");
        });

        info!(root = %watched.display(), "watching vault");
        if let Some((_, previous)) = self.tasks.lock().insert(key, (watched, task)) {
            previous.abort();
        }
        Ok(())
    }

    pub fn unwatch(&self, root: &Path) {
        if let Some((path, task)) = self.tasks.lock().remove(&path_key(root)) {
            task.abort();
            info!(root = %path.display(), "stopped watching vault");
        }
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self
            .tasks
            .lock()
            .values()
            .map(|(path, _)| path.clone())
            .collect();
        roots.sort();
        roots
    }

    pub fn shutdown(&self) {
        for (_, (_, task)) in self.tasks.lock().drain() {
            task.abort();
        }
    }
}

impl Drop for VaultWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
