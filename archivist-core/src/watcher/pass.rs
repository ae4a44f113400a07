use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::reconciler::{WatchOutcome, WatchReconciler};
use crate::error::Result;
use crate::sync::{DiskSyncEngine, SyncLogEntry, SyncResult};
use crate::vault::{is_disk_locator, is_image_path};

/// Counts from one [`ReconcilePass`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Records whose source was corrected to the vault holding the file.
    pub updated: usize,
    /// Records deleted because their file is gone.
    pub orphaned: usize,
    /// Untracked files adopted by a rescan.
    pub imported: usize,
}

/// Startup sweep between the store and the disk.
///
/// Records whose file no longer exists are deleted outright. This bypasses
/// undo history since there is nothing left to back up. Records whose
/// locator falls outside every authorised root are left alone.
pub struct ReconcilePass {
    reconciler: Arc<WatchReconciler>,
}

impl fmt::Debug for ReconcilePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconcilePass").finish_non_exhaustive()
    }
}

impl ReconcilePass {
    pub fn new(reconciler: Arc<WatchReconciler>) -> Self {
        Self { reconciler }
    }

    fn engine(&self) -> &DiskSyncEngine {
        self.reconciler.engine()
    }

    /// Sweep orphans; with `rescan`, also import untracked images found
    /// directly inside each vault root.
    pub async fn run(&self, rescan: bool) -> Result<ReconcileSummary> {
        let started = Instant::now();
        let engine = self.engine();
        let store = engine.store();
        let provider = engine.provider();
        let layout = engine.layout().await?;
        let mut summary = ReconcileSummary::default();

        for mut record in store.list_images().await? {
            let Some(locator) = record.locator().filter(|src| is_disk_locator(src)) else {
                continue;
            };
            let path = match provider.real_path(locator).await {
                Ok(path) => path,
                Err(err) => {
                    debug!(id = %record.id, locator, error = %err, "reconcile skipped record");
                    continue;
                }
            };

            if !provider.exists(&path).await {
                store.delete_image(&record.id).await?;
                summary.orphaned += 1;
                engine.log().record(
                    SyncLogEntry::new("reconcile", &record.id, SyncResult::Ok)
                        .with_path(&path)
                        .with_reason("orphan_removed"),
                );
                continue;
            }

            if let Some(owner) = layout.roots.owner_of(&path)
                && owner != record.source_id
            {
                engine.log().record(
                    SyncLogEntry::new("reconcile", &record.id, SyncResult::Ok)
                        .with_path(&path)
                        .with_reason(format!("source {} -> {owner}", record.source_id)),
                );
                record.source_id = owner;
                store.put_image(record).await?;
                summary.updated += 1;
            }
        }

        if rescan {
            for (source, root) in layout.roots.iter() {
                let entries = match provider.read_dir(root).await {
                    Ok(entries) => entries,
                    Err(err) => {
                        warn!(source = %source, root = %root.display(), error = %err, "rescan could not list vault");
                        continue;
                    }
                };
                for path in entries.iter().filter(|path| is_image_path(path)) {
                    let hidden = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| name.starts_with('.'));
                    if hidden {
                        continue;
                    }
                    match self.reconciler.handle_new_image(path).await {
                        Ok(WatchOutcome::Imported(_)) => summary.imported += 1,
                        Ok(_) => {}
                        Err(err) => debug!(path = %path.display(), error = %err, "rescan skipped file"),
                    }
                }
            }
        }

        info!(
            updated = summary.updated,
            orphaned = summary.orphaned,
            imported = summary.imported,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reconciliation pass complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use archivist_model::{ImageRecord, LibrarySource, SourceId};
    use std::path::PathBuf;

    use super::*;
    use crate::config::EngineConfig;
    use crate::event_gate::EventGate;
    use crate::provider::{FsProvider, InMemoryProvider};
    use crate::store::{InMemoryStore, LibraryStore};
    use crate::toast::NoopNotifier;

    fn pass() -> (ReconcilePass, Arc<InMemoryProvider>, Arc<InMemoryStore>) {
        let fs = Arc::new(InMemoryProvider::with_vault("/vault"));
        let store = Arc::new(InMemoryStore::new());
        let engine = Arc::new(DiskSyncEngine::new(
            fs.clone(),
            store.clone(),
            Arc::new(EventGate::default()),
            Arc::new(NoopNotifier),
            EngineConfig::default(),
        ));
        let reconciler = Arc::new(WatchReconciler::new(engine));
        (ReconcilePass::new(reconciler), fs, store)
    }

    #[tokio::test]
    async fn removes_orphans_and_keeps_present_files() {
        let (pass, fs, store) = pass();
        fs.insert_file("/vault/kept.png", b"k".to_vec());
        let kept = ImageRecord::new("kept").with_src("file:///vault/kept.png");
        let gone = ImageRecord::new("gone").with_src("file:///vault/gone.png");
        let memory = ImageRecord::new("memory");
        store
            .put_images(vec![kept.clone(), gone.clone(), memory.clone()])
            .await
            .unwrap();

        let summary = pass.run(false).await.unwrap();
        assert_eq!(summary.orphaned, 1);
        assert!(store.get_image(&kept.id).await.unwrap().is_some());
        assert!(store.get_image(&gone.id).await.unwrap().is_none());
        assert!(store.get_image(&memory.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn corrects_sources_and_rescans_linked_folders() {
        let (pass, fs, store) = pass();
        let linked = LibrarySource::local_folder("Pictures", PathBuf::from("/pics"));
        fs.allow_list().add_root(std::path::Path::new("/pics"));
        store.put_source(linked.clone()).await.unwrap();

        fs.insert_file("/pics/tracked.png", b"t".to_vec());
        fs.insert_file("/pics/new.png", b"n".to_vec());
        fs.insert_file("/pics/readme.txt", b"r".to_vec());
        let tracked = ImageRecord::new("tracked")
            .with_src("file:///pics/tracked.png")
            .with_source(SourceId::internal());
        store.put_image(tracked.clone()).await.unwrap();

        let summary = pass.run(true).await.unwrap();
        assert_eq!(
            summary,
            ReconcileSummary {
                updated: 1,
                orphaned: 0,
                imported: 1
            }
        );
        let stored = store.get_image(&tracked.id).await.unwrap().unwrap();
        assert_eq!(stored.source_id, linked.id);
        assert!(fs.exists(std::path::Path::new("/pics/new.json")).await);
    }
}
