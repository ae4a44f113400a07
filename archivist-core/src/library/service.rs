use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use archivist_model::{
    DeletedImage, GeneralSettings, HistoryAction, ImageBlob, ImageId, ImagePatch, ImageRecord,
    LibrarySource, PatchedImage, SourceId,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::rename::RenamePattern;
use super::{LibrarySnapshot, RefreshSink};
use crate::config::LibraryConfig;
use crate::error::{ArchiveError, Result};
use crate::hashing::content_hash;
use crate::history::{HistoryCoordinator, HistoryStep};
use crate::store::LibraryStore;
use crate::sync::DiskSyncEngine;
use crate::toast::Toast;
use crate::vault::{VaultRoots, path_key};
use crate::watcher::VaultWatcher;

/// What happens to a removed source's images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRemoval {
    /// Delete the records. Files on disk are left alone.
    DeleteImages,
    /// Hand the records to the internal vault.
    Reassign,
}

struct UpdateClaim<'a> {
    updating: &'a Mutex<HashSet<ImageId>>,
    id: ImageId,
}

impl Drop for UpdateClaim<'_> {
    fn drop(&mut self) {
        self.updating.lock().remove(&self.id);
    }
}

/// Library operations with disk sync, history and refresh wired in.
pub struct LibraryService {
    engine: Arc<DiskSyncEngine>,
    history: Arc<HistoryCoordinator>,
    config: LibraryConfig,
    watcher: Mutex<Weak<VaultWatcher>>,
    updating: Mutex<HashSet<ImageId>>,
    last_refresh: Mutex<Option<(Instant, LibrarySnapshot)>>,
}

impl fmt::Debug for LibraryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryService")
            .field("history", &self.history)
            .field("config", &self.config)
            .field("updating", &self.updating.lock().len())
            .finish()
    }
}

impl LibraryService {
    pub fn new(
        engine: Arc<DiskSyncEngine>,
        history: Arc<HistoryCoordinator>,
        config: LibraryConfig,
    ) -> Self {
        Self {
            engine,
            history,
            config,
            watcher: Mutex::new(Weak::new()),
            updating: Mutex::new(HashSet::new()),
            last_refresh: Mutex::new(None),
        }
    }

    /// Start and stop watches as folders are linked and unlinked.
    pub fn attach_watcher(&self, watcher: &Arc<VaultWatcher>) {
        *self.watcher.lock() = Arc::downgrade(watcher);
    }

    pub fn engine(&self) -> &Arc<DiskSyncEngine> {
        &self.engine
    }

    pub fn history(&self) -> &Arc<HistoryCoordinator> {
        &self.history
    }

    fn store(&self) -> &Arc<dyn LibraryStore> {
        self.engine.store()
    }

    fn toast(&self, toast: Toast) {
        self.engine.notifier().notify(toast);
    }

    fn watcher(&self) -> Option<Arc<VaultWatcher>> {
        self.watcher.lock().upgrade()
    }

    fn claim(&self, id: &ImageId) -> Option<UpdateClaim<'_>> {
        if !self.updating.lock().insert(id.clone()) {
            return None;
        }
        Some(UpdateClaim {
            updating: &self.updating,
            id: id.clone(),
        })
    }

    async fn refresh_quietly(&self) {
        if let Err(err) = self.refresh(false).await {
            warn!(error = %err, "library refresh failed");
        }
    }

    pub async fn get_image(&self, id: &ImageId) -> Result<Option<ImageRecord>> {
        self.store().get_image(id).await
    }

    /// Apply `patch` to a record and bring the disk in line.
    ///
    /// Returns `None` when the record does not exist or another update for
    /// the same id is still running.
    pub async fn update_image(
        &self,
        id: &ImageId,
        patch: ImagePatch,
        record_history: bool,
    ) -> Result<Option<ImageRecord>> {
        let Some(_claim) = self.claim(id) else {
            debug!(id = %id, "update already in progress; ignoring");
            return Ok(None);
        };
        let Some(prior) = self.store().get_image(id).await? else {
            return Ok(None);
        };

        let changes = patch.without_noops(&prior);
        if changes.is_empty() {
            return Ok(Some(prior));
        }
        self.store().update_image(id, &changes).await?;
        let record = self.engine.reconcile(id, &prior).await;

        // Only what survived reconcile is undoable; a reverted move is not.
        let landed = changes.inverse(&record).without_noops(&prior);
        if record_history && !landed.is_empty() {
            self.history.push(HistoryAction::Update(PatchedImage {
                id: id.clone(),
                revert: landed.inverse(&prior),
                changes: landed,
            }));
        }
        self.refresh_quietly().await;
        Ok(Some(record))
    }

    /// New in-memory image, written to its vault straight away.
    pub async fn create_image(
        &self,
        bytes: Vec<u8>,
        mime: &str,
        title: impl Into<String>,
    ) -> Result<ImageRecord> {
        let mut record = ImageRecord::new(title).with_blob(ImageBlob::new(bytes, mime));
        record.hash = record.blob.as_ref().map(|blob| content_hash(&blob.bytes));
        self.store().put_image(record.clone()).await?;

        let saved = self.engine.reconcile(&record.id, &record).await;
        if saved.src.is_some() {
            self.toast(Toast::success("Image saved to vault"));
        }
        self.refresh_quietly().await;
        Ok(saved)
    }

    async fn remove_one(&self, record: &ImageRecord, force: bool) -> Result<DeletedImage> {
        let disk = match self.engine.delete_from_disk(record, force).await {
            Ok(disk) => disk,
            Err(err) => {
                self.toast(Toast::error(
                    "Could not delete file from disk (might be in use).",
                ));
                return Err(err);
            }
        };
        self.store().delete_image(&record.id).await?;
        Ok(DeletedImage {
            record: record.clone(),
            backup: disk.backup().cloned(),
        })
    }

    /// Delete a record, trashing its file when the settings allow it.
    ///
    /// The row stays when the file could not be trashed.
    pub async fn delete_image(&self, id: &ImageId, force: bool) -> Result<bool> {
        let Some(record) = self.store().get_image(id).await? else {
            return Ok(false);
        };
        let deleted = self.remove_one(&record, force).await?;
        self.history.push(HistoryAction::Delete(deleted));
        self.toast(Toast::info("Image removed."));
        self.refresh_quietly().await;
        Ok(true)
    }

    /// Delete several records as one undoable step. Records whose file
    /// could not be trashed are kept and left out of the step.
    pub async fn batch_delete(&self, ids: &[ImageId], force: bool) -> Result<usize> {
        let mut deleted = Vec::new();
        for id in ids {
            let Some(record) = self.store().get_image(id).await? else {
                continue;
            };
            match self.remove_one(&record, force).await {
                Ok(item) => deleted.push(item),
                Err(err) => warn!(id = %id, error = %err, "batch delete kept record"),
            }
        }
        let count = deleted.len();
        if count > 0 {
            self.history.push(HistoryAction::BatchDelete(deleted));
            self.toast(Toast::success(format!("{count} items removed.")));
            self.refresh_quietly().await;
        }
        Ok(count)
    }

    /// Apply several patches as one undoable step.
    pub async fn batch_update(&self, items: Vec<(ImageId, ImagePatch)>) -> Result<usize> {
        let mut applied = Vec::new();
        for (id, patch) in items {
            let Some(_claim) = self.claim(&id) else {
                debug!(id = %id, "update already in progress; skipped in batch");
                continue;
            };
            let Some(prior) = self.store().get_image(&id).await? else {
                continue;
            };
            let changes = patch.without_noops(&prior);
            if changes.is_empty() {
                continue;
            }
            self.store().update_image(&id, &changes).await?;
            let record = self.engine.reconcile(&id, &prior).await;
            let landed = changes.inverse(&record).without_noops(&prior);
            if landed.is_empty() {
                continue;
            }
            applied.push(PatchedImage {
                id,
                revert: landed.inverse(&prior),
                changes: landed,
            });
        }

        let count = applied.len();
        if count > 0 {
            self.history.push(HistoryAction::BatchUpdate(applied));
            self.refresh_quietly().await;
        }
        Ok(count)
    }

    /// Retitle records with `pattern`, numbering them in the order given.
    pub async fn batch_rename(&self, ids: &[ImageId], pattern: RenamePattern) -> Result<usize> {
        let mut items = Vec::new();
        let mut index = 0;
        for id in ids {
            let Some(record) = self.store().get_image(id).await? else {
                continue;
            };
            let title = pattern.title_for(&record, index);
            index += 1;
            if title != record.title {
                items.push((id.clone(), ImagePatch::title(title)));
            }
        }
        if items.is_empty() {
            return Ok(0);
        }

        self.toast(Toast::info(format!("Renaming {} items...", items.len())));
        let renamed = self.batch_update(items).await?;
        self.toast(Toast::success(format!("Successfully renamed {renamed} items.")));
        Ok(renamed)
    }

    pub async fn undo(&self) -> Result<HistoryStep> {
        let step = self.history.undo().await?;
        if matches!(step, HistoryStep::Applied(_)) {
            self.refresh_quietly().await;
        }
        Ok(step)
    }

    pub async fn redo(&self) -> Result<HistoryStep> {
        let step = self.history.redo().await?;
        if matches!(step, HistoryStep::Applied(_)) {
            self.refresh_quietly().await;
        }
        Ok(step)
    }

    /// Link a folder as a new vault.
    ///
    /// Folders equal to, inside, or containing an existing vault are
    /// rejected.
    pub async fn add_local_folder(&self, name: &str, path: &Path) -> Result<LibrarySource> {
        let layout = self.engine.layout().await?;
        if let Some(owner) = layout.roots.overlapping(path) {
            return Err(ArchiveError::InvalidOperation(format!(
                "{} overlaps the vault of source {owner}",
                path.display()
            )));
        }

        let name = match name.trim() {
            "" => path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("Folder")
                .to_string(),
            trimmed => trimmed.to_string(),
        };
        let source = LibrarySource::local_folder(name, path.to_path_buf());
        self.engine.provider().allow_list().add_root(path);
        self.store().put_source(source.clone()).await?;

        if let Some(watcher) = self.watcher()
            && let Err(err) = watcher.watch(path).await
        {
            warn!(path = %path.display(), error = %err, "could not watch linked folder");
        }
        info!(source = %source.id, path = %path.display(), "linked folder");
        self.toast(Toast::success(format!("Folder \"{}\" linked.", source.name)));
        self.refresh(true).await?;
        Ok(source)
    }

    pub async fn rename_source(&self, id: &SourceId, name: &str) -> Result<LibrarySource> {
        let name = name.trim();
        if name.is_empty() {
            self.toast(Toast::error("Name cannot be empty."));
            return Err(ArchiveError::InvalidOperation("name cannot be empty".into()));
        }
        let mut source = self
            .store()
            .get_source(id)
            .await?
            .ok_or_else(|| ArchiveError::NotFound(format!("source {id}")))?;
        source.name = name.to_string();
        self.store().put_source(source.clone()).await?;
        self.toast(Toast::success("Folder renamed successfully."));
        Ok(source)
    }

    /// Unlink a folder. Returns how many records were deleted or reassigned.
    pub async fn remove_source(&self, id: &SourceId, removal: SourceRemoval) -> Result<usize> {
        if id.is_internal() {
            self.toast(Toast::error("Cannot remove the Local Vault."));
            return Err(ArchiveError::InvalidOperation(
                "the internal vault cannot be removed".into(),
            ));
        }
        let source = self
            .store()
            .get_source(id)
            .await?
            .ok_or_else(|| ArchiveError::NotFound(format!("source {id}")))?;

        let images = self.store().images_by_source(id).await?;
        let affected = images.len();
        for mut record in images {
            match removal {
                SourceRemoval::DeleteImages => {
                    self.store().delete_image(&record.id).await?;
                }
                SourceRemoval::Reassign => {
                    record.source_id = SourceId::internal();
                    self.store().put_image(record).await?;
                }
            }
        }
        self.store().delete_source(id).await?;

        if let Some(path) = &source.path {
            self.engine.provider().allow_list().remove_root(path);
            if let Some(watcher) = self.watcher() {
                watcher.unwatch(path);
            }
        }
        info!(source = %id, affected, ?removal, "unlinked folder");
        self.toast(Toast::success(format!(
            "Folder \"{}\" has been unlinked.",
            source.name
        )));
        self.refresh(true).await?;
        Ok(affected)
    }

    pub async fn settings(&self) -> Result<GeneralSettings> {
        Ok(self.engine.layout().await?.settings)
    }

    /// Persist settings; a new internal vault path is authorised and
    /// watched immediately.
    pub async fn update_settings(&self, settings: GeneralSettings) -> Result<GeneralSettings> {
        let previous = self.settings().await?;
        self.store().save_settings(settings.clone()).await?;

        if previous.local_vault_path != settings.local_vault_path
            && let Some(root) = settings.local_vault_path.clone()
        {
            let allow = self.engine.provider().allow_list();
            allow.set_internal(Some(root.clone()));
            if let Some(watcher) = self.watcher() {
                if let Some(old) = &previous.local_vault_path {
                    watcher.unwatch(old);
                }
                if let Err(err) = watcher.watch(&root).await {
                    warn!(path = %root.display(), error = %err, "could not watch vault");
                }
            }
        }
        self.refresh(true).await?;
        Ok(settings)
    }

    /// Reload the library and recompute every source count.
    ///
    /// Calls within the refresh interval of the previous one return the
    /// previous snapshot unless `force` is set.
    pub async fn refresh(&self, force: bool) -> Result<LibrarySnapshot> {
        if !force {
            let cached = self
                .last_refresh
                .lock()
                .as_ref()
                .filter(|(at, _)| at.elapsed() < self.config.refresh_interval)
                .map(|(_, snapshot)| snapshot.clone());
            if let Some(snapshot) = cached {
                return Ok(snapshot);
            }
        }

        let store = self.store();
        let mut settings = store.load_settings().await?.unwrap_or_default();
        if settings.local_vault_path.is_none()
            && let Some(internal) = self.engine.provider().allow_list().internal()
        {
            settings.local_vault_path = Some(internal);
            store.save_settings(settings.clone()).await?;
        }

        let mut images = store.list_images().await?;
        images.sort_by(|a, b| b.date.cmp(&a.date));

        let mut counts: HashMap<SourceId, usize> = HashMap::new();
        for record in &images {
            *counts.entry(record.source_id.clone()).or_default() += 1;
        }

        let mut sources = store.list_sources().await?;
        if !sources.iter().any(LibrarySource::is_internal) {
            sources.push(LibrarySource::internal(settings.local_vault_path.clone()));
        }
        for source in sources.iter_mut() {
            let count = counts.get(&source.id).copied().unwrap_or(0);
            let mut changed = source.count != count;
            source.count = count;
            if source.is_internal() && source.path != settings.local_vault_path {
                source.path = settings.local_vault_path.clone();
                changed = true;
            }
            if changed || store.get_source(&source.id).await?.is_none() {
                store.put_source(source.clone()).await?;
            }
        }
        sources.sort_by_key(|source| !source.is_internal());

        let allow = self.engine.provider().allow_list();
        let roots = VaultRoots::from_library(&settings, &sources);
        let allowed: HashSet<String> = allow.roots().iter().map(|root| path_key(root)).collect();
        let linked: Vec<PathBuf> = roots
            .iter()
            .filter(|(id, _)| !id.is_internal())
            .map(|(_, root)| root.to_path_buf())
            .collect();
        for root in linked {
            if !allowed.contains(&path_key(&root)) {
                allow.add_root(&root);
            }
        }

        let snapshot = LibrarySnapshot {
            images,
            sources,
            settings,
        };
        *self.last_refresh.lock() = Some((Instant::now(), snapshot.clone()));
        debug!(
            images = snapshot.images.len(),
            sources = snapshot.sources.len(),
            "library refreshed"
        );
        Ok(snapshot)
    }
}

#[async_trait]
impl RefreshSink for LibraryService {
    async fn request_refresh(&self) {
        self.refresh_quietly().await;
    }
}
