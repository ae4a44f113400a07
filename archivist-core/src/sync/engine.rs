use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use archivist_model::{BackupRef, GeneralSettings, ImageId, ImageRecord};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::lock::LockSet;
use super::log::{SyncLog, SyncLogEntry, SyncResult};
use super::plan::{
    LocationPlan, MaterializeOp, MetadataSyncOp, MoveDirection, RenameOp, VaultMoveOp,
    plan_location, plan_rename,
};
use crate::config::EngineConfig;
use crate::embedded::{EmbeddedTags, EmbeddedWrite};
use crate::error::{ArchiveError, Result};
use crate::event_gate::EventGate;
use crate::hashing::content_hash;
use crate::provider::{FsProvider, WriteMode};
use crate::sidecar::write_sidecars;
use crate::store::LibraryStore;
use crate::toast::{Notifier, Toast};
use crate::vault::{
    VaultRoots, file_url, is_disk_locator, is_within, path_key, resolve_locator,
    sanitize_filename, sidecar_paths, split_file_name, unique_path,
};

/// Settings and vault roots as the engine sees them for one operation.
#[derive(Debug, Clone)]
pub struct LibraryLayout {
    pub settings: GeneralSettings,
    pub roots: VaultRoots,
}

/// Final record of a reconcile plus every step it logged.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub record: ImageRecord,
    pub entries: Vec<SyncLogEntry>,
}

impl SyncReport {
    pub fn step(&self, op: &str) -> Option<&SyncLogEntry> {
        self.entries.iter().find(|entry| entry.op == op)
    }
}

/// What happened to the file when a record was deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskDeletion {
    /// The record had no file on disk.
    NoFile,
    /// The file lives in a linked folder and linked deletes are disabled.
    Kept,
    /// The file and its sidecars were trashed; the backup enables undo.
    Trashed(Option<BackupRef>),
}

impl DiskDeletion {
    pub fn backup(&self) -> Option<&BackupRef> {
        match self {
            DiskDeletion::Trashed(backup) => backup.as_ref(),
            DiskDeletion::NoFile | DiskDeletion::Kept => None,
        }
    }
}

struct Trail<'a> {
    log: &'a SyncLog,
    entries: Vec<SyncLogEntry>,
}

impl<'a> Trail<'a> {
    fn new(log: &'a SyncLog) -> Self {
        Self {
            log,
            entries: Vec::new(),
        }
    }

    fn push(&mut self, entry: SyncLogEntry) {
        self.log.record(entry.clone());
        self.entries.push(entry);
    }

    fn finish(self, record: ImageRecord) -> SyncReport {
        SyncReport {
            record,
            entries: self.entries,
        }
    }
}

/// Keeps a record's file, location and sidecars in line with the record.
///
/// `reconcile` runs after every store write to an image. It never fails:
/// phase errors are logged, surfaced as toasts and answered with the best
/// record the store still holds.
pub struct DiskSyncEngine {
    provider: Arc<dyn FsProvider>,
    store: Arc<dyn LibraryStore>,
    gate: Arc<EventGate>,
    notifier: Arc<dyn Notifier>,
    locks: LockSet,
    log: SyncLog,
    config: EngineConfig,
}

impl fmt::Debug for DiskSyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskSyncEngine")
            .field("locks", &self.locks)
            .field("log", &self.log)
            .field("config", &self.config)
            .finish()
    }
}

fn detached(prior: &ImageRecord) -> ImageRecord {
    let mut record = prior.clone();
    record.src = None;
    record.blob = None;
    record
}

impl DiskSyncEngine {
    pub fn new(
        provider: Arc<dyn FsProvider>,
        store: Arc<dyn LibraryStore>,
        gate: Arc<EventGate>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        let log = SyncLog::new(config.log_capacity);
        Self {
            provider,
            store,
            gate,
            notifier,
            locks: LockSet::new(),
            log,
            config,
        }
    }

    pub fn provider(&self) -> &Arc<dyn FsProvider> {
        &self.provider
    }

    pub fn store(&self) -> &Arc<dyn LibraryStore> {
        &self.store
    }

    pub fn gate(&self) -> &Arc<EventGate> {
        &self.gate
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn log(&self) -> &SyncLog {
        &self.log
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_locked(&self, id: &ImageId) -> bool {
        self.locks.is_locked(id)
    }

    /// Current settings and vault roots. The provider's internal root stands
    /// in when the settings do not name one.
    pub async fn layout(&self) -> Result<LibraryLayout> {
        let mut settings = self.store.load_settings().await?.unwrap_or_default();
        if settings.local_vault_path.is_none() {
            settings.local_vault_path = self.provider.allow_list().internal();
        }
        let sources = self.store.list_sources().await?;
        let roots = VaultRoots::from_library(&settings, &sources);
        Ok(LibraryLayout { settings, roots })
    }

    /// Authorised native path of the record's file, if it has one.
    pub async fn disk_path(&self, record: &ImageRecord) -> Option<PathBuf> {
        let locator = record.locator().filter(|src| is_disk_locator(src))?;
        match self.provider.real_path(locator).await {
            Ok(path) => Some(path),
            Err(err) => {
                debug!(id = %record.id, locator, error = %err, "locator not usable for disk sync");
                None
            }
        }
    }

    /// Bring the disk in line with the stored record `id`, which held
    /// `prior` before the edit that triggered this call.
    pub async fn reconcile(&self, id: &ImageId, prior: &ImageRecord) -> ImageRecord {
        self.reconcile_with_report(id, prior).await.record
    }

    pub async fn reconcile_with_report(&self, id: &ImageId, prior: &ImageRecord) -> SyncReport {
        let mut trail = Trail::new(&self.log);

        let guard = match self.locks.acquire(id, self.config.lock_wait).await {
            Ok(guard) => guard,
            Err(err) => {
                trail.push(
                    SyncLogEntry::new("lock", id, SyncResult::Skipped).with_reason(err.to_string()),
                );
                let record = self.stored_or(id, prior).await;
                return trail.finish(record);
            }
        };

        let started = Instant::now();
        let record = match self.run(id, prior, &mut trail).await {
            Ok(record) => record,
            Err(err) => {
                error!(id = %id, error = %err, "disk sync failed");
                trail.push(
                    SyncLogEntry::new("reconcile", id, SyncResult::Error)
                        .with_reason(err.to_string())
                        .with_duration(started.elapsed()),
                );
                self.notifier
                    .notify(Toast::error(format!("Disk sync failed: {err}")));
                self.stored_or(id, prior).await
            }
        };
        drop(guard);
        trail.finish(record)
    }

    async fn stored_or(&self, id: &ImageId, prior: &ImageRecord) -> ImageRecord {
        match self.store.get_image(id).await {
            Ok(Some(record)) => record,
            Ok(None) => detached(prior),
            Err(err) => {
                warn!(id = %id, error = %err, "could not reload record after disk sync");
                prior.clone()
            }
        }
    }

    async fn run(&self, id: &ImageId, prior: &ImageRecord, trail: &mut Trail<'_>) -> Result<ImageRecord> {
        let Some(mut record) = self.store.get_image(id).await? else {
            trail.push(
                SyncLogEntry::new("reconcile", id, SyncResult::Skipped).with_reason("record deleted"),
            );
            return Ok(detached(prior));
        };

        let layout = self.layout().await?;
        if layout.roots.internal().is_none() {
            trail.push(
                SyncLogEntry::new("reconcile", id, SyncResult::Skipped)
                    .with_reason("no internal vault configured"),
            );
            return Ok(record);
        }

        let disk_path = self.disk_path(&record).await;
        match plan_location(&prior.source_id, &record, disk_path.as_deref(), &layout.roots) {
            LocationPlan::Stay => {}
            LocationPlan::AdoptSource(owner) => {
                let adopted = owner.clone();
                record = self.amend(id, move |r| r.source_id = adopted).await?;
                trail.push(
                    SyncLogEntry::new("adopt_source", id, SyncResult::Ok)
                        .with_reason(format!("file belongs to {owner}")),
                );
            }
            LocationPlan::RevertSource(source) => {
                warn!(id = %id, requested = %record.source_id, revert_to = %source, "target source has no folder");
                let reverted = source.clone();
                record = self.amend(id, move |r| r.source_id = reverted).await?;
                trail.push(
                    SyncLogEntry::new("revert_source", id, SyncResult::Skipped)
                        .with_reason(format!("target source has no folder, kept {source}")),
                );
            }
            LocationPlan::Materialize(op) => {
                let started = Instant::now();
                match self.materialize(&record, &op).await {
                    Ok((updated, path)) => {
                        record = updated;
                        trail.push(
                            SyncLogEntry::new(MaterializeOp::LABEL, id, SyncResult::Ok)
                                .with_path(path)
                                .with_duration(started.elapsed()),
                        );
                    }
                    Err(err) => {
                        trail.push(
                            SyncLogEntry::new(MaterializeOp::LABEL, id, SyncResult::Error)
                                .with_path(&op.root)
                                .with_reason(err.to_string())
                                .with_duration(started.elapsed()),
                        );
                        self.notifier
                            .notify(Toast::error(format!("Disk sync failed: {err}")));
                        return Ok(record);
                    }
                }
            }
            LocationPlan::VaultMove(op) => {
                let started = Instant::now();
                match self.vault_move(&record, &op).await {
                    Ok((updated, how)) => {
                        trail.push(
                            SyncLogEntry::new(VaultMoveOp::LABEL, id, SyncResult::Ok)
                                .with_path(updated_path(&updated).unwrap_or_else(|| op.from.clone()))
                                .with_reason(how)
                                .with_duration(started.elapsed()),
                        );
                        record = updated;
                    }
                    Err(err) => {
                        trail.push(
                            SyncLogEntry::new(VaultMoveOp::LABEL, id, SyncResult::Error)
                                .with_path(&op.from)
                                .with_reason(err.to_string())
                                .with_duration(started.elapsed()),
                        );
                        let message = match op.direction {
                            MoveDirection::IntoInternal => {
                                format!("Failed to copy into the local vault: {err}")
                            }
                            MoveDirection::OutOfInternal | MoveDirection::BetweenLinked => {
                                "Failed to copy to external vault".to_string()
                            }
                        };
                        self.notifier.notify(Toast::error(message));
                        let revert_to = op.revert_to.clone();
                        return self.amend(id, move |r| r.source_id = revert_to).await;
                    }
                }
            }
        }

        let Some(mut path) = self.disk_path(&record).await else {
            trail.push(
                SyncLogEntry::new(MetadataSyncOp::LABEL, id, SyncResult::Skipped)
                    .with_reason("record has no file on disk"),
            );
            return Ok(record);
        };

        if let Some(op) = plan_rename(
            &prior.title,
            &record,
            &path,
            layout.settings.rename_linked_vault_files,
        ) {
            let started = Instant::now();
            match self.rename(&record, &op).await {
                Ok((updated, renamed)) => {
                    trail.push(
                        SyncLogEntry::new(RenameOp::LABEL, id, SyncResult::Ok)
                            .with_path(&renamed)
                            .with_duration(started.elapsed()),
                    );
                    record = updated;
                    path = renamed;
                }
                Err(err) => {
                    trail.push(
                        SyncLogEntry::new(RenameOp::LABEL, id, SyncResult::Error)
                            .with_path(&op.from)
                            .with_reason(err.to_string())
                            .with_duration(started.elapsed()),
                    );
                }
            }
        }

        let entry = self.sync_metadata(&record, &MetadataSyncOp { path }).await;
        trail.push(entry);
        Ok(record)
    }

    /// Load the stored record, change it and write it back.
    async fn amend<F>(&self, id: &ImageId, change: F) -> Result<ImageRecord>
    where
        F: FnOnce(&mut ImageRecord) + Send,
    {
        let mut record = self
            .store
            .get_image(id)
            .await?
            .ok_or_else(|| ArchiveError::NotFound(format!("image {id}")))?;
        change(&mut record);
        self.store.put_image(record.clone()).await?;
        Ok(record)
    }

    async fn materialize(&self, record: &ImageRecord, op: &MaterializeOp) -> Result<(ImageRecord, PathBuf)> {
        let blob = record.blob.as_ref().ok_or_else(|| {
            ArchiveError::InvalidOperation(format!("image {} has no in-memory payload", record.id))
        })?;
        let stem = sanitize_filename(&record.title);
        let ext = blob.extension();

        self.provider.mkdir(&op.root).await?;
        let temp = op
            .root
            .join(format!(".{stem}.{}.tmp", Uuid::new_v4().simple()));
        self.gate.ignore(&temp, self.config.write_ignore_ttl);
        self.provider
            .write_file(&temp, &blob.bytes, WriteMode::Direct)
            .await?;

        let dest = unique_path(&*self.provider, &op.root, &stem, ext).await;
        self.gate
            .ignore_with_sidecars(&dest, self.config.rename_ignore_ttl);
        let written = match self.provider.rename_file(&temp, &dest).await {
            Ok(written) => written,
            Err(err) => {
                if let Err(cleanup) = self.provider.trash_file(&temp).await {
                    debug!(path = %temp.display(), error = %cleanup, "temp file cleanup failed");
                }
                return Err(err);
            }
        };
        if written != dest {
            self.gate
                .ignore_with_sidecars(&written, self.config.rename_ignore_ttl);
        }

        let hash = content_hash(&blob.bytes);
        let locator = file_url(&written);
        let source = op.source.clone();
        let updated = self
            .amend(&record.id, move |r| {
                r.src = Some(locator);
                r.blob = None;
                r.source_id = source;
                if r.hash.is_none() {
                    r.hash = Some(hash);
                }
            })
            .await?;
        info!(id = %record.id, path = %written.display(), "image materialised");
        Ok((updated, written))
    }

    async fn vault_move(&self, record: &ImageRecord, op: &VaultMoveOp) -> Result<(ImageRecord, &'static str)> {
        if let Some(restored) = self.round_trip(record, op).await? {
            return Ok((restored, "round trip"));
        }

        let (_, ext) = split_file_name(&op.from);
        let stem = sanitize_filename(&record.title).to_lowercase();
        self.provider.mkdir(&op.target_root).await?;
        let dest = unique_path(&*self.provider, &op.target_root, &stem, &ext).await;

        self.gate
            .ignore_with_sidecars(&dest, self.config.copy_ignore_ttl);
        self.provider.copy_file(&op.from, &dest).await?;

        let locator = file_url(&dest);
        let previous = record.locator().map(str::to_string);
        let target_source = op.target_source.clone();
        let updated = match self
            .amend(&record.id, move |r| {
                r.src = Some(locator);
                r.original_src = previous;
                r.blob = None;
                r.source_id = target_source;
            })
            .await
        {
            Ok(updated) => updated,
            Err(err) => {
                self.discard(&dest).await;
                return Err(err);
            }
        };

        self.discard(&op.from).await;
        info!(
            id = %record.id,
            from = %op.from.display(),
            to = %dest.display(),
            direction = ?op.direction,
            "image moved between vaults"
        );
        Ok((updated, "copied"))
    }

    /// Point the record back at the file it was copied from when that file
    /// still exists inside the target root.
    async fn round_trip(&self, record: &ImageRecord, op: &VaultMoveOp) -> Result<Option<ImageRecord>> {
        let Some(original) = record.original_src.as_deref() else {
            return Ok(None);
        };
        let Ok(original_path) = self.provider.real_path(original).await else {
            return Ok(None);
        };
        if path_key(&original_path) == path_key(&op.from)
            || !is_within(&original_path, &op.target_root)
            || !self.provider.exists(&original_path).await
        {
            return Ok(None);
        }

        let original = original.to_string();
        let target_source = op.target_source.clone();
        let restored = self
            .amend(&record.id, move |r| {
                r.src = Some(original);
                r.original_src = None;
                r.source_id = target_source;
            })
            .await?;
        self.discard(&op.from).await;
        info!(id = %record.id, path = %original_path.display(), "round trip restored original file");
        Ok(Some(restored))
    }

    async fn rename(&self, record: &ImageRecord, op: &RenameOp) -> Result<(ImageRecord, PathBuf)> {
        let ttl = self.config.rename_ignore_ttl;
        self.gate.ignore_with_sidecars(&op.from, ttl);
        self.gate.ignore_with_sidecars(&op.to, ttl);

        let renamed = self.provider.rename_file(&op.from, &op.to).await?;
        if renamed != op.to {
            self.gate.ignore_with_sidecars(&renamed, ttl);
        }

        let locator = file_url(&renamed);
        let updated = self
            .amend(&record.id, move |r| r.src = Some(locator))
            .await?;

        if self.provider.exists(&op.from).await {
            warn!(path = %op.from.display(), "rename left the old file behind, trashing it");
            if let Err(err) = self.provider.trash_file(&op.from).await {
                error!(path = %op.from.display(), error = %err, "failed to clean up ghost file");
            }
        }
        self.discard_sidecars(&op.from).await;
        Ok((updated, renamed))
    }

    async fn sync_metadata(&self, record: &ImageRecord, op: &MetadataSyncOp) -> SyncLogEntry {
        let started = Instant::now();
        self.gate
            .ignore_with_sidecars(&op.path, self.config.write_ignore_ttl);

        let mut failures = Vec::new();
        let embedded = match self
            .provider
            .write_embedded_metadata(&op.path, &EmbeddedTags::from_record(record))
            .await
        {
            Ok(EmbeddedWrite::Written) => "embedded",
            Ok(EmbeddedWrite::Unsupported) => "not embeddable",
            Err(err) => {
                failures.push(format!("embedded metadata: {err}"));
                "embedded failed"
            }
        };
        let sidecars = match write_sidecars(&*self.provider, &op.path, record).await {
            Ok(written) => written,
            Err(err) => {
                failures.push(format!("sidecars: {err}"));
                0
            }
        };

        let entry = SyncLogEntry::new(MetadataSyncOp::LABEL, &record.id, SyncResult::Ok)
            .with_path(&op.path)
            .with_duration(started.elapsed());
        if failures.is_empty() {
            entry.with_reason(format!("{embedded}, {sidecars} sidecar file(s) written"))
        } else {
            SyncLogEntry {
                result: SyncResult::Error,
                ..entry.with_reason(failures.join("; "))
            }
        }
    }

    /// Rewrite embedded tags and sidecars for a record already on disk.
    ///
    /// Used when the watcher adopts a file; no location or name changes.
    pub async fn write_through(&self, record: &ImageRecord) -> Result<PathBuf> {
        let _guard = self.locks.acquire(&record.id, self.config.lock_wait).await?;
        let path = self.disk_path(record).await.ok_or_else(|| {
            ArchiveError::PathResolution(record.src.clone().unwrap_or_default())
        })?;
        let entry = self
            .sync_metadata(record, &MetadataSyncOp { path: path.clone() })
            .await;
        self.log.record(entry);
        Ok(path)
    }

    /// Trash the record's file and sidecars after taking a backup.
    ///
    /// Linked-folder files are only touched when `force` is set or the
    /// settings allow deleting linked files. A failed trash is returned as
    /// an error so the caller can keep the record.
    pub async fn delete_from_disk(&self, record: &ImageRecord, force: bool) -> Result<DiskDeletion> {
        let _guard = self.locks.acquire(&record.id, self.config.lock_wait).await?;
        let started = Instant::now();

        let Some(path) = self.disk_path(record).await else {
            return Ok(DiskDeletion::NoFile);
        };
        let layout = self.layout().await?;
        if !(force || layout.roots.in_internal(&path) || layout.settings.delete_linked_vault_files) {
            self.log.record(
                SyncLogEntry::new("delete", &record.id, SyncResult::Skipped)
                    .with_path(&path)
                    .with_reason("linked folder files are kept"),
            );
            return Ok(DiskDeletion::Kept);
        }
        if !self.provider.exists(&path).await {
            return Ok(DiskDeletion::NoFile);
        }

        let backup = match self.provider.backup_file(&path).await {
            Ok(backup) => Some(backup),
            Err(err) => {
                warn!(id = %record.id, path = %path.display(), error = %err, "backup before delete failed");
                None
            }
        };

        self.gate
            .ignore_with_sidecars(&path, self.config.write_ignore_ttl);
        if let Err(err) = self.provider.trash_file(&path).await {
            self.log.record(
                SyncLogEntry::new("delete", &record.id, SyncResult::Error)
                    .with_path(&path)
                    .with_reason(err.to_string())
                    .with_duration(started.elapsed()),
            );
            return Err(err);
        }
        self.discard_sidecars(&path).await;

        self.log.record(
            SyncLogEntry::new("delete", &record.id, SyncResult::Ok)
                .with_path(&path)
                .with_duration(started.elapsed()),
        );
        Ok(DiskDeletion::Trashed(backup))
    }

    /// Put a backed-up file back where `record` says it lived. Returns the
    /// record pointing at the restored file; the caller persists it.
    pub async fn restore_backup(&self, record: &ImageRecord, backup: &BackupRef) -> Result<ImageRecord> {
        let _guard = self.locks.acquire(&record.id, self.config.lock_wait).await?;
        let started = Instant::now();

        let wanted = self.disk_path(record).await.ok_or_else(|| {
            ArchiveError::PathResolution(record.src.clone().unwrap_or_default())
        })?;
        let target = if self.provider.exists(&wanted).await {
            let dir = wanted
                .parent()
                .ok_or_else(|| ArchiveError::PathResolution(wanted.display().to_string()))?;
            let (stem, ext) = split_file_name(&wanted);
            unique_path(&*self.provider, dir, &stem, &ext).await
        } else {
            wanted
        };

        self.gate
            .ignore_with_sidecars(&target, self.config.copy_ignore_ttl);
        self.provider.restore_file(backup, &target).await?;

        self.log.record(
            SyncLogEntry::new("restore", &record.id, SyncResult::Ok)
                .with_path(&target)
                .with_duration(started.elapsed()),
        );
        let mut restored = record.clone();
        restored.src = Some(file_url(&target));
        restored.blob = None;
        Ok(restored)
    }

    /// Trash a file the engine no longer needs, plus its sidecars.
    async fn discard(&self, path: &Path) {
        self.gate
            .ignore_with_sidecars(path, self.config.write_ignore_ttl);
        if let Err(err) = self.provider.trash_file(path).await {
            warn!(path = %path.display(), error = %err, "failed to trash file");
        }
        self.discard_sidecars(path).await;
    }

    async fn discard_sidecars(&self, path: &Path) {
        for sidecar in sidecar_paths(path) {
            if !self.provider.exists(&sidecar).await {
                continue;
            }
            self.gate.ignore(&sidecar, self.config.write_ignore_ttl);
            if let Err(err) = self.provider.trash_file(&sidecar).await {
                debug!(path = %sidecar.display(), error = %err, "failed to trash sidecar");
            }
        }
    }
}

fn updated_path(record: &ImageRecord) -> Option<PathBuf> {
    record
        .locator()
        .and_then(|src| resolve_locator(src).ok())
}

#[cfg(test)]
mod tests {
    use archivist_model::ImagePatch;

    use super::*;
    use crate::provider::InMemoryProvider;
    use crate::store::InMemoryStore;
    use crate::toast::NoopNotifier;

    #[tokio::test(start_paused = true)]
    async fn contended_reconcile_returns_the_stored_record_untouched() {
        let fs = Arc::new(InMemoryProvider::with_vault("/vault"));
        let store = Arc::new(InMemoryStore::new());
        let engine = DiskSyncEngine::new(
            fs.clone(),
            store.clone(),
            Arc::new(EventGate::default()),
            Arc::new(NoopNotifier),
            EngineConfig::default(),
        );
        fs.insert_file("/vault/cat.png", b"px".to_vec());
        let prior = ImageRecord::new("cat").with_src("file:///vault/cat.png");
        store.put_image(prior.clone()).await.unwrap();
        store
            .update_image(&prior.id, &ImagePatch::title("dog"))
            .await
            .unwrap();

        let held = engine
            .locks
            .acquire(&prior.id, engine.config.lock_wait)
            .await
            .unwrap();
        let report = engine.reconcile_with_report(&prior.id, &prior).await;
        drop(held);

        assert_eq!(report.record.title, "dog");
        assert_eq!(report.record.src.as_deref(), Some("file:///vault/cat.png"));
        assert_eq!(report.step("lock").map(|entry| entry.result), Some(SyncResult::Skipped));
        assert!(report.step(RenameOp::LABEL).is_none());
        assert!(fs.has_file("/vault/cat.png"));
        assert!(!fs.has_file("/vault/dog.png"));
        assert!(!fs.has_file("/vault/cat.json"));
        assert!(!engine.is_locked(&prior.id));
    }
}
