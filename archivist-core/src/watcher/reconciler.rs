use std::fmt;
use std::path::Path;
use std::sync::Arc;

use archivist_model::{ImageId, ImagePatch, ImageRecord};
use tracing::{debug, info, warn};

use crate::error::{ArchiveError, Result};
use crate::event_gate::GateDecision;
use crate::maintenance::{MetadataEnrichment, enrich_record};
use crate::provider::{FsEvent, FsEventKind};
use crate::sidecar::{read_document, read_sidecar};
use crate::sync::DiskSyncEngine;
use crate::vault::{
    IMAGE_EXTENSIONS, extension_of, file_url, is_image_path, is_sidecar_path, title_from_path,
};

/// Why a watch event did not change the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The engine wrote this path itself.
    SelfWrite,
    /// Same fingerprint as an event seen moments ago.
    DuplicateEvent,
    Hidden,
    /// Neither an image nor a sidecar.
    NotLibraryFile,
    AlreadyTracked,
    /// Bytes match an existing record.
    DuplicateHash,
    /// No vault root contains the path.
    UnknownSource,
    /// A sidecar with no matching image record.
    NoOwner,
    Unchanged,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::SelfWrite => "self_write",
            SkipReason::DuplicateEvent => "duplicate_event",
            SkipReason::Hidden => "hidden",
            SkipReason::NotLibraryFile => "not_library_file",
            SkipReason::AlreadyTracked => "already_tracked_by_src",
            SkipReason::DuplicateHash => "duplicate_hash",
            SkipReason::UnknownSource => "unknown_source",
            SkipReason::NoOwner => "no_owner",
            SkipReason::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of handling one watch event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// A new record was created for the file.
    Imported(ImageId),
    /// A known record was found at a new path through its sidecar id.
    PathUpdated(ImageId),
    /// Sidecar content was merged into the owning record.
    MetadataMerged(ImageId),
    /// A file disappeared; the record is left for the reconciliation pass.
    Removed,
    Skipped(SkipReason),
    /// Handling failed; already logged.
    Failed,
}

impl WatchOutcome {
    /// Whether the library view should be refreshed after this event.
    pub fn wants_refresh(&self) -> bool {
        matches!(
            self,
            WatchOutcome::Imported(_)
                | WatchOutcome::PathUpdated(_)
                | WatchOutcome::MetadataMerged(_)
                | WatchOutcome::Removed
        )
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// Applies external filesystem changes to the library.
///
/// Events pass through the engine's [`EventGate`](crate::event_gate::EventGate)
/// first, so files the engine writes itself never come back as imports.
/// Failures are logged and never surfaced to the user.
pub struct WatchReconciler {
    engine: Arc<DiskSyncEngine>,
    enrichment: Option<Arc<MetadataEnrichment>>,
}

impl fmt::Debug for WatchReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchReconciler")
            .field("engine", &self.engine)
            .field("has_enrichment", &self.enrichment.is_some())
            .finish()
    }
}

impl WatchReconciler {
    pub fn new(engine: Arc<DiskSyncEngine>) -> Self {
        Self {
            engine,
            enrichment: None,
        }
    }

    /// Records imported here are marked as enriched for the background loop.
    pub fn with_enrichment(mut self, enrichment: Arc<MetadataEnrichment>) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    pub fn engine(&self) -> &Arc<DiskSyncEngine> {
        &self.engine
    }

    pub async fn handle_event(&self, event: &FsEvent) -> WatchOutcome {
        let path = event.path.as_path();
        match self.engine.gate().admit(event) {
            GateDecision::Admit => {}
            GateDecision::SelfWrite => return self.skip(path, SkipReason::SelfWrite),
            GateDecision::Duplicate => return self.skip(path, SkipReason::DuplicateEvent),
        }
        if is_hidden(path) {
            return self.skip(path, SkipReason::Hidden);
        }

        let handled = match event.kind {
            FsEventKind::Removed => {
                debug!(path = %path.display(), "file removed outside the library");
                Ok(WatchOutcome::Removed)
            }
            FsEventKind::Added if is_image_path(path) => self.handle_new_image(path).await,
            FsEventKind::Added if is_sidecar_path(path) => self.handle_sidecar(path).await,
            FsEventKind::Added => Ok(WatchOutcome::Skipped(SkipReason::NotLibraryFile)),
        };

        match handled {
            Ok(WatchOutcome::Skipped(reason)) => self.skip(path, reason),
            Ok(outcome) => outcome,
            Err(ArchiveError::UnknownSource(path)) => {
                warn!(path = %path.display(), "file is outside every vault root; left untracked");
                WatchOutcome::Skipped(SkipReason::UnknownSource)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "watch event handling failed");
                WatchOutcome::Failed
            }
        }
    }

    fn skip(&self, path: &Path, reason: SkipReason) -> WatchOutcome {
        debug!(path = %path.display(), reason = %reason, "watch event skipped");
        WatchOutcome::Skipped(reason)
    }

    /// Track an image file that appeared on disk.
    ///
    /// Also used by the manual rescan, which bypasses the event gate.
    pub async fn handle_new_image(&self, path: &Path) -> Result<WatchOutcome> {
        let store = self.engine.store();
        let provider = self.engine.provider();
        let src = file_url(path);

        if store.find_by_src(&src).await?.is_some() {
            return Ok(WatchOutcome::Skipped(SkipReason::AlreadyTracked));
        }

        let layout = self.engine.layout().await?;
        let owner = layout.roots.owner_of(path);

        if let Ok(Some(document)) = read_sidecar(provider.as_ref(), path).await
            && let Some(raw_id) = document.id.as_deref()
            && let Ok(id) = ImageId::from_string(raw_id)
            && let Some(mut record) = store.get_image(&id).await?
        {
            info!(id = %id, path = %path.display(), "record found at a new path");
            record.src = Some(src);
            record.blob = None;
            if let Some(owner) = owner {
                record.source_id = owner;
            }
            store.put_image(record).await?;
            return Ok(WatchOutcome::PathUpdated(id));
        }

        let hash = match provider.calculate_hash(path).await {
            Ok(hash) => Some(hash),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "hashing new file failed");
                None
            }
        };
        if let Some(hash) = hash.as_deref()
            && store.find_by_hash(hash).await?.is_some()
        {
            return Ok(WatchOutcome::Skipped(SkipReason::DuplicateHash));
        }

        let Some(owner) = owner else {
            return Err(ArchiveError::UnknownSource(path.to_path_buf()));
        };

        let mut record = ImageRecord::new(title_from_path(path))
            .with_src(src)
            .with_source(owner);
        record.hash = hash;
        let enrichment = enrich_record(provider.as_ref(), &record, Some(path)).await;
        enrichment.patch.apply(&mut record);

        let id = record.id.clone();
        store.put_image(record.clone()).await?;
        if let Some(enrichment) = &self.enrichment {
            enrichment.mark_processed(&id);
        }
        if let Err(err) = self.engine.write_through(&record).await {
            debug!(id = %id, error = %err, "writing sidecars for imported file failed");
        }

        info!(id = %id, path = %path.display(), source = %record.source_id, "imported new file");
        Ok(WatchOutcome::Imported(id))
    }

    async fn handle_sidecar(&self, path: &Path) -> Result<WatchOutcome> {
        let store = self.engine.store();
        let provider = self.engine.provider();

        let mut owner = None;
        for ext in IMAGE_EXTENSIONS {
            if let Some(record) = store.find_by_src(&file_url(&path.with_extension(ext))).await? {
                owner = Some(record);
                break;
            }
        }
        let Some(record) = owner else {
            return Ok(WatchOutcome::Skipped(SkipReason::NoOwner));
        };

        let patch = match extension_of(path).as_deref() {
            Some("txt") => {
                let prompt = provider.read_text(path).await?.trim().to_string();
                ImagePatch {
                    prompt: Some(prompt),
                    ..ImagePatch::default()
                }
            }
            _ => match read_document(provider.as_ref(), path).await? {
                Some(document) => document.to_patch(),
                None => return Ok(WatchOutcome::Skipped(SkipReason::Unchanged)),
            },
        }
        .without_noops(&record);

        if patch.is_empty() {
            return Ok(WatchOutcome::Skipped(SkipReason::Unchanged));
        }
        store.update_image(&record.id, &patch).await?;
        info!(id = %record.id, path = %path.display(), "merged sidecar changes");
        Ok(WatchOutcome::MetadataMerged(record.id))
    }
}
