use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use archivist_model::{ImageBlob, ImageId, ImageRecord, SourceId};
use async_trait::async_trait;
use tracing::{info, warn};

use super::candidate::ImportCandidate;
use crate::embedded;
use crate::error::Result;
use crate::hashing::content_hash;
use crate::sidecar::{GenerationData, parse_generation_data};
use crate::sync::DiskSyncEngine;
use crate::toast::Toast;
use crate::vault::file_url;

/// How to treat entries whose bytes are already in the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateChoice {
    /// Persist only the new entries.
    Skip,
    /// Persist duplicates too, without the duplicate marker.
    Keep,
}

/// A scanned import, split before anything is persisted.
#[derive(Debug, Clone, Default)]
pub struct ImportBatch {
    pub new_entries: Vec<ImageRecord>,
    pub duplicates: Vec<ImageRecord>,
    /// Human-readable origin shown when asking about duplicates.
    pub source_label: String,
}

/// Decides what happens to duplicates once a batch has been scanned.
#[async_trait]
pub trait DuplicateResolver: Send + Sync {
    async fn resolve(&self, batch: &ImportBatch) -> DuplicateChoice;
}

/// Resolver with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedChoice(pub DuplicateChoice);

#[async_trait]
impl DuplicateResolver for FixedChoice {
    async fn resolve(&self, _batch: &ImportBatch) -> DuplicateChoice {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: Vec<ImageId>,
    pub skipped: usize,
}

fn merge_generation(record: &mut ImageRecord, data: GenerationData) {
    if let Some(prompt) = data.prompt {
        record.prompt = prompt;
    }
    if let Some(negative) = data.negative_prompt {
        record.negative_prompt = negative;
    }
    if let Some(model) = data.model {
        record.model = model;
    }
    if let Some(sampler) = data.sampler {
        record.sampler = sampler;
    }
    if let Some(cfg) = data.cfg_scale {
        record.cfg_scale = cfg;
    }
    if let Some(steps) = data.steps {
        record.steps = steps;
    }
    if let Some(seed) = data.seed {
        record.seed = seed;
    }
    if let Some(width) = data.width {
        record.width = width;
    }
    if let Some(height) = data.height {
        record.height = height;
    }
    if let Some(loras) = data.loras {
        record.loras = loras;
    }
}

/// Batch import with all-or-nothing duplicate handling.
pub struct Importer {
    engine: Arc<DiskSyncEngine>,
    resolver: Arc<dyn DuplicateResolver>,
}

impl fmt::Debug for Importer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Importer").finish_non_exhaustive()
    }
}

impl Importer {
    pub fn new(engine: Arc<DiskSyncEngine>, resolver: Arc<dyn DuplicateResolver>) -> Self {
        Self { engine, resolver }
    }

    /// Build records for `candidates` in order and split them by hash.
    ///
    /// A candidate is a duplicate when its hash is already stored or was
    /// seen earlier in the same batch. Files already inside a vault root are
    /// linked in place; everything else carries its bytes and is written to
    /// the `target` vault on commit.
    pub async fn scan(
        &self,
        candidates: Vec<ImportCandidate>,
        target: &SourceId,
        source_label: impl Into<String>,
    ) -> Result<ImportBatch> {
        let store = self.engine.store();
        let layout = self.engine.layout().await?;
        let mut batch = ImportBatch {
            source_label: source_label.into(),
            ..ImportBatch::default()
        };
        let mut seen: HashSet<String> = HashSet::new();

        for candidate in candidates {
            let hash = content_hash(&candidate.bytes);
            let duplicate =
                seen.contains(&hash) || store.find_by_hash(&hash).await?.is_some();
            seen.insert(hash.clone());

            let mut record = ImageRecord::new(candidate.title.clone()).with_source(target.clone());
            record.hash = Some(hash);

            if let Some(text) = candidate.text.as_deref() {
                let mut data = parse_generation_data(text);
                if data.prompt.is_none() && !text.trim().is_empty() {
                    data.prompt = Some(text.trim().to_string());
                }
                merge_generation(&mut record, data);
            }
            let meta = embedded::read_metadata(&candidate.bytes);
            if let Some(width) = meta.width.filter(|w| *w > 0) {
                record.width = width;
            }
            if let Some(height) = meta.height.filter(|h| *h > 0) {
                record.height = height;
            }
            if record.prompt.is_empty()
                && let Some(text) = meta.generation_text()
            {
                merge_generation(&mut record, parse_generation_data(text));
            }

            let owner = candidate
                .path
                .as_deref()
                .and_then(|path| layout.roots.owner_of(path).map(|owner| (path, owner)));
            record = match owner {
                Some((path, owner)) => record.with_src(file_url(path)).with_source(owner),
                None => record.with_blob(ImageBlob::new(candidate.bytes, candidate.mime)),
            };

            if duplicate {
                record.is_duplicate = true;
                batch.duplicates.push(record);
            } else {
                batch.new_entries.push(record);
            }
        }
        Ok(batch)
    }

    /// Persist a scanned batch and write in-memory entries to disk.
    pub async fn commit(&self, batch: ImportBatch, choice: DuplicateChoice) -> Result<ImportReport> {
        let ImportBatch {
            mut new_entries,
            duplicates,
            source_label,
        } = batch;
        let duplicate_count = duplicates.len();
        let skipped = match choice {
            DuplicateChoice::Keep => {
                new_entries.extend(duplicates.into_iter().map(|mut record| {
                    record.is_duplicate = false;
                    record
                }));
                0
            }
            DuplicateChoice::Skip => duplicate_count,
        };

        let notifier = self.engine.notifier();
        if new_entries.is_empty() {
            notifier.notify(Toast::info(format!(
                "Import skipped. {duplicate_count} duplicates found."
            )));
            return Ok(ImportReport {
                imported: Vec::new(),
                skipped,
            });
        }

        self.engine.store().put_images(new_entries.clone()).await?;

        let mut imported = Vec::with_capacity(new_entries.len());
        for record in &new_entries {
            if record.blob.is_some() || record.locator().is_some() {
                self.engine.reconcile(&record.id, record).await;
            }
            imported.push(record.id.clone());
        }

        info!(
            source = %source_label,
            imported = imported.len(),
            skipped,
            "import committed"
        );
        let mut message = format!("Imported {} items.", imported.len());
        if skipped > 0 {
            message.push_str(&format!(" Skipped {skipped} duplicates."));
        }
        notifier.notify(Toast::success(message));
        Ok(ImportReport { imported, skipped })
    }

    /// Scan, ask the resolver when duplicates were found, then commit.
    pub async fn import(
        &self,
        candidates: Vec<ImportCandidate>,
        target: &SourceId,
        source_label: impl Into<String>,
    ) -> Result<ImportReport> {
        let batch = self.scan(candidates, target, source_label).await?;
        let choice = if batch.duplicates.is_empty() {
            DuplicateChoice::Skip
        } else {
            let choice = self.resolver.resolve(&batch).await;
            if choice == DuplicateChoice::Skip {
                warn!(
                    source = %batch.source_label,
                    duplicates = batch.duplicates.len(),
                    "skipping duplicate images"
                );
            }
            choice
        };
        self.commit(batch, choice).await
    }
}
