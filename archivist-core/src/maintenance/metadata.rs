use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use archivist_model::{DEFAULT_MODEL, ImageId, ImageRecord};
use parking_lot::Mutex;
use tracing::debug;

use super::BatchOutcome;
use super::enrich::enrich_record;
use crate::error::Result;
use crate::provider::FsProvider;
use crate::store::LibraryStore;
use crate::vault::is_disk_locator;

/// Background metadata enrichment.
///
/// Each record is attempted at most once per session, whether or not the
/// attempt found anything.
pub struct MetadataEnrichment {
    store: Arc<dyn LibraryStore>,
    provider: Arc<dyn FsProvider>,
    batch_size: usize,
    processed: Mutex<HashSet<ImageId>>,
}

impl fmt::Debug for MetadataEnrichment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataEnrichment")
            .field("batch_size", &self.batch_size)
            .field("processed", &self.processed.lock().len())
            .finish()
    }
}

fn needs_enrichment(record: &ImageRecord) -> bool {
    let incomplete =
        record.width == 0 || record.model == DEFAULT_MODEL || record.dominant_colors.is_empty();
    let readable = record.blob.is_some() || record.locator().is_some_and(is_disk_locator);
    incomplete && readable
}

impl MetadataEnrichment {
    pub fn new(store: Arc<dyn LibraryStore>, provider: Arc<dyn FsProvider>, batch_size: usize) -> Self {
        Self {
            store,
            provider,
            batch_size: batch_size.max(1),
            processed: Mutex::new(HashSet::new()),
        }
    }

    /// Mark a record as handled, e.g. after the watcher enriched it on import.
    pub fn mark_processed(&self, id: &ImageId) {
        self.processed.lock().insert(id.clone());
    }

    pub async fn run_batch(&self) -> Result<BatchOutcome> {
        let candidates: Vec<ImageId> = {
            let images = self.store.list_images().await?;
            let processed = self.processed.lock();
            images
                .into_iter()
                .filter(|record| !processed.contains(&record.id) && needs_enrichment(record))
                .map(|record| record.id)
                .collect()
        };

        let mut outcome = BatchOutcome {
            remaining: candidates.len().saturating_sub(self.batch_size),
            ..BatchOutcome::default()
        };

        for id in candidates.into_iter().take(self.batch_size) {
            self.processed.lock().insert(id.clone());
            outcome.processed += 1;

            let Some(record) = self.store.get_image(&id).await? else {
                continue;
            };
            let path = match record.locator() {
                Some(locator) if is_disk_locator(locator) => {
                    self.provider.real_path(locator).await.ok()
                }
                _ => None,
            };
            let enrichment = enrich_record(self.provider.as_ref(), &record, path.as_deref())
                .await
                .protect_user_fields(&record);
            if enrichment.is_empty() {
                continue;
            }
            if self.store.update_image(&id, &enrichment.patch).await?.is_some() {
                debug!(id = %id, "metadata enriched");
                outcome.updated += 1;
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryProvider;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn enriches_from_sidecar_once_per_session() {
        let fs = Arc::new(InMemoryProvider::with_vault("/vault"));
        let store = Arc::new(InMemoryStore::new());
        fs.insert_file("/vault/owl.png", b"owl".to_vec());
        fs.insert_file("/vault/owl.json", br#"{"model":"flux","prompt":"an owl"}"#.to_vec());

        let record = ImageRecord::new("owl").with_src("file:///vault/owl.png");
        store.put_image(record.clone()).await.unwrap();

        let enrichment = MetadataEnrichment::new(store.clone(), fs, 5);
        let first = enrichment.run_batch().await.unwrap();
        assert_eq!((first.processed, first.updated), (1, 1));

        let stored = store.get_image(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.model, "flux");
        assert_eq!(stored.prompt, "an owl");
        assert_eq!(stored.dominant_colors, vec!["#000000".to_string()]);

        assert_eq!(enrichment.run_batch().await.unwrap().processed, 0);
    }

    #[tokio::test]
    async fn records_without_bytes_are_not_candidates() {
        let fs = Arc::new(InMemoryProvider::with_vault("/vault"));
        let store = Arc::new(InMemoryStore::new());
        store.put_image(ImageRecord::new("bare")).await.unwrap();

        let enrichment = MetadataEnrichment::new(store, fs, 5);
        assert_eq!(enrichment.run_batch().await.unwrap(), BatchOutcome::default());
    }
}
