use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use archivist_model::{ImageId, ImageRecord};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::BatchOutcome;
use crate::error::Result;
use crate::hashing::content_hash;
use crate::provider::FsProvider;
use crate::store::LibraryStore;
use crate::vault::is_disk_locator;

/// Fills in missing content hashes a few records at a time.
///
/// Records whose bytes cannot be read are remembered and skipped for the
/// rest of the session; they simply stay out of duplicate detection.
pub struct HashBackfill {
    store: Arc<dyn LibraryStore>,
    provider: Arc<dyn FsProvider>,
    batch_size: usize,
    unreadable: Mutex<HashSet<ImageId>>,
}

impl fmt::Debug for HashBackfill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashBackfill")
            .field("batch_size", &self.batch_size)
            .field("unreadable", &self.unreadable.lock().len())
            .finish()
    }
}

impl HashBackfill {
    pub fn new(store: Arc<dyn LibraryStore>, provider: Arc<dyn FsProvider>, batch_size: usize) -> Self {
        Self {
            store,
            provider,
            batch_size: batch_size.max(1),
            unreadable: Mutex::new(HashSet::new()),
        }
    }

    fn wants_hash(&self, record: &ImageRecord) -> bool {
        record.hash.is_none()
            && (record.blob.is_some() || record.locator().is_some_and(is_disk_locator))
            && !self.unreadable.lock().contains(&record.id)
    }

    pub async fn run_batch(&self) -> Result<BatchOutcome> {
        let pending: Vec<ImageRecord> = self
            .store
            .list_images()
            .await?
            .into_iter()
            .filter(|record| self.wants_hash(record))
            .collect();

        let mut outcome = BatchOutcome {
            remaining: pending.len().saturating_sub(self.batch_size),
            ..BatchOutcome::default()
        };

        for record in pending.into_iter().take(self.batch_size) {
            outcome.processed += 1;
            let Some(hash) = self.hash_of(&record).await else {
                self.unreadable.lock().insert(record.id.clone());
                continue;
            };

            let Some(mut current) = self.store.get_image(&record.id).await? else {
                continue;
            };
            if current.hash.is_some() {
                continue;
            }
            current.hash = Some(hash);
            self.store.put_image(current).await?;
            outcome.updated += 1;
        }

        if outcome.updated > 0 {
            debug!(updated = outcome.updated, remaining = outcome.remaining, "hash backfill batch");
        }
        Ok(outcome)
    }

    async fn hash_of(&self, record: &ImageRecord) -> Option<String> {
        if let Some(blob) = &record.blob {
            return Some(content_hash(&blob.bytes));
        }
        let locator = record.locator()?;
        let hashed = match self.provider.real_path(locator).await {
            Ok(path) => self.provider.calculate_hash(&path).await,
            Err(err) => Err(err),
        };
        match hashed {
            Ok(hash) => Some(hash),
            Err(err) => {
                warn!(id = %record.id, locator, error = %err, "hash backfill skipped record");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use archivist_model::ImageBlob;

    use super::*;
    use crate::provider::InMemoryProvider;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn hashes_disk_and_blob_records_in_batches() {
        let fs = Arc::new(InMemoryProvider::with_vault("/vault"));
        let store = Arc::new(InMemoryStore::new());
        fs.insert_file("/vault/a.png", b"a".to_vec());
        fs.insert_file("/vault/b.png", b"b".to_vec());

        let a = ImageRecord::new("a").with_src("file:///vault/a.png");
        let b = ImageRecord::new("b").with_src("file:///vault/b.png");
        let c = ImageRecord::new("c").with_blob(ImageBlob::new(b"c".to_vec(), "image/png"));
        store.put_images(vec![a.clone(), b, c]).await.unwrap();

        let backfill = HashBackfill::new(store.clone(), fs, 2);
        let first = backfill.run_batch().await.unwrap();
        assert_eq!((first.processed, first.updated, first.remaining), (2, 2, 1));
        assert!(first.has_more());

        let second = backfill.run_batch().await.unwrap();
        assert_eq!((second.updated, second.remaining), (1, 0));

        let stored = store.get_image(&a.id).await.unwrap().unwrap();
        assert_eq!(stored.hash.as_deref(), Some(content_hash(b"a").as_str()));
    }

    #[tokio::test]
    async fn missing_files_are_not_retried() {
        let fs = Arc::new(InMemoryProvider::with_vault("/vault"));
        let store = Arc::new(InMemoryStore::new());
        store
            .put_image(ImageRecord::new("gone").with_src("file:///vault/gone.png"))
            .await
            .unwrap();

        let backfill = HashBackfill::new(store, fs, 10);
        let first = backfill.run_batch().await.unwrap();
        assert_eq!((first.processed, first.updated), (1, 0));
        assert_eq!(backfill.run_batch().await.unwrap().processed, 0);
    }
}
