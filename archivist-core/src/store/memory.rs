use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use archivist_model::{GeneralSettings, ImageId, ImagePatch, ImageRecord, LibrarySource, SourceId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{LibraryStore, locator_key};
use crate::error::Result;

/// Every table the library persists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryTables {
    pub images: BTreeMap<ImageId, ImageRecord>,
    pub sources: BTreeMap<SourceId, LibrarySource>,
    pub settings: Option<GeneralSettings>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<LibraryTables>>,
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("InMemoryStore");
        match self.tables.try_lock() {
            Ok(tables) => debug
                .field("images", &tables.images.len())
                .field("sources", &tables.sources.len()),
            Err(_) => debug.field("tables", &"<locked>"),
        };
        debug.finish()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: LibraryTables) -> Self {
        Self {
            tables: Arc::new(Mutex::new(tables)),
        }
    }

    /// Copy of every table, without in-memory blobs.
    pub async fn snapshot(&self) -> LibraryTables {
        let mut tables = self.tables.lock().await.clone();
        for record in tables.images.values_mut() {
            record.blob = None;
        }
        tables
    }
}

#[async_trait]
impl LibraryStore for InMemoryStore {
    async fn get_image(&self, id: &ImageId) -> Result<Option<ImageRecord>> {
        Ok(self.tables.lock().await.images.get(id).cloned())
    }

    async fn put_image(&self, record: ImageRecord) -> Result<()> {
        self.tables
            .lock()
            .await
            .images
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn put_images(&self, records: Vec<ImageRecord>) -> Result<()> {
        let mut tables = self.tables.lock().await;
        for record in records {
            tables.images.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn update_image(&self, id: &ImageId, patch: &ImagePatch) -> Result<Option<ImageRecord>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.images.get_mut(id).map(|record| {
            patch.apply(record);
            record.clone()
        }))
    }

    async fn delete_image(&self, id: &ImageId) -> Result<Option<ImageRecord>> {
        Ok(self.tables.lock().await.images.remove(id))
    }

    async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        Ok(self.tables.lock().await.images.values().cloned().collect())
    }

    async fn find_by_src(&self, src: &str) -> Result<Option<ImageRecord>> {
        let key = locator_key(src);
        let tables = self.tables.lock().await;
        Ok(tables
            .images
            .values()
            .find(|record| record.locator().is_some_and(|own| locator_key(own) == key))
            .cloned())
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<ImageRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .images
            .values()
            .find(|record| record.hash.as_deref() == Some(hash))
            .cloned())
    }

    async fn images_by_source(&self, source: &SourceId) -> Result<Vec<ImageRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .images
            .values()
            .filter(|record| &record.source_id == source)
            .cloned()
            .collect())
    }

    async fn get_source(&self, id: &SourceId) -> Result<Option<LibrarySource>> {
        Ok(self.tables.lock().await.sources.get(id).cloned())
    }

    async fn put_source(&self, source: LibrarySource) -> Result<()> {
        self.tables
            .lock()
            .await
            .sources
            .insert(source.id.clone(), source);
        Ok(())
    }

    async fn delete_source(&self, id: &SourceId) -> Result<Option<LibrarySource>> {
        Ok(self.tables.lock().await.sources.remove(id))
    }

    async fn list_sources(&self) -> Result<Vec<LibrarySource>> {
        Ok(self.tables.lock().await.sources.values().cloned().collect())
    }

    async fn load_settings(&self) -> Result<Option<GeneralSettings>> {
        Ok(self.tables.lock().await.settings.clone())
    }

    async fn save_settings(&self, settings: GeneralSettings) -> Result<()> {
        self.tables.lock().await.settings = Some(settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_applies_patch_and_returns_record() {
        let store = InMemoryStore::new();
        let record = ImageRecord::new("cat");
        let id = record.id.clone();
        store.put_image(record).await.unwrap();

        let updated = store
            .update_image(&id, &ImagePatch::title("dog"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "dog");
        assert!(
            store
                .update_image(&ImageId::new(), &ImagePatch::title("x"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn finds_by_src_across_locator_schemes() {
        let store = InMemoryStore::new();
        let record = ImageRecord::new("cat").with_src("file:///vault/cat.png");
        store.put_image(record.clone()).await.unwrap();

        let found = store.find_by_src("media:///vault/cat.png").await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(record.id));
        assert!(store.find_by_src("file:///vault/dog.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn snapshot_drops_blobs() {
        let store = InMemoryStore::new();
        let record = ImageRecord::new("cat")
            .with_blob(archivist_model::ImageBlob::new(vec![1, 2], "image/png"));
        store.put_image(record).await.unwrap();

        let snapshot = store.snapshot().await;
        assert!(snapshot.images.values().all(|r| r.blob.is_none()));
        assert!(store.list_images().await.unwrap()[0].blob.is_some());
    }
}
