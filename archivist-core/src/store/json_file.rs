use std::fmt;
use std::path::{Path, PathBuf};

use archivist_model::{GeneralSettings, ImageId, ImagePatch, ImageRecord, LibrarySource, SourceId};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{InMemoryStore, LibraryStore, LibraryTables};
use crate::error::{ArchiveError, Result};

/// [`InMemoryStore`] persisted to a JSON snapshot after every mutation.
pub struct JsonFileStore {
    inner: InMemoryStore,
    path: PathBuf,
    persist_lock: Mutex<()>,
}

impl fmt::Debug for JsonFileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFileStore")
            .field("path", &self.path)
            .field("inner", &self.inner)
            .finish()
    }
}

impl JsonFileStore {
    /// Load the snapshot at `path`, or start empty when it does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tables = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<LibraryTables>(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no library snapshot yet, starting empty");
                LibraryTables::default()
            }
            Err(err) => return Err(err.into()),
        };
        debug!(
            path = %path.display(),
            images = tables.images.len(),
            sources = tables.sources.len(),
            "library snapshot loaded"
        );
        Ok(Self {
            inner: InMemoryStore::from_tables(tables),
            path,
            persist_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.inner.snapshot().await;
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self
            .path
            .with_extension(format!("json.tmp.{}", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &bytes).await.map_err(|err| {
            ArchiveError::Internal(format!("failed to write {}: {err}", tmp.display()))
        })?;
        if let Err(err) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ArchiveError::Internal(format!(
                "failed to replace {}: {err}",
                self.path.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LibraryStore for JsonFileStore {
    async fn get_image(&self, id: &ImageId) -> Result<Option<ImageRecord>> {
        self.inner.get_image(id).await
    }

    async fn put_image(&self, record: ImageRecord) -> Result<()> {
        self.inner.put_image(record).await?;
        self.persist().await
    }

    async fn put_images(&self, records: Vec<ImageRecord>) -> Result<()> {
        self.inner.put_images(records).await?;
        self.persist().await
    }

    async fn update_image(&self, id: &ImageId, patch: &ImagePatch) -> Result<Option<ImageRecord>> {
        let updated = self.inner.update_image(id, patch).await?;
        if updated.is_some() {
            self.persist().await?;
        }
        Ok(updated)
    }

    async fn delete_image(&self, id: &ImageId) -> Result<Option<ImageRecord>> {
        let removed = self.inner.delete_image(id).await?;
        if removed.is_some() {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        self.inner.list_images().await
    }

    async fn find_by_src(&self, src: &str) -> Result<Option<ImageRecord>> {
        self.inner.find_by_src(src).await
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<ImageRecord>> {
        self.inner.find_by_hash(hash).await
    }

    async fn images_by_source(&self, source: &SourceId) -> Result<Vec<ImageRecord>> {
        self.inner.images_by_source(source).await
    }

    async fn get_source(&self, id: &SourceId) -> Result<Option<LibrarySource>> {
        self.inner.get_source(id).await
    }

    async fn put_source(&self, source: LibrarySource) -> Result<()> {
        self.inner.put_source(source).await?;
        self.persist().await
    }

    async fn delete_source(&self, id: &SourceId) -> Result<Option<LibrarySource>> {
        let removed = self.inner.delete_source(id).await?;
        if removed.is_some() {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn list_sources(&self) -> Result<Vec<LibrarySource>> {
        self.inner.list_sources().await
    }

    async fn load_settings(&self) -> Result<Option<GeneralSettings>> {
        self.inner.load_settings().await
    }

    async fn save_settings(&self, settings: GeneralSettings) -> Result<()> {
        self.inner.save_settings(settings).await?;
        self.persist().await
    }
}
