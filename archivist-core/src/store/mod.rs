//! Persistence port for library records.
//!
//! The store only guarantees single-record atomicity. Anything spanning
//! several records (source counts, duplicate sets) is recomputed by callers.

pub mod json_file;
pub mod memory;

use archivist_model::{GeneralSettings, ImageId, ImagePatch, ImageRecord, LibrarySource, SourceId};
use async_trait::async_trait;

use crate::error::Result;
use crate::vault::{path_key, resolve_locator};

pub use json_file::JsonFileStore;
pub use memory::{InMemoryStore, LibraryTables};

#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn get_image(&self, id: &ImageId) -> Result<Option<ImageRecord>>;

    /// Insert or replace.
    async fn put_image(&self, record: ImageRecord) -> Result<()>;

    async fn put_images(&self, records: Vec<ImageRecord>) -> Result<()>;

    /// Apply `patch` to an existing record; `None` when the id is unknown.
    async fn update_image(&self, id: &ImageId, patch: &ImagePatch) -> Result<Option<ImageRecord>>;

    async fn delete_image(&self, id: &ImageId) -> Result<Option<ImageRecord>>;

    async fn list_images(&self) -> Result<Vec<ImageRecord>>;

    /// Record whose locator names the same file as `src`.
    async fn find_by_src(&self, src: &str) -> Result<Option<ImageRecord>>;

    async fn find_by_hash(&self, hash: &str) -> Result<Option<ImageRecord>>;

    async fn images_by_source(&self, source: &SourceId) -> Result<Vec<ImageRecord>>;

    async fn get_source(&self, id: &SourceId) -> Result<Option<LibrarySource>>;

    async fn put_source(&self, source: LibrarySource) -> Result<()>;

    async fn delete_source(&self, id: &SourceId) -> Result<Option<LibrarySource>>;

    async fn list_sources(&self) -> Result<Vec<LibrarySource>>;

    async fn load_settings(&self) -> Result<Option<GeneralSettings>>;

    async fn save_settings(&self, settings: GeneralSettings) -> Result<()>;
}

/// Comparison key for locators: `file://` and `media://` forms of the same
/// path compare equal.
pub fn locator_key(src: &str) -> String {
    resolve_locator(src)
        .map(|path| path_key(&path))
        .unwrap_or_else(|_| src.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_forms_share_a_key() {
        assert_eq!(
            locator_key("file:///Vault/My%20Cat.png"),
            locator_key("media:///vault/my%20cat.png")
        );
        assert_eq!(locator_key("blob:xyz"), "blob:xyz");
    }
}
