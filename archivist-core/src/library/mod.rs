//! Caller-facing library operations.
//!
//! [`LibraryService`] routes every mutation through the disk sync engine
//! and the undo history, and owns the throttled refresh that recomputes
//! source counts.

pub mod rename;
pub mod service;

use archivist_model::{GeneralSettings, ImageRecord, LibrarySource};
use async_trait::async_trait;

pub use rename::RenamePattern;
pub use service::{LibraryService, SourceRemoval};

/// Something that can be asked to reload the library view.
#[async_trait]
pub trait RefreshSink: Send + Sync {
    async fn request_refresh(&self);
}

/// Result of a refresh: everything a view needs to render the library.
#[derive(Debug, Clone, Default)]
pub struct LibrarySnapshot {
    /// Newest first.
    pub images: Vec<ImageRecord>,
    /// Internal source first, each with a freshly computed count.
    pub sources: Vec<LibrarySource>,
    pub settings: GeneralSettings,
}

impl LibrarySnapshot {
    pub fn source(&self, id: &archivist_model::SourceId) -> Option<&LibrarySource> {
        self.sources.iter().find(|source| &source.id == id)
    }
}
