//! Core data model definitions shared across Archivist crates.
#![allow(missing_docs)]

pub mod error;
pub mod history;
pub mod ids;
pub mod image;
pub mod patch;
pub mod settings;
pub mod source;

pub use error::{ModelError, Result as ModelResult};
pub use history::{
    BackupRef, DeletedImage, HistoryAction, HistoryEntry, PatchedImage,
};
pub use ids::{ImageId, SourceId};
pub use image::{ImageBlob, ImageRecord, LoraRef};
pub use patch::ImagePatch;
pub use settings::GeneralSettings;
pub use source::{LibrarySource, SourceKind};

/// Model name recorded when generation metadata does not name one.
pub const DEFAULT_MODEL: &str = "Unknown";
/// Sampler name recorded when generation metadata does not name one.
pub const DEFAULT_SAMPLER: &str = "Unknown";
