//! Metadata sidecars: `<basename>.json` and `<basename>.txt`.
//!
//! Sidecars are derived state. They are regenerated from the record on every
//! sync and only read back when a file arrives from outside the app.

pub mod document;
pub mod generation;

use std::path::Path;

use archivist_model::ImageRecord;

use crate::error::{ArchiveError, Result};
use crate::provider::{FsProvider, WriteMode};

pub use document::SidecarDocument;
pub use generation::{GenerationData, parse_generation_data};

/// Write the sidecars for `record` next to `image_path`.
///
/// Files whose content would not change are left alone. Returns how many
/// files were actually written.
pub async fn write_sidecars(
    provider: &dyn FsProvider,
    image_path: &Path,
    record: &ImageRecord,
) -> Result<usize> {
    let mut written = 0;

    let json = SidecarDocument::from_record(record).to_json()?;
    if write_if_changed(provider, &image_path.with_extension("json"), json.as_bytes()).await? {
        written += 1;
    }

    if !record.prompt.is_empty()
        && write_if_changed(
            provider,
            &image_path.with_extension("txt"),
            record.prompt.as_bytes(),
        )
        .await?
    {
        written += 1;
    }
    Ok(written)
}

async fn write_if_changed(provider: &dyn FsProvider, path: &Path, data: &[u8]) -> Result<bool> {
    if provider.exists(path).await {
        if let Ok(current) = provider.read_file(path).await {
            if current == data {
                return Ok(false);
            }
        }
    }
    provider.write_file(path, data, WriteMode::Atomic).await?;
    Ok(true)
}

/// The `.json` sidecar next to `image_path`, if present.
pub async fn read_sidecar(
    provider: &dyn FsProvider,
    image_path: &Path,
) -> Result<Option<SidecarDocument>> {
    read_document(provider, &image_path.with_extension("json")).await
}

/// Parse a `.json` sidecar at its own path.
pub async fn read_document(
    provider: &dyn FsProvider,
    json_path: &Path,
) -> Result<Option<SidecarDocument>> {
    if !provider.exists(json_path).await {
        return Ok(None);
    }
    let text = provider.read_text(json_path).await?;
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|err| ArchiveError::SidecarParse(format!("{}: {err}", json_path.display())))
}

/// The `.txt` prompt sidecar next to `image_path`, if present and non-empty.
pub async fn read_prompt(provider: &dyn FsProvider, image_path: &Path) -> Option<String> {
    let path = image_path.with_extension("txt");
    if !provider.exists(&path).await {
        return None;
    }
    provider
        .read_text(&path)
        .await
        .ok()
        .filter(|text| !text.trim().is_empty())
}
