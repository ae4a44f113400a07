use std::path::Path;

use archivist_model::{ImagePatch, ImageRecord};
use tracing::{debug, warn};

use super::colors::dominant_colors_or_fallback;
use crate::embedded::{self, EmbeddedMetadata};
use crate::provider::FsProvider;
use crate::sidecar::{parse_generation_data, read_prompt, read_sidecar};

/// Fields discovered for a record from its sidecars, embedded metadata and
/// pixels. Only values that differ from the record are set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub patch: ImagePatch,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty()
    }

    /// Drop fields the user has already filled in.
    pub fn protect_user_fields(mut self, record: &ImageRecord) -> Self {
        if !record.prompt.trim().is_empty() {
            self.patch.prompt = None;
        }
        if !record.negative_prompt.trim().is_empty() {
            self.patch.negative_prompt = None;
        }
        if !record.tags.is_empty() {
            self.patch.tags = None;
        }
        if record.rating > 0 {
            self.patch.rating = None;
        }
        self
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Gather metadata for `record`.
///
/// Disk-backed records read the `.json` sidecar (never id or location), the
/// `.txt` prompt when no prompt was found, and embedded generation text.
/// Blob-only records are inspected from memory. Dominant colours are only
/// computed when the record has none.
pub async fn enrich_record(
    provider: &dyn FsProvider,
    record: &ImageRecord,
    path: Option<&Path>,
) -> Enrichment {
    let mut found = ImagePatch::default();
    let mut meta = EmbeddedMetadata::default();
    let mut pixels: Option<Vec<u8>> = None;

    if let Some(path) = path {
        match read_sidecar(provider, path).await {
            Ok(Some(document)) => found = document.to_patch(),
            Ok(None) => {}
            Err(err) => debug!(path = %path.display(), error = %err, "ignoring unreadable sidecar"),
        }
        if non_empty(found.prompt.as_deref()).is_none() {
            found.prompt = read_prompt(provider, path).await;
        }
        match provider.read_file(path).await {
            Ok(bytes) => {
                meta = embedded::read_metadata(&bytes);
                pixels = Some(bytes);
            }
            Err(err) => warn!(path = %path.display(), error = %err, "metadata enrichment could not read image"),
        }
    } else if let Some(blob) = &record.blob {
        meta = embedded::read_metadata(&blob.bytes);
        pixels = Some(blob.bytes.clone());
    }

    let generation = parse_generation_data(meta.generation_text().unwrap_or_default());

    let width = meta
        .width
        .or(generation.width)
        .filter(|w| *w > 0)
        .unwrap_or(record.width);
    let height = meta
        .height
        .or(generation.height)
        .filter(|h| *h > 0)
        .unwrap_or(record.height);
    let model = non_empty(found.model.as_deref())
        .or_else(|| non_empty(meta.camera_model.as_deref()))
        .or_else(|| non_empty(generation.model.as_deref()))
        .unwrap_or_else(|| record.model.clone());
    let sampler = non_empty(found.sampler.as_deref())
        .or_else(|| non_empty(generation.sampler.as_deref()))
        .unwrap_or_else(|| record.sampler.clone());
    let cfg_scale = found
        .cfg_scale
        .filter(|cfg| *cfg != 0.0)
        .or(generation.cfg_scale.filter(|cfg| *cfg != 0.0))
        .unwrap_or(record.cfg_scale);
    let steps = found
        .steps
        .filter(|steps| *steps > 0)
        .or(generation.steps.filter(|steps| *steps > 0))
        .unwrap_or(record.steps);
    let seed = found
        .seed
        .filter(|seed| *seed != 0)
        .or(generation.seed.filter(|seed| *seed != 0))
        .unwrap_or(record.seed);
    let prompt = non_empty(found.prompt.as_deref())
        .or_else(|| non_empty(generation.prompt.as_deref()))
        .or_else(|| non_empty(meta.description.as_deref()))
        .or_else(|| non_empty(meta.title.as_deref()))
        .unwrap_or_else(|| record.prompt.clone());
    let negative_prompt = non_empty(found.negative_prompt.as_deref())
        .or_else(|| non_empty(generation.negative_prompt.as_deref()))
        .unwrap_or_else(|| record.negative_prompt.clone());

    let mut patch = ImagePatch {
        title: found.title.filter(|title| !title.trim().is_empty()),
        tags: found.tags,
        rating: found.rating,
        width: Some(width),
        height: Some(height),
        model: Some(model),
        sampler: Some(sampler),
        cfg_scale: Some(cfg_scale),
        steps: Some(steps),
        seed: Some(seed),
        prompt: Some(prompt),
        negative_prompt: Some(negative_prompt),
        loras: generation.loras,
        ..ImagePatch::default()
    };

    if record.dominant_colors.is_empty()
        && let Some(bytes) = pixels.as_deref()
    {
        patch.dominant_colors = Some(dominant_colors_or_fallback(bytes));
    }

    Enrichment {
        patch: patch.without_noops(record),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::provider::InMemoryProvider;

    #[tokio::test]
    async fn sidecars_feed_the_patch_but_never_the_id() {
        let fs = InMemoryProvider::with_vault("/vault");
        fs.insert_file("/vault/fox.png", b"not really a png".to_vec());
        fs.insert_file(
            "/vault/fox.json",
            br#"{"id":"someone-else","title":"Red fox","model":"sdxl","steps":30}"#.to_vec(),
        );
        fs.insert_file("/vault/fox.txt", b"a red fox at night".to_vec());

        let record = ImageRecord::new("fox").with_src("file:///vault/fox.png");
        let path = PathBuf::from("/vault/fox.png");
        let enrichment = enrich_record(&fs, &record, Some(&path)).await;

        let patch = &enrichment.patch;
        assert_eq!(patch.title.as_deref(), Some("Red fox"));
        assert_eq!(patch.model.as_deref(), Some("sdxl"));
        assert_eq!(patch.steps, Some(30));
        assert_eq!(patch.prompt.as_deref(), Some("a red fox at night"));
        assert_eq!(patch.dominant_colors, Some(vec!["#000000".to_string()]));
        assert!(patch.source_id.is_none());
    }

    #[tokio::test]
    async fn user_fields_are_protected() {
        let mut record = ImageRecord::new("fox");
        record.prompt = "my own words".into();
        record.rating = 4;
        let enrichment = Enrichment {
            patch: ImagePatch {
                prompt: Some("scraped".into()),
                rating: Some(1),
                model: Some("sdxl".into()),
                ..ImagePatch::default()
            },
        }
        .protect_user_fields(&record);

        assert!(enrichment.patch.prompt.is_none());
        assert!(enrichment.patch.rating.is_none());
        assert_eq!(enrichment.patch.model.as_deref(), Some("sdxl"));
    }

    #[tokio::test]
    async fn records_without_files_or_blobs_gain_nothing() {
        let fs = InMemoryProvider::with_vault("/vault");
        let enrichment = enrich_record(&fs, &ImageRecord::new("x"), None).await;
        assert!(enrichment.is_empty());
    }
}
