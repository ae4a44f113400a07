use archivist_model::{ImagePatch, ImageRecord};
use serde::{Deserialize, Serialize};

/// The `.json` sidecar written next to every disk-backed image.
///
/// Only user-editable fields and the record id are stored. The locator and
/// the binary payload are never written, so a sidecar cannot point at a
/// stale path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SidecarDocument {
    pub id: Option<String>,
    pub title: Option<String>,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub model: Option<String>,
    pub sampler: Option<String>,
    pub cfg_scale: Option<f32>,
    pub steps: Option<u32>,
    pub seed: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub rating: Option<u8>,
}

impl SidecarDocument {
    pub fn from_record(record: &ImageRecord) -> Self {
        Self {
            id: Some(record.id.to_string()),
            title: Some(record.title.clone()),
            prompt: Some(record.prompt.clone()),
            negative_prompt: Some(record.negative_prompt.clone()),
            model: Some(record.model.clone()),
            sampler: Some(record.sampler.clone()),
            cfg_scale: Some(record.cfg_scale),
            steps: Some(record.steps),
            seed: Some(record.seed),
            tags: Some(record.tags.clone()),
            rating: Some(record.rating),
        }
    }

    /// Fields to merge into a record. The id is never part of the patch.
    pub fn to_patch(&self) -> ImagePatch {
        ImagePatch {
            title: self.title.clone(),
            prompt: self.prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            model: self.model.clone(),
            sampler: self.sampler.clone(),
            cfg_scale: self.cfg_scale,
            steps: self.steps,
            seed: self.seed,
            tags: self.tags.clone(),
            rating: self.rating,
            ..ImagePatch::default()
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
