use crate::ids::SourceId;
use crate::image::{ImageRecord, LoraRef};

/// Partial update of the user-editable fields of an [`ImageRecord`].
///
/// Locator and blob are deliberately absent: they are owned by the disk sync
/// engine and are never part of an edit or of its inverse.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct ImagePatch {
    pub source_id: Option<SourceId>,
    pub title: Option<String>,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub tags: Option<Vec<String>>,
    pub rating: Option<u8>,
    pub model: Option<String>,
    pub sampler: Option<String>,
    pub cfg_scale: Option<f32>,
    pub steps: Option<u32>,
    pub seed: Option<i64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub dominant_colors: Option<Vec<String>>,
    pub loras: Option<Vec<LoraRef>>,
}

macro_rules! patch_fields {
    ($mac:ident) => {
        $mac!(
            source_id,
            title,
            prompt,
            negative_prompt,
            tags,
            rating,
            model,
            sampler,
            cfg_scale,
            steps,
            seed,
            width,
            height,
            dominant_colors,
            loras
        )
    };
}

impl ImagePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn source(source_id: SourceId) -> Self {
        Self {
            source_id: Some(source_id),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        macro_rules! all_none {
            ($($field:ident),*) => { $(self.$field.is_none())&&* };
        }
        patch_fields!(all_none)
    }

    /// Write every set field into `record`.
    pub fn apply(&self, record: &mut ImageRecord) {
        macro_rules! assign {
            ($($field:ident),*) => {
                $(if let Some(value) = &self.$field {
                    record.$field = value.clone();
                })*
            };
        }
        patch_fields!(assign);
    }

    /// Patch restoring the values `record` holds for every field this patch
    /// touches.
    pub fn inverse(&self, record: &ImageRecord) -> ImagePatch {
        let mut inverse = ImagePatch::default();
        macro_rules! capture {
            ($($field:ident),*) => {
                $(if self.$field.is_some() {
                    inverse.$field = Some(record.$field.clone());
                })*
            };
        }
        patch_fields!(capture);
        inverse
    }

    /// Drop fields whose value already matches `record`.
    pub fn without_noops(mut self, record: &ImageRecord) -> ImagePatch {
        macro_rules! prune {
            ($($field:ident),*) => {
                $(if self.$field.as_ref() == Some(&record.$field) {
                    self.$field = None;
                })*
            };
        }
        patch_fields!(prune);
        self
    }
}
