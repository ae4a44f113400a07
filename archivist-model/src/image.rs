use std::fmt;

use chrono::{DateTime, Utc};

use crate::ids::{ImageId, SourceId};
use crate::{DEFAULT_MODEL, DEFAULT_SAMPLER};

/// In-memory image payload held until the record is materialised to disk.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl ImageBlob {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    /// File extension used when the blob is written to a vault.
    pub fn extension(&self) -> &'static str {
        let mime = self.mime.to_ascii_lowercase();
        if mime.contains("jpeg") || mime.contains("jpg") {
            "jpg"
        } else if mime.contains("webp") {
            "webp"
        } else {
            "png"
        }
    }
}

impl fmt::Debug for ImageBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBlob")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// LoRA adapter referenced by generation metadata.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoraRef {
    pub name: String,
    pub weight: f32,
}

/// The central library entity.
///
/// `src` is a locator (`file://` or `media://`); `None` means the image only
/// exists in memory (see [`ImageRecord::blob`]) or has been deleted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct ImageRecord {
    pub id: ImageId,
    pub source_id: SourceId,
    pub src: Option<String>,
    /// Locator the file had before it was copied into the internal vault.
    pub original_src: Option<String>,
    pub hash: Option<String>,
    pub title: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub tags: Vec<String>,
    pub rating: u8,
    pub model: String,
    pub sampler: String,
    pub cfg_scale: f32,
    pub steps: u32,
    pub seed: i64,
    pub width: u32,
    pub height: u32,
    pub dominant_colors: Vec<String>,
    pub loras: Vec<LoraRef>,
    pub date: DateTime<Utc>,
    /// Import-time marker for entries kept despite a hash collision.
    pub is_duplicate: bool,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub blob: Option<ImageBlob>,
}

impl Default for ImageRecord {
    fn default() -> Self {
        Self::new("New Image")
    }
}

impl ImageRecord {
    /// Base record with library defaults, owned by the internal vault.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: ImageId::new(),
            source_id: SourceId::internal(),
            src: None,
            original_src: None,
            hash: None,
            title: title.into(),
            prompt: String::new(),
            negative_prompt: String::new(),
            tags: Vec::new(),
            rating: 0,
            model: DEFAULT_MODEL.to_string(),
            sampler: DEFAULT_SAMPLER.to_string(),
            cfg_scale: 7.0,
            steps: 20,
            seed: 0,
            width: 0,
            height: 0,
            dominant_colors: Vec::new(),
            loras: Vec::new(),
            date: Utc::now(),
            is_duplicate: false,
            blob: None,
        }
    }

    pub fn with_blob(mut self, blob: ImageBlob) -> Self {
        self.blob = Some(blob);
        self.src = None;
        self
    }

    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    pub fn with_source(mut self, source_id: SourceId) -> Self {
        self.source_id = source_id;
        self
    }

    /// Locator if one is set and non-empty.
    pub fn locator(&self) -> Option<&str> {
        self.src.as_deref().filter(|src| !src.trim().is_empty())
    }

    pub fn is_internal(&self) -> bool {
        self.source_id.is_internal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_record_carries_library_defaults() {
        let record = ImageRecord::new("sunset");
        assert!(record.is_internal());
        assert_eq!(record.model, "Unknown");
        assert_eq!(record.sampler, "Unknown");
        assert_eq!(record.steps, 20);
        assert_eq!(record.cfg_scale, 7.0);
        assert!(record.locator().is_none());
    }

    #[test]
    fn empty_src_is_not_a_locator() {
        let record = ImageRecord::new("x").with_src("  ");
        assert!(record.locator().is_none());
    }

    #[test]
    fn blob_extension_follows_mime() {
        assert_eq!(ImageBlob::new(vec![], "image/jpeg").extension(), "jpg");
        assert_eq!(ImageBlob::new(vec![], "image/webp").extension(), "webp");
        assert_eq!(ImageBlob::new(vec![], "image/gif").extension(), "png");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn blob_is_never_serialised() {
        let record = ImageRecord::new("x").with_blob(ImageBlob::new(vec![1, 2, 3], "image/png"));
        let json = serde_json::to_value(&record).expect("serialise");
        assert!(json.get("blob").is_none());
        assert!(json.get("sourceId").is_some());
    }
}
