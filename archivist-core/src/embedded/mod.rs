//! Metadata embedded inside image files.
//!
//! Reading covers pixel dimensions, PNG text chunks and the EXIF fields image
//! generators write into. Writing is limited to PNG, where tags are stored as
//! text chunks; other formats report [`EmbeddedWrite::Unsupported`].

pub mod png;

use std::io::Cursor;

use archivist_model::ImageRecord;

/// Metadata found inside an image file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddedMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Generator parameter block (`parameters` PNG chunk).
    pub parameters: Option<String>,
    pub description: Option<String>,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub keywords: Option<String>,
    pub camera_model: Option<String>,
}

impl EmbeddedMetadata {
    /// Best candidate for generation-parameter parsing.
    pub fn generation_text(&self) -> Option<&str> {
        [&self.parameters, &self.description, &self.comment, &self.keywords]
            .into_iter()
            .filter_map(|value| value.as_deref())
            .map(str::trim)
            .find(|value| !value.is_empty())
    }
}

/// Tags written into image files on every sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedTags {
    pub id: String,
    pub title: String,
    pub description: String,
    pub rating: u8,
    pub keywords: Vec<String>,
}

impl EmbeddedTags {
    pub fn from_record(record: &ImageRecord) -> Self {
        Self {
            id: record.id.to_string(),
            title: record.title.clone(),
            description: record.prompt.clone(),
            rating: record.rating,
            keywords: record.tags.clone(),
        }
    }

    fn text_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Title", self.title.clone()),
            ("Description", self.description.clone()),
            ("Rating", self.rating.to_string()),
            ("Keywords", self.keywords.join(", ")),
            ("Archivist-Id", self.id.clone()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedWrite {
    Written,
    Unsupported,
}

/// Extract everything readable from `bytes`. Never fails; unknown formats
/// produce an empty result.
pub fn read_metadata(bytes: &[u8]) -> EmbeddedMetadata {
    let mut meta = EmbeddedMetadata::default();

    if let Some((width, height)) = dimensions(bytes) {
        meta.width = Some(width);
        meta.height = Some(height);
    }

    if png::is_png(bytes) {
        for (keyword, text) in png::text_entries(bytes) {
            let slot = match keyword.to_ascii_lowercase().as_str() {
                "parameters" => &mut meta.parameters,
                "description" | "imagedescription" => &mut meta.description,
                "title" => &mut meta.title,
                "comment" | "comments" | "usercomment" => &mut meta.comment,
                "keywords" | "subject" => &mut meta.keywords,
                _ => continue,
            };
            slot.get_or_insert(text);
        }
    }

    read_exif(bytes, &mut meta);
    meta
}

/// Bytes with `tags` embedded, or `None` for formats without support.
pub fn embed_tags(bytes: &[u8], tags: &EmbeddedTags) -> Option<Vec<u8>> {
    png::replace_text_entries(bytes, &tags.text_entries())
}

fn dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

fn read_exif(bytes: &[u8], meta: &mut EmbeddedMetadata) {
    let Ok(exif) = exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) else {
        return;
    };

    let text = |tag: exif::Tag| -> Option<String> {
        let field = exif.get_field(tag, exif::In::PRIMARY)?;
        let value = match &field.value {
            exif::Value::Ascii(parts) => parts
                .iter()
                .map(|part| String::from_utf8_lossy(part).into_owned())
                .collect::<Vec<_>>()
                .join(" "),
            // UserComment: 8-byte charset header, then the text.
            exif::Value::Undefined(raw, _) if raw.len() > 8 => {
                String::from_utf8_lossy(&raw[8..]).into_owned()
            }
            _ => return None,
        };
        let value = value.trim_matches(char::from(0)).trim().to_string();
        (!value.is_empty()).then_some(value)
    };

    if meta.description.is_none() {
        meta.description = text(exif::Tag::ImageDescription);
    }
    if meta.comment.is_none() {
        meta.comment = text(exif::Tag::UserComment);
    }
    if meta.camera_model.is_none() {
        meta.camera_model = text(exif::Tag::Model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_text_prefers_parameters() {
        let meta = EmbeddedMetadata {
            parameters: Some("a cat\nSteps: 20, Sampler: Euler".into()),
            description: Some("fallback".into()),
            ..EmbeddedMetadata::default()
        };
        assert_eq!(meta.generation_text(), Some("a cat\nSteps: 20, Sampler: Euler"));

        let blank = EmbeddedMetadata {
            parameters: Some("   ".into()),
            comment: Some("comment".into()),
            ..EmbeddedMetadata::default()
        };
        assert_eq!(blank.generation_text(), Some("comment"));
    }

    #[test]
    fn garbage_bytes_yield_empty_metadata() {
        assert_eq!(read_metadata(b"nope"), EmbeddedMetadata::default());
    }
}
