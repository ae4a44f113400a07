use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::provider::FsProvider;
use crate::vault::{extension_of, title_from_path};

/// MIME type for an image extension; unknown extensions are treated as PNG.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "image/png",
    }
}

/// One image offered for import, with an optional prompt file.
#[derive(Clone)]
pub struct ImportCandidate {
    pub title: String,
    pub bytes: Vec<u8>,
    pub mime: String,
    /// Where the file already lives, when it came from disk.
    pub path: Option<PathBuf>,
    /// Contents of a sibling `.txt` file.
    pub text: Option<String>,
}

impl fmt::Debug for ImportCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportCandidate")
            .field("title", &self.title)
            .field("bytes", &self.bytes.len())
            .field("mime", &self.mime)
            .field("path", &self.path)
            .field("has_text", &self.text.is_some())
            .finish()
    }
}

impl ImportCandidate {
    pub fn new(title: impl Into<String>, bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            bytes,
            mime: mime.into(),
            path: None,
            text: None,
        }
    }

    /// Candidate named after `path`, for bytes read by the caller.
    pub fn from_file(path: &Path, bytes: Vec<u8>) -> Self {
        let mime = mime_for_extension(&extension_of(path).unwrap_or_default());
        let mut candidate = Self::new(title_from_path(path), bytes, mime);
        candidate.path = Some(path.to_path_buf());
        candidate
    }

    /// Read an image and its `.txt` sibling through the provider.
    pub async fn from_path(provider: &dyn FsProvider, path: &Path) -> Result<Self> {
        let bytes = provider.read_file(path).await?;
        let mut candidate = Self::from_file(path, bytes);
        let text_path = path.with_extension("txt");
        if provider.exists(&text_path).await {
            candidate.text = provider.read_text(&text_path).await.ok();
        }
        Ok(candidate)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryProvider;

    #[tokio::test]
    async fn reads_image_and_prompt_file() {
        let fs = InMemoryProvider::with_vault("/vault");
        fs.insert_file("/vault/night_owl.JPG", b"owl".to_vec());
        fs.insert_file("/vault/night_owl.txt", b"an owl".to_vec());

        let candidate = ImportCandidate::from_path(&fs, Path::new("/vault/night_owl.JPG"))
            .await
            .unwrap();
        assert_eq!(candidate.title, "night owl");
        assert_eq!(candidate.mime, "image/jpeg");
        assert_eq!(candidate.text.as_deref(), Some("an owl"));
    }
}
