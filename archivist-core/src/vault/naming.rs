use std::path::{Path, PathBuf};

use crate::provider::FsProvider;

/// Filesystem-safe name derived from a title.
///
/// Keeps ASCII letters, digits, `-`, `_` and spaces; whitespace runs become a
/// single `_`. An empty result falls back to `untitled`.
pub fn sanitize_filename(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ' '))
        .collect();
    let joined = kept.split_whitespace().collect::<Vec<_>>().join("_");
    if joined.is_empty() {
        "untitled".to_string()
    } else {
        joined
    }
}

/// File stem and lowercased extension (without the dot).
pub fn split_file_name(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_else(|| "png".to_string());
    (stem, ext)
}

/// Human title for a file picked up from disk.
pub fn title_from_path(path: &Path) -> String {
    let (stem, _) = split_file_name(path);
    let title = stem.replace('_', " ").trim().to_string();
    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title
    }
}

/// First free `dir/stem.ext`, `dir/stem_1.ext`, `dir/stem_2.ext`, ...
pub async fn unique_path(provider: &dyn FsProvider, dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let candidate = dir.join(format!("{stem}.{ext}"));
    if !provider.exists(&candidate).await {
        return candidate;
    }
    let mut counter: u32 = 1;
    loop {
        let candidate = dir.join(format!("{stem}_{counter}.{ext}"));
        if !provider.exists(&candidate).await {
            return candidate;
        }
        counter += 1;
    }
}
