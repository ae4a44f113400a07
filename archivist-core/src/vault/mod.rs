//! Locator resolution and vault ownership.
//!
//! Records address files through locators (`file://` URLs, the internal
//! `media://` scheme, or bare absolute paths). Everything here is pure: the
//! filesystem is only consulted by [`naming::unique_path`] through the
//! provider.

pub mod locator;
pub mod naming;
pub mod roots;

pub use locator::{
    clean_path, file_url, is_disk_locator, is_within, media_url, path_key,
    resolve_locator, sidecar_base, sidecar_paths,
};
pub use naming::{sanitize_filename, split_file_name, title_from_path, unique_path};
pub use roots::VaultRoots;

/// Extensions recognised as library images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];

/// Extensions recognised as metadata sidecars.
pub const SIDECAR_EXTENSIONS: &[&str] = &["json", "txt"];

/// Lowercased extension of `path`, if any.
pub fn extension_of(path: &std::path::Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn is_image_path(path: &std::path::Path) -> bool {
    extension_of(path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_sidecar_path(path: &std::path::Path) -> bool {
    extension_of(path).is_some_and(|ext| SIDECAR_EXTENSIONS.contains(&ext.as_str()))
}
