use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::error::{ArchiveError, Result};

pub const FILE_SCHEME: &str = "file://";
pub const MEDIA_SCHEME: &str = "media://";

static DRIVE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/[A-Za-z]:[/\\]").expect("valid drive prefix regex")
});

static DRIVE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]:[/\\]").expect("valid drive regex"));

/// True when the locator points at a file on disk rather than memory.
pub fn is_disk_locator(locator: &str) -> bool {
    let trimmed = locator.trim();
    trimmed.starts_with(FILE_SCHEME)
        || trimmed.starts_with(MEDIA_SCHEME)
        || is_bare_path(trimmed)
}

fn is_bare_path(value: &str) -> bool {
    !value.is_empty()
        && (Path::new(value).is_absolute()
            || value.starts_with('/')
            || DRIVE_PATH.is_match(value))
}

/// Map a locator (`file://`, `media://` or a bare absolute path) to a native
/// path.
pub fn resolve_locator(locator: &str) -> Result<PathBuf> {
    let trimmed = locator.trim();
    if trimmed.is_empty() {
        return Err(ArchiveError::PathResolution("empty locator".into()));
    }

    let encoded = if let Some(rest) = trimmed.strip_prefix(FILE_SCHEME) {
        rest
    } else if let Some(rest) = trimmed.strip_prefix(MEDIA_SCHEME) {
        rest
    } else if is_bare_path(trimmed) {
        return Ok(clean_path(Path::new(trimmed)));
    } else {
        return Err(ArchiveError::PathResolution(trimmed.to_string()));
    };

    let decoded = urlencoding::decode(encoded)
        .map_err(|err| ArchiveError::PathResolution(format!("{trimmed}: {err}")))?;

    // `file:///C:/x` and `media:///C:/x` carry a slash before the drive.
    let without_root = decoded.trim_start_matches('/');
    let native = if DRIVE_PATH.is_match(without_root) {
        without_root.to_string()
    } else {
        format!("/{without_root}")
    };

    if DRIVE_PREFIX.is_match(&native) {
        return Ok(clean_path(Path::new(&native[1..])));
    }
    Ok(clean_path(Path::new(&native)))
}

/// `file://` locator for a native path.
pub fn file_url(path: &Path) -> String {
    match Url::from_file_path(path) {
        Ok(url) => url.to_string(),
        Err(()) => {
            let raw = path.to_string_lossy().replace('\\', "/");
            format!("{FILE_SCHEME}/{}", raw.trim_start_matches('/'))
        }
    }
}

/// Internal `media://` locator with every segment percent-encoded.
pub fn media_url(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let encoded: Vec<String> = raw
        .trim_start_matches('/')
        .split('/')
        .map(|segment| {
            // Keep `C:` readable so the drive survives a round trip.
            if segment.len() == 2 && segment.ends_with(':') {
                segment.to_string()
            } else {
                urlencoding::encode(segment).into_owned()
            }
        })
        .collect();
    format!("{MEDIA_SCHEME}/{}", encoded.join("/"))
}

/// Comparison key: forward slashes, lowercase, no trailing separator.
pub fn path_key(path: &Path) -> String {
    let mut key = path.to_string_lossy().replace('\\', "/").to_lowercase();
    while key.len() > 1 && key.ends_with('/') {
        key.pop();
    }
    key
}

/// `path` equals `root` or is nested under `root` plus a separator.
pub fn is_within(path: &Path, root: &Path) -> bool {
    let candidate = path_key(path);
    let root_key = path_key(root);
    if candidate == root_key {
        return true;
    }
    if root_key == "/" {
        return candidate.starts_with('/');
    }
    candidate.starts_with(&format!("{root_key}/"))
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    clean.push(component.as_os_str());
                }
            }
            other => clean.push(other.as_os_str()),
        }
    }
    clean
}

/// Path without its extension; sidecars hang off this base.
pub fn sidecar_base(path: &Path) -> PathBuf {
    path.with_extension("")
}

/// `.json` and `.txt` sidecar paths for an image.
pub fn sidecar_paths(path: &Path) -> [PathBuf; 2] {
    [path.with_extension("json"), path.with_extension("txt")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_every_locator_form() {
        let expected = PathBuf::from("/vault/internal/cat.png");
        assert_eq!(resolve_locator("file:///vault/internal/cat.png").unwrap(), expected);
        assert_eq!(resolve_locator("media:///vault/internal/cat.png").unwrap(), expected);
        assert_eq!(resolve_locator("media://vault/internal/cat.png").unwrap(), expected);
        assert_eq!(resolve_locator("/vault/internal/cat.png").unwrap(), expected);
    }

    #[test]
    fn decodes_percent_escapes() {
        let path = resolve_locator("file:///vault/my%20cat.png").unwrap();
        assert_eq!(path, PathBuf::from("/vault/my cat.png"));
    }

    #[test]
    fn strips_slash_before_drive_letter() {
        let path = resolve_locator("file:///C:/Pictures/cat.png").unwrap();
        assert_eq!(path, PathBuf::from("C:/Pictures/cat.png"));
    }

    #[test]
    fn rejects_unmappable_locators() {
        for locator in ["", "blob:abc", "data:image/png;base64,AAAA", "relative/cat.png"] {
            assert!(matches!(
                resolve_locator(locator),
                Err(ArchiveError::PathResolution(_))
            ));
        }
    }

    #[test]
    fn file_url_round_trips() {
        let path = Path::new("/Users/me/Pictures/cat.png");
        assert_eq!(file_url(path), "file:///Users/me/Pictures/cat.png");
        let spaced = Path::new("/Users/me/My Pictures/cat 1.png");
        assert_eq!(resolve_locator(&file_url(spaced)).unwrap(), spaced);
    }

    #[test]
    fn media_url_encodes_segments() {
        let path = Path::new("/vault/a b/c#d.png");
        let url = media_url(path);
        assert_eq!(url, "media:///vault/a%20b/c%23d.png");
        assert_eq!(resolve_locator(&url).unwrap(), path);
    }

    #[test]
    fn sibling_prefix_is_not_within_root() {
        let root = Path::new("/vaultA");
        assert!(is_within(Path::new("/vaultA"), root));
        assert!(is_within(Path::new("/vaulta/img.png"), root));
        assert!(!is_within(Path::new("/vaultA-backup/img.png"), root));
    }

    #[test]
    fn clean_path_drops_parent_segments() {
        assert_eq!(
            clean_path(Path::new("/vault/a/../b/./c.png")),
            PathBuf::from("/vault/b/c.png")
        );
    }
}
