use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{ArchiveError, Result};
use crate::vault::{clean_path, is_within, path_key};

/// Vault roots a provider is permitted to touch.
///
/// The internal vault is always allowed once configured. Linked folders are
/// added when the user links them and removed when they are unlinked.
#[derive(Debug, Default)]
pub struct AllowList {
    internal: RwLock<Option<PathBuf>>,
    linked: RwLock<Vec<PathBuf>>,
}

impl AllowList {
    pub fn new(internal: Option<PathBuf>) -> Self {
        Self {
            internal: RwLock::new(internal.map(|root| clean_path(&root))),
            linked: RwLock::new(Vec::new()),
        }
    }

    pub fn set_internal(&self, root: Option<PathBuf>) {
        *self.internal.write() = root.map(|root| clean_path(&root));
    }

    pub fn internal(&self) -> Option<PathBuf> {
        self.internal.read().clone()
    }

    pub fn add_root(&self, root: &Path) {
        let root = clean_path(root);
        let key = path_key(&root);
        let mut linked = self.linked.write();
        if !linked.iter().any(|existing| path_key(existing) == key) {
            linked.push(root);
        }
    }

    pub fn remove_root(&self, root: &Path) {
        let key = path_key(&clean_path(root));
        self.linked.write().retain(|existing| path_key(existing) != key);
    }

    /// Internal root first, then linked roots in registration order.
    pub fn roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self.internal.read().iter().cloned().collect();
        roots.extend(self.linked.read().iter().cloned());
        roots
    }

    pub fn is_allowed(&self, path: &Path) -> bool {
        let path = clean_path(path);
        path.is_absolute() && self.roots().iter().any(|root| is_within(&path, root))
    }

    /// Lexically normalised `path` when it lies inside a registered root.
    pub fn authorize(&self, path: &Path) -> Result<PathBuf> {
        let clean = clean_path(path);
        if self.is_allowed(&clean) {
            Ok(clean)
        } else {
            Err(ArchiveError::UnauthorizedPath(path.to_path_buf()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_root_is_always_allowed() {
        let allow = AllowList::new(Some(PathBuf::from("/vault/internal")));
        assert!(allow.is_allowed(Path::new("/vault/internal/cat.png")));
        assert!(!allow.is_allowed(Path::new("/vault/other/cat.png")));
    }

    #[test]
    fn linked_roots_come_and_go() {
        let allow = AllowList::new(None);
        let pictures = Path::new("/Users/me/Pictures");
        assert!(allow.authorize(&pictures.join("cat.png")).is_err());

        allow.add_root(pictures);
        allow.add_root(Path::new("/Users/me/Pictures/"));
        assert_eq!(allow.roots().len(), 1);
        assert!(allow.authorize(&pictures.join("cat.png")).is_ok());

        allow.remove_root(pictures);
        assert!(matches!(
            allow.authorize(&pictures.join("cat.png")),
            Err(ArchiveError::UnauthorizedPath(_))
        ));
    }

    #[test]
    fn parent_segments_cannot_escape() {
        let allow = AllowList::new(Some(PathBuf::from("/vault")));
        assert!(!allow.is_allowed(Path::new("/vault/../etc/passwd")));
        assert!(!allow.is_allowed(Path::new("relative/cat.png")));
    }
}
