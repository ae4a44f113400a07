//! Capability-scoped filesystem access.
//!
//! Every disk operation the engine performs goes through [`FsProvider`].
//! Implementations must authorise each path against their [`AllowList`]
//! before touching the filesystem; nothing outside a registered vault root is
//! ever read, written, watched or trashed.

pub mod allow_list;
pub mod local;
pub mod memory;
mod watch;

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use archivist_model::BackupRef;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::embedded::{self, EmbeddedMetadata, EmbeddedTags, EmbeddedWrite};
use crate::error::{ArchiveError, Result};
use crate::hashing::content_hash;
use crate::vault::resolve_locator;

pub use allow_list::AllowList;
pub use local::{LocalFsProvider, TrashBin};
pub use memory::{InMemoryProvider, ProviderFault};

/// How `write_file` exposes data to readers and watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Write to a temporary sibling, then rename over the target.
    Atomic,
    /// Write in place.
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    Added,
    Removed,
}

/// A settled change inside a watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
    pub size: Option<u64>,
    pub modified: Option<SystemTime>,
}

impl FsEvent {
    pub fn added(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FsEventKind::Added,
            path: path.into(),
            size: None,
            modified: None,
        }
    }

    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FsEventKind::Removed,
            path: path.into(),
            size: None,
            modified: None,
        }
    }

    pub fn with_fingerprint(mut self, size: u64, modified: Option<SystemTime>) -> Self {
        self.size = Some(size);
        self.modified = modified;
        self
    }
}

/// Stream of events for one watched directory. Dropping it stops the watch.
pub struct WatchSubscription {
    pub root: PathBuf,
    events: mpsc::Receiver<FsEvent>,
    _guard: Option<Box<dyn Any + Send>>,
}

impl WatchSubscription {
    pub fn new(
        root: PathBuf,
        events: mpsc::Receiver<FsEvent>,
        guard: Option<Box<dyn Any + Send>>,
    ) -> Self {
        Self {
            root,
            events,
            _guard: guard,
        }
    }

    /// Next settled event; `None` once the watch has ended.
    pub async fn next(&mut self) -> Option<FsEvent> {
        self.events.recv().await
    }
}

impl fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("root", &self.root)
            .field("has_guard", &self._guard.is_some())
            .finish()
    }
}

/// Filesystem capability used by the sync engine, the watcher and the
/// maintenance loops.
#[async_trait]
pub trait FsProvider: Send + Sync {
    /// Roots this provider may touch.
    fn allow_list(&self) -> &AllowList;

    /// Native path for a locator, authorised against the allow-list.
    async fn real_path(&self, locator: &str) -> Result<PathBuf> {
        let path = resolve_locator(locator)?;
        self.allow_list().authorize(&path)
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    async fn read_text(&self, path: &Path) -> Result<String> {
        let bytes = self.read_file(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn write_file(&self, path: &Path, data: &[u8], mode: WriteMode) -> Result<()>;

    /// Rename `from` to `to`. When `to` is taken the first free `_n` variant
    /// is used instead; the path actually written is returned.
    async fn rename_file(&self, from: &Path, to: &Path) -> Result<PathBuf>;

    /// Recoverable delete. Missing files report [`ArchiveError::NotFound`].
    async fn trash_file(&self, path: &Path) -> Result<()>;

    async fn copy_file(&self, from: &Path, to: &Path) -> Result<()>;

    async fn calculate_hash(&self, path: &Path) -> Result<String> {
        let bytes = self
            .read_file(path)
            .await
            .map_err(|err| ArchiveError::HashFailed(format!("{}: {err}", path.display())))?;
        Ok(content_hash(&bytes))
    }

    /// False for missing and for unauthorised paths.
    async fn exists(&self, path: &Path) -> bool;

    async fn mkdir(&self, path: &Path) -> Result<()>;

    /// Files directly inside `path`, sorted.
    async fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Copy `path` and its sidecars into the undo buffer.
    async fn backup_file(&self, path: &Path) -> Result<BackupRef>;

    /// Copy a backup (and any sidecar backups) back to `target`.
    async fn restore_file(&self, backup: &BackupRef, target: &Path) -> Result<()>;

    async fn read_embedded_metadata(&self, path: &Path) -> Result<EmbeddedMetadata> {
        let bytes = self.read_file(path).await?;
        Ok(embedded::read_metadata(&bytes))
    }

    async fn write_embedded_metadata(
        &self,
        path: &Path,
        tags: &EmbeddedTags,
    ) -> Result<EmbeddedWrite> {
        let bytes = self.read_file(path).await?;
        match embedded::embed_tags(&bytes, tags) {
            Some(updated) if updated == bytes => Ok(EmbeddedWrite::Written),
            Some(updated) => {
                self.write_file(path, &updated, WriteMode::Atomic).await?;
                Ok(EmbeddedWrite::Written)
            }
            None => Ok(EmbeddedWrite::Unsupported),
        }
    }

    /// Non-recursive watch of `path`.
    async fn watch_directory(&self, path: &Path) -> Result<WatchSubscription>;
}

/// `base.ext` without treating dots inside `base` as an extension.
pub(crate) fn with_suffix(base: &Path, ext: &str) -> PathBuf {
    let mut raw = base.as_os_str().to_os_string();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_keeps_inner_dots() {
        assert_eq!(
            with_suffix(Path::new("/undo/v1.2_1700"), "png"),
            PathBuf::from("/undo/v1.2_1700.png")
        );
    }
}
