use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use archivist_model::BackupRef;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{AllowList, FsEvent, FsProvider, WatchSubscription, WriteMode, with_suffix};
use crate::error::{ArchiveError, Result};
use crate::hashing::content_hash;
use crate::vault::{SIDECAR_EXTENSIONS, clean_path, split_file_name, unique_path};

/// Undo-buffer location used by [`InMemoryProvider`].
pub const MEMORY_BACKUP_ROOT: &str = "/__undo_buffer";

/// Provider operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFault {
    Copy,
    Rename,
    Write,
    Trash,
    Hash,
}

#[derive(Clone)]
struct MemFile {
    bytes: Vec<u8>,
    modified: SystemTime,
}

#[derive(Default)]
struct MemoryFs {
    files: BTreeMap<PathBuf, MemFile>,
    dirs: BTreeSet<PathBuf>,
    trash: Vec<PathBuf>,
    backups: BTreeMap<PathBuf, Vec<u8>>,
    backup_seq: u64,
}

/// In-process filesystem with the same allow-list contract as
/// [`LocalFsProvider`](super::LocalFsProvider).
///
/// Mutations emit watch events to subscribers of the parent directory, so
/// engine writes exercise the same feedback path a real watcher would.
pub struct InMemoryProvider {
    allow: AllowList,
    fs: Mutex<MemoryFs>,
    subscribers: Mutex<Vec<(PathBuf, mpsc::Sender<FsEvent>)>>,
    faults: Mutex<HashSet<ProviderFault>>,
}

impl fmt::Debug for InMemoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fs = self.fs.lock();
        f.debug_struct("InMemoryProvider")
            .field("roots", &self.allow.roots())
            .field("file_count", &fs.files.len())
            .field("trash_count", &fs.trash.len())
            .field("faults", &*self.faults.lock())
            .finish()
    }
}

impl InMemoryProvider {
    pub fn new(allow: AllowList) -> Self {
        Self {
            allow,
            fs: Mutex::new(MemoryFs::default()),
            subscribers: Mutex::new(Vec::new()),
            faults: Mutex::new(HashSet::new()),
        }
    }

    /// Provider whose internal vault is `root`.
    pub fn with_vault(root: impl Into<PathBuf>) -> Self {
        Self::new(AllowList::new(Some(root.into())))
    }

    /// Seed a file without authorisation checks or events.
    pub fn insert_file(&self, path: impl AsRef<Path>, bytes: impl Into<Vec<u8>>) {
        let path = clean_path(path.as_ref());
        let mut fs = self.fs.lock();
        if let Some(parent) = path.parent() {
            fs.dirs.insert(parent.to_path_buf());
        }
        fs.files.insert(
            path,
            MemFile {
                bytes: bytes.into(),
                modified: SystemTime::now(),
            },
        );
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.fs
            .lock()
            .files
            .get(&clean_path(path.as_ref()))
            .map(|file| file.bytes.clone())
    }

    pub fn has_file(&self, path: impl AsRef<Path>) -> bool {
        self.fs.lock().files.contains_key(&clean_path(path.as_ref()))
    }

    pub fn files(&self) -> Vec<PathBuf> {
        self.fs.lock().files.keys().cloned().collect()
    }

    /// Paths trashed so far, oldest first.
    pub fn trashed(&self) -> Vec<PathBuf> {
        self.fs.lock().trash.clone()
    }

    pub fn backup_count(&self) -> usize {
        self.fs.lock().backups.len()
    }

    pub fn fail(&self, fault: ProviderFault) {
        self.faults.lock().insert(fault);
    }

    pub fn heal(&self, fault: ProviderFault) {
        self.faults.lock().remove(&fault);
    }

    /// Push an event to the subscribers of its parent directory.
    pub fn emit(&self, event: FsEvent) {
        let parent = event.path.parent().map(Path::to_path_buf);
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(root, tx)| {
            if Some(root) != parent.as_ref() {
                return !tx.is_closed();
            }
            !matches!(
                tx.try_send(event.clone()),
                Err(mpsc::error::TrySendError::Closed(_))
            )
        });
    }

    fn check_fault(&self, fault: ProviderFault, path: &Path) -> Result<()> {
        if !self.faults.lock().contains(&fault) {
            return Ok(());
        }
        let message = format!("injected {fault:?} failure at {}", path.display());
        Err(match fault {
            ProviderFault::Copy => ArchiveError::CopyFailed(message),
            ProviderFault::Rename => ArchiveError::RenameFailed(message),
            ProviderFault::Write | ProviderFault::Trash => ArchiveError::WriteFailed(message),
            ProviderFault::Hash => ArchiveError::HashFailed(message),
        })
    }

    fn put(&self, path: &Path, bytes: Vec<u8>) {
        let modified = SystemTime::now();
        let size = bytes.len() as u64;
        {
            let mut fs = self.fs.lock();
            if let Some(parent) = path.parent() {
                fs.dirs.insert(parent.to_path_buf());
            }
            fs.files
                .insert(path.to_path_buf(), MemFile { bytes, modified });
        }
        self.emit(FsEvent::added(path).with_fingerprint(size, Some(modified)));
    }

    fn take(&self, path: &Path) -> Option<MemFile> {
        let removed = self.fs.lock().files.remove(path);
        if removed.is_some() {
            self.emit(FsEvent::removed(path));
        }
        removed
    }
}

#[async_trait]
impl FsProvider for InMemoryProvider {
    fn allow_list(&self) -> &AllowList {
        &self.allow
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let path = self.allow.authorize(path)?;
        self.file(&path)
            .ok_or_else(|| ArchiveError::NotFound(path.display().to_string()))
    }

    async fn write_file(&self, path: &Path, data: &[u8], _mode: WriteMode) -> Result<()> {
        let path = self.allow.authorize(path)?;
        self.check_fault(ProviderFault::Write, &path)?;
        self.put(&path, data.to_vec());
        Ok(())
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> Result<PathBuf> {
        let from = self.allow.authorize(from)?;
        let to = self.allow.authorize(to)?;
        self.check_fault(ProviderFault::Rename, &from)?;

        if !self.has_file(&from) {
            return Err(ArchiveError::RenameFailed(format!(
                "{} does not exist",
                from.display()
            )));
        }
        let target = if self.has_file(&to) {
            let dir = to.parent().unwrap_or_else(|| Path::new("/"));
            let (stem, ext) = split_file_name(&to);
            unique_path(self, dir, &stem, &ext).await
        } else {
            to
        };

        if let Some(file) = self.take(&from) {
            self.put(&target, file.bytes);
        }
        Ok(target)
    }

    async fn trash_file(&self, path: &Path) -> Result<()> {
        let path = self.allow.authorize(path)?;
        self.check_fault(ProviderFault::Trash, &path)?;
        if self.take(&path).is_none() {
            return Err(ArchiveError::NotFound(path.display().to_string()));
        }
        self.fs.lock().trash.push(path);
        Ok(())
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        let from = self.allow.authorize(from)?;
        let to = self.allow.authorize(to)?;
        self.check_fault(ProviderFault::Copy, &from)?;
        let bytes = self.file(&from).ok_or_else(|| {
            ArchiveError::CopyFailed(format!("{} does not exist", from.display()))
        })?;
        self.put(&to, bytes);
        Ok(())
    }

    async fn calculate_hash(&self, path: &Path) -> Result<String> {
        let path = self.allow.authorize(path)?;
        self.check_fault(ProviderFault::Hash, &path)?;
        self.file(&path)
            .map(|bytes| content_hash(&bytes))
            .ok_or_else(|| ArchiveError::HashFailed(format!("{} does not exist", path.display())))
    }

    async fn exists(&self, path: &Path) -> bool {
        match self.allow.authorize(path) {
            Ok(path) => {
                let fs = self.fs.lock();
                fs.files.contains_key(&path) || fs.dirs.contains(&path)
            }
            Err(_) => false,
        }
    }

    async fn mkdir(&self, path: &Path) -> Result<()> {
        let path = self.allow.authorize(path)?;
        self.fs.lock().dirs.insert(path);
        Ok(())
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let path = self.allow.authorize(path)?;
        Ok(self
            .fs
            .lock()
            .files
            .keys()
            .filter(|file| file.parent() == Some(path.as_path()))
            .cloned()
            .collect())
    }

    async fn backup_file(&self, path: &Path) -> Result<BackupRef> {
        let path = self.allow.authorize(path)?;
        let mut fs = self.fs.lock();
        let Some(image) = fs.files.get(&path).map(|file| file.bytes.clone()) else {
            return Err(ArchiveError::NotFound(path.display().to_string()));
        };

        fs.backup_seq += 1;
        let (stem, ext) = split_file_name(&path);
        let base = Path::new(MEMORY_BACKUP_ROOT).join(format!("{stem}_{}", fs.backup_seq));
        let backup_path = with_suffix(&base, &ext);
        fs.backups.insert(backup_path.clone(), image);

        for side_ext in SIDECAR_EXTENSIONS {
            if let Some(side) = fs.files.get(&path.with_extension(side_ext)) {
                let bytes = side.bytes.clone();
                fs.backups.insert(with_suffix(&base, side_ext), bytes);
            }
        }

        Ok(BackupRef {
            path: backup_path,
            base,
        })
    }

    async fn restore_file(&self, backup: &BackupRef, target: &Path) -> Result<()> {
        let target = self.allow.authorize(target)?;
        let (image, sidecars) = {
            let fs = self.fs.lock();
            let image = fs
                .backups
                .get(&backup.path)
                .cloned()
                .ok_or_else(|| ArchiveError::NotFound(backup.path.display().to_string()))?;
            let sidecars: Vec<(&str, Vec<u8>)> = SIDECAR_EXTENSIONS
                .iter()
                .filter_map(|ext| {
                    fs.backups
                        .get(&with_suffix(&backup.base, ext))
                        .map(|bytes| (*ext, bytes.clone()))
                })
                .collect();
            (image, sidecars)
        };

        self.put(&target, image);
        for (ext, bytes) in sidecars {
            self.put(&target.with_extension(ext), bytes);
        }
        Ok(())
    }

    async fn watch_directory(&self, path: &Path) -> Result<WatchSubscription> {
        let root = self.allow.authorize(path)?;
        let (tx, rx) = mpsc::channel(256);
        self.subscribers.lock().push((root.clone(), tx));
        Ok(WatchSubscription::new(root, rx, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FsEventKind;

    #[tokio::test]
    async fn operations_outside_roots_leave_no_trace() {
        let fs = InMemoryProvider::with_vault("/vault");
        fs.insert_file("/elsewhere/cat.png", b"x".to_vec());

        for result in [
            fs.write_file(Path::new("/elsewhere/dog.png"), b"d", WriteMode::Atomic).await,
            fs.trash_file(Path::new("/elsewhere/cat.png")).await,
            fs.copy_file(Path::new("/elsewhere/cat.png"), Path::new("/vault/cat.png")).await,
        ] {
            assert!(matches!(result, Err(ArchiveError::UnauthorizedPath(_))));
        }
        assert_eq!(fs.files(), vec![PathBuf::from("/elsewhere/cat.png")]);
        assert!(fs.trashed().is_empty());
    }

    #[tokio::test]
    async fn writes_notify_parent_subscribers() {
        let fs = InMemoryProvider::with_vault("/vault");
        let mut sub = fs.watch_directory(Path::new("/vault")).await.unwrap();

        fs.write_file(Path::new("/vault/cat.png"), b"c", WriteMode::Atomic)
            .await
            .unwrap();
        fs.write_file(Path::new("/vault/nested/dog.png"), b"d", WriteMode::Atomic)
            .await
            .unwrap();
        fs.trash_file(Path::new("/vault/cat.png")).await.unwrap();

        let added = sub.next().await.unwrap();
        assert_eq!(added.kind, FsEventKind::Added);
        assert_eq!(added.size, Some(1));
        let removed = sub.next().await.unwrap();
        assert_eq!(removed.kind, FsEventKind::Removed);
        assert_eq!(removed.path, PathBuf::from("/vault/cat.png"));
    }

    #[tokio::test]
    async fn injected_faults_surface_as_typed_errors() {
        let fs = InMemoryProvider::with_vault("/vault");
        fs.insert_file("/vault/a.png", b"a".to_vec());
        fs.fail(ProviderFault::Copy);

        let err = fs
            .copy_file(Path::new("/vault/a.png"), Path::new("/vault/b.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::CopyFailed(_)));

        fs.heal(ProviderFault::Copy);
        fs.copy_file(Path::new("/vault/a.png"), Path::new("/vault/b.png"))
            .await
            .unwrap();
        assert_eq!(fs.file("/vault/b.png").unwrap(), b"a");
    }
}
