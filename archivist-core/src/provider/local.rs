use std::fmt;
use std::path::{Path, PathBuf};

use archivist_model::BackupRef;
use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{AllowList, FsProvider, WatchSubscription, WriteMode, watch, with_suffix};
use crate::error::{ArchiveError, Result};
use crate::vault::{SIDECAR_EXTENSIONS, is_within, split_file_name, unique_path};

/// Where trashed files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrashBin {
    /// The platform trash (Recycle Bin, Finder trash, XDG trash).
    System,
    /// A plain directory; used on headless hosts and in tests.
    Folder(PathBuf),
}

/// [`FsProvider`] backed by the local filesystem.
pub struct LocalFsProvider {
    allow: AllowList,
    backup_dir: PathBuf,
    trash: TrashBin,
    settle: Duration,
    watch_capacity: usize,
}

impl fmt::Debug for LocalFsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFsProvider")
            .field("roots", &self.allow.roots())
            .field("backup_dir", &self.backup_dir)
            .field("trash", &self.trash)
            .field("settle", &self.settle)
            .finish()
    }
}

impl LocalFsProvider {
    pub fn new(allow: AllowList, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            allow,
            backup_dir: backup_dir.into(),
            trash: TrashBin::System,
            settle: Duration::from_millis(500),
            watch_capacity: 256,
        }
    }

    pub fn with_trash(mut self, trash: TrashBin) -> Self {
        self.trash = trash;
        self
    }

    /// How long a path must stay quiet before its watch event is delivered.
    pub fn with_settle_window(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Authorise `path` lexically, then again after resolving symlinks so a
    /// link inside a vault cannot point outside of it.
    async fn checked(&self, path: &Path) -> Result<PathBuf> {
        let path = self.allow.authorize(path)?;
        let resolved = canonicalize_existing(&path).await;
        let mut roots = Vec::new();
        for root in self.allow.roots() {
            roots.push(tokio::fs::canonicalize(&root).await.unwrap_or(root));
        }
        if roots.iter().any(|root| is_within(&resolved, root)) {
            Ok(path)
        } else {
            warn!(
                path = %path.display(),
                resolved = %resolved.display(),
                "path escapes vault through a link"
            );
            Err(ArchiveError::UnauthorizedPath(path))
        }
    }

    async fn ensure_parent(path: &Path) -> std::io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                tokio::fs::create_dir_all(parent).await
            }
            _ => Ok(()),
        }
    }

    async fn copy_if_present(from: &Path, to: &Path) -> Result<bool> {
        if !tokio::fs::try_exists(from).await.unwrap_or(false) {
            return Ok(false);
        }
        tokio::fs::copy(from, to).await.map_err(|err| {
            ArchiveError::CopyFailed(format!("{} -> {}: {err}", from.display(), to.display()))
        })?;
        Ok(true)
    }
}

/// Canonical form of the deepest existing ancestor, with the missing tail
/// re-attached.
async fn canonicalize_existing(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        if let Ok(canonical) = tokio::fs::canonicalize(ancestor).await {
            return match path.strip_prefix(ancestor) {
                Ok(rest) if !rest.as_os_str().is_empty() => canonical.join(rest),
                _ => canonical,
            };
        }
    }
    path.to_path_buf()
}

#[async_trait]
impl FsProvider for LocalFsProvider {
    fn allow_list(&self) -> &AllowList {
        &self.allow
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let path = self.checked(path).await?;
        tokio::fs::read(&path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ArchiveError::NotFound(path.display().to_string())
            } else {
                ArchiveError::Io(err)
            }
        })
    }

    async fn write_file(&self, path: &Path, data: &[u8], mode: WriteMode) -> Result<()> {
        let path = self.checked(path).await?;
        let write_failed =
            |err: std::io::Error| ArchiveError::WriteFailed(format!("{}: {err}", path.display()));

        Self::ensure_parent(&path).await.map_err(write_failed)?;

        match mode {
            WriteMode::Direct => tokio::fs::write(&path, data).await.map_err(write_failed),
            WriteMode::Atomic => {
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let tmp = path.with_file_name(format!(
                    ".{file_name}.tmp.{}",
                    Uuid::new_v4().simple()
                ));

                if let Err(err) = tokio::fs::write(&tmp, data).await {
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(write_failed(err));
                }
                if let Err(err) = tokio::fs::rename(&tmp, &path).await {
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(write_failed(err));
                }
                Ok(())
            }
        }
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> Result<PathBuf> {
        let from = self.checked(from).await?;
        let to = self.checked(to).await?;

        if !tokio::fs::try_exists(&from).await.unwrap_or(false) {
            return Err(ArchiveError::RenameFailed(format!(
                "{} does not exist",
                from.display()
            )));
        }

        let target = if tokio::fs::try_exists(&to).await.unwrap_or(false) {
            let dir = to.parent().unwrap_or_else(|| Path::new("/"));
            let (stem, ext) = split_file_name(&to);
            unique_path(self, dir, &stem, &ext).await
        } else {
            to
        };

        Self::ensure_parent(&target).await.map_err(|err| {
            ArchiveError::RenameFailed(format!("{}: {err}", target.display()))
        })?;

        if let Err(err) = tokio::fs::rename(&from, &target).await {
            // Cross-device moves cannot be renamed; fall back to copy + remove.
            debug!(from = %from.display(), "rename failed ({err}), copying instead");
            tokio::fs::copy(&from, &target).await.map_err(|copy_err| {
                ArchiveError::RenameFailed(format!(
                    "{} -> {}: {err}; copy fallback: {copy_err}",
                    from.display(),
                    target.display()
                ))
            })?;
            tokio::fs::remove_file(&from).await.map_err(|rm_err| {
                ArchiveError::RenameFailed(format!("{}: {rm_err}", from.display()))
            })?;
        }
        Ok(target)
    }

    async fn trash_file(&self, path: &Path) -> Result<()> {
        let path = self.checked(path).await?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ArchiveError::NotFound(path.display().to_string()));
        }

        match &self.trash {
            TrashBin::System => {
                let target = path.clone();
                tokio::task::spawn_blocking(move || trash::delete(&target))
                    .await
                    .map_err(|err| ArchiveError::Internal(format!("trash task panicked: {err}")))?
                    .map_err(|err| {
                        ArchiveError::WriteFailed(format!("trash {}: {err}", path.display()))
                    })
            }
            TrashBin::Folder(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                let (stem, ext) = split_file_name(&path);
                let dest = dir.join(format!(
                    "{stem}_{}.{ext}",
                    Uuid::new_v4().simple()
                ));
                if tokio::fs::rename(&path, &dest).await.is_err() {
                    tokio::fs::copy(&path, &dest).await?;
                    tokio::fs::remove_file(&path).await?;
                }
                Ok(())
            }
        }
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        let from = self.checked(from).await?;
        let to = self.checked(to).await?;
        let copy_failed = |err: std::io::Error| {
            ArchiveError::CopyFailed(format!("{} -> {}: {err}", from.display(), to.display()))
        };
        Self::ensure_parent(&to).await.map_err(copy_failed)?;
        tokio::fs::copy(&from, &to).await.map_err(copy_failed)?;
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        match self.checked(path).await {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn mkdir(&self, path: &Path) -> Result<()> {
        let path = self.checked(path).await?;
        tokio::fs::create_dir_all(&path).await?;
        Ok(())
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let path = self.checked(path).await?;
        let mut entries = tokio::fs::read_dir(&path).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await.map(|ty| ty.is_file()).unwrap_or(false) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    async fn backup_file(&self, path: &Path) -> Result<BackupRef> {
        let path = self.checked(path).await?;
        tokio::fs::create_dir_all(&self.backup_dir).await?;

        let (stem, ext) = split_file_name(&path);
        let base = self
            .backup_dir
            .join(format!("{stem}_{}", Utc::now().timestamp_millis()));
        let backup_path = with_suffix(&base, &ext);

        if !Self::copy_if_present(&path, &backup_path).await? {
            return Err(ArchiveError::NotFound(path.display().to_string()));
        }
        for ext in SIDECAR_EXTENSIONS {
            Self::copy_if_present(&path.with_extension(ext), &with_suffix(&base, ext)).await?;
        }

        debug!(path = %path.display(), backup = %backup_path.display(), "backup created");
        Ok(BackupRef {
            path: backup_path,
            base,
        })
    }

    async fn restore_file(&self, backup: &BackupRef, target: &Path) -> Result<()> {
        let target = self.checked(target).await?;
        Self::ensure_parent(&target).await?;

        if !Self::copy_if_present(&backup.path, &target).await? {
            return Err(ArchiveError::NotFound(backup.path.display().to_string()));
        }
        for ext in SIDECAR_EXTENSIONS {
            Self::copy_if_present(&with_suffix(&backup.base, ext), &target.with_extension(ext))
                .await?;
        }
        Ok(())
    }

    async fn watch_directory(&self, path: &Path) -> Result<WatchSubscription> {
        let path = self.checked(path).await?;
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_dir() {
            return Err(ArchiveError::InvalidOperation(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        // notify may report resolved paths; events are mapped back to `path`
        // so they match locators and the ignore list.
        let resolved = tokio::fs::canonicalize(&path)
            .await
            .unwrap_or_else(|_| path.clone());
        watch::watch_directory(path, resolved, self.settle, self.watch_capacity).await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn provider(root: &Path) -> LocalFsProvider {
        LocalFsProvider::new(AllowList::new(Some(root.join("vault"))), root.join("undo"))
            .with_trash(TrashBin::Folder(root.join("trash")))
    }

    #[tokio::test]
    async fn atomic_write_leaves_no_temp_files() {
        let tmp = tempdir().unwrap();
        let fs = provider(tmp.path());
        let target = tmp.path().join("vault/cat.png");

        fs.write_file(&target, b"png", WriteMode::Atomic).await.unwrap();

        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"png");
        let listing = fs.read_dir(&tmp.path().join("vault")).await.unwrap();
        assert_eq!(listing, vec![target]);
    }

    #[tokio::test]
    async fn writes_outside_roots_are_rejected() {
        let tmp = tempdir().unwrap();
        let fs = provider(tmp.path());
        let outside = tmp.path().join("elsewhere/cat.png");

        let err = fs
            .write_file(&outside, b"x", WriteMode::Direct)
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::UnauthorizedPath(_)));
        assert!(!outside.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_cannot_escape_the_vault() {
        let tmp = tempdir().unwrap();
        let fs = provider(tmp.path());
        let vault = tmp.path().join("vault");
        let secret = tmp.path().join("secret");
        std::fs::create_dir_all(&vault).unwrap();
        std::fs::create_dir_all(&secret).unwrap();
        std::fs::write(secret.join("key.png"), b"secret").unwrap();
        std::os::unix::fs::symlink(&secret, vault.join("link")).unwrap();

        let err = fs.read_file(&vault.join("link/key.png")).await.unwrap_err();
        assert!(matches!(err, ArchiveError::UnauthorizedPath(_)));
    }

    #[tokio::test]
    async fn rename_avoids_collisions() {
        let tmp = tempdir().unwrap();
        let fs = provider(tmp.path());
        let vault = tmp.path().join("vault");
        fs.write_file(&vault.join("a.png"), b"a", WriteMode::Direct).await.unwrap();
        fs.write_file(&vault.join("b.png"), b"b", WriteMode::Direct).await.unwrap();

        let final_path = fs.rename_file(&vault.join("a.png"), &vault.join("b.png")).await.unwrap();

        assert_eq!(final_path, vault.join("b_1.png"));
        assert!(!vault.join("a.png").exists());
    }

    #[tokio::test]
    async fn backup_and_restore_carry_sidecars() {
        let tmp = tempdir().unwrap();
        let fs = provider(tmp.path());
        let vault = tmp.path().join("vault");
        let image = vault.join("cat.png");
        fs.write_file(&image, b"img", WriteMode::Direct).await.unwrap();
        fs.write_file(&vault.join("cat.json"), b"{}", WriteMode::Direct).await.unwrap();

        let backup = fs.backup_file(&image).await.unwrap();
        fs.trash_file(&image).await.unwrap();
        fs.trash_file(&vault.join("cat.json")).await.unwrap();
        assert!(!image.exists());

        fs.restore_file(&backup, &image).await.unwrap();
        assert_eq!(std::fs::read(&image).unwrap(), b"img");
        assert_eq!(std::fs::read(vault.join("cat.json")).unwrap(), b"{}");
        assert!(!vault.join("cat.txt").exists());
    }

    #[tokio::test]
    async fn trashing_a_missing_file_is_not_found() {
        let tmp = tempdir().unwrap();
        let fs = provider(tmp.path());
        let err = fs.trash_file(&tmp.path().join("vault/none.png")).await.unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
    }
}
