use std::path::{Path, PathBuf};

use archivist_model::{GeneralSettings, LibrarySource, SourceId, SourceKind};

use super::locator::{is_within, path_key};

/// Registered vault roots: the internal vault plus every linked folder.
#[derive(Debug, Clone, Default)]
pub struct VaultRoots {
    internal: Option<PathBuf>,
    linked: Vec<(SourceId, PathBuf)>,
}

impl VaultRoots {
    pub fn new(internal: Option<PathBuf>) -> Self {
        Self {
            internal,
            linked: Vec::new(),
        }
    }

    pub fn from_library(settings: &GeneralSettings, sources: &[LibrarySource]) -> Self {
        let internal = settings.local_vault_path.clone().or_else(|| {
            sources
                .iter()
                .find(|source| source.is_internal())
                .and_then(|source| source.path.clone())
        });
        let linked = sources
            .iter()
            .filter(|source| source.kind == SourceKind::LocalFolder)
            .filter_map(|source| source.path.clone().map(|path| (source.id.clone(), path)))
            .collect();
        Self { internal, linked }
    }

    pub fn with_linked(mut self, id: SourceId, path: impl Into<PathBuf>) -> Self {
        self.linked.push((id, path.into()));
        self
    }

    pub fn internal(&self) -> Option<&Path> {
        self.internal.as_deref()
    }

    /// Root directory of a source, if it has one.
    pub fn root_of(&self, source: &SourceId) -> Option<&Path> {
        if source.is_internal() {
            return self.internal();
        }
        self.linked
            .iter()
            .find(|(id, _)| id == source)
            .map(|(_, path)| path.as_path())
    }

    pub fn in_internal(&self, path: &Path) -> bool {
        self.internal
            .as_deref()
            .is_some_and(|root| is_within(path, root))
    }

    /// Owning source by longest matching root.
    pub fn owner_of(&self, path: &Path) -> Option<SourceId> {
        self.iter()
            .filter(|(_, root)| is_within(path, root))
            .max_by_key(|(_, root)| path_key(root).len())
            .map(|(id, _)| id)
    }

    /// Source whose root equals `candidate` or nests with it in either
    /// direction.
    pub fn overlapping(&self, candidate: &Path) -> Option<SourceId> {
        self.iter()
            .find(|(_, root)| is_within(candidate, root) || is_within(root, candidate))
            .map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SourceId, &Path)> {
        self.internal
            .iter()
            .map(|root| (SourceId::internal(), root.as_path()))
            .chain(
                self.linked
                    .iter()
                    .map(|(id, root)| (id.clone(), root.as_path())),
            )
    }
}
