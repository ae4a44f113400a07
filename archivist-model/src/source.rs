use std::path::PathBuf;

use crate::ids::SourceId;

/// Kind of vault backing a library source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SourceKind {
    Internal,
    LocalFolder,
}

/// A vault whose files are tracked by the library.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LibrarySource {
    pub id: SourceId,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: SourceKind,
    pub path: Option<PathBuf>,
    /// Denormalised image count, recomputed on every refresh.
    #[cfg_attr(feature = "serde", serde(default))]
    pub count: usize,
}

impl LibrarySource {
    pub const INTERNAL_NAME: &'static str = "Local Vault";

    pub fn internal(path: Option<PathBuf>) -> Self {
        Self {
            id: SourceId::internal(),
            name: Self::INTERNAL_NAME.to_string(),
            kind: SourceKind::Internal,
            path,
            count: 0,
        }
    }

    pub fn local_folder(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            id: SourceId::new_linked(),
            name: name.into(),
            kind: SourceKind::LocalFolder,
            path: Some(path),
            count: 0,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.id.is_internal()
    }
}
