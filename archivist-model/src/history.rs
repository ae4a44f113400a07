use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::ids::ImageId;
use crate::image::ImageRecord;
use crate::patch::ImagePatch;

/// Location of a pre-delete backup in the undo buffer.
///
/// `base` is the backup path without extension; sidecar backups live at
/// `base.json` / `base.txt` when they existed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BackupRef {
    pub path: PathBuf,
    pub base: PathBuf,
}

/// A record removed by a delete, with the backup taken before trashing.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedImage {
    pub record: ImageRecord,
    pub backup: Option<BackupRef>,
}

/// A forward patch and the patch that reverts it.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchedImage {
    pub id: ImageId,
    pub changes: ImagePatch,
    pub revert: ImagePatch,
}

/// Invertible library operation.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryAction {
    Update(PatchedImage),
    Delete(DeletedImage),
    BatchUpdate(Vec<PatchedImage>),
    BatchDelete(Vec<DeletedImage>),
}

impl HistoryAction {
    pub fn label(&self) -> &'static str {
        match self {
            HistoryAction::Update(_) => "update",
            HistoryAction::Delete(_) => "delete",
            HistoryAction::BatchUpdate(_) => "batch_update",
            HistoryAction::BatchDelete(_) => "batch_delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub action: HistoryAction,
}

impl HistoryEntry {
    pub fn now(action: HistoryAction) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
        }
    }
}
