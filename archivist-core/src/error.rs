use std::path::PathBuf;

use archivist_model::{ImageId, ModelError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid model value: {0}")]
    Model(#[from] ModelError),

    #[error("Cannot resolve locator: {0}")]
    PathResolution(String),

    #[error("Path outside every registered vault: {}", .0.display())]
    UnauthorizedPath(PathBuf),

    #[error("Timed out waiting for sync lock on {0}")]
    LockTimeout(ImageId),

    #[error("Copy failed: {0}")]
    CopyFailed(String),

    #[error("Rename failed: {0}")]
    RenameFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Hash failed: {0}")]
    HashFailed(String),

    #[error("Sidecar parse error: {0}")]
    SidecarParse(String),

    #[error("No vault root owns {}", .0.display())]
    UnknownSource(PathBuf),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
