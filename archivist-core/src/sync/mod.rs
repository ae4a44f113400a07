//! Disk synchronisation engine.
//!
//! After every store write to an image, [`DiskSyncEngine::reconcile`] makes
//! the filesystem match the record in a fixed order:
//!
//! 1. location: materialise a blob, or move the file between vaults
//!    (round-trip aware), or revert a source that has nowhere to go;
//! 2. rename the file after a title change;
//! 3. rewrite embedded tags and sidecars.
//!
//! Location failures revert the source and stop. Rename failures keep the
//! old name. Metadata failures are logged only.

pub mod engine;
pub mod lock;
pub mod log;
pub mod plan;

pub use engine::{DiskDeletion, DiskSyncEngine, LibraryLayout, SyncReport};
pub use lock::{LockGuard, LockSet};
pub use log::{SyncLog, SyncLogEntry, SyncResult};
pub use plan::{
    LocationPlan, MaterializeOp, MetadataSyncOp, MoveDirection, RenameOp, StorageState, Target,
    VaultMoveOp, plan_location, plan_rename,
};
