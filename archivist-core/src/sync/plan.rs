//! Pure planning for [`DiskSyncEngine::reconcile`](super::DiskSyncEngine::reconcile).
//!
//! Given the prior and current record plus the resolved on-disk location,
//! decide which physical operation (if any) moves the file to where the
//! record says it belongs. Nothing here touches the filesystem.

use std::path::{Path, PathBuf};

use archivist_model::{ImageRecord, SourceId};

use crate::vault::{VaultRoots, is_within, path_key, sanitize_filename, split_file_name};

/// Where the bytes of a record currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageState {
    /// Only a blob; nothing on disk yet.
    InMemory,
    /// A file inside the internal vault.
    Internal,
    /// A file anywhere else.
    External,
}

impl StorageState {
    /// `None` when the record has neither a disk file nor a blob.
    pub fn classify(record: &ImageRecord, disk_path: Option<&Path>, roots: &VaultRoots) -> Option<Self> {
        match disk_path {
            Some(path) if roots.in_internal(path) => Some(StorageState::Internal),
            Some(_) => Some(StorageState::External),
            None if record.blob.is_some() => Some(StorageState::InMemory),
            None => None,
        }
    }
}

/// Where the record's `source_id` says the bytes should live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Internal,
    External {
        source: SourceId,
        /// `None` when the source is unknown or has no folder.
        root: Option<PathBuf>,
    },
}

impl Target {
    pub fn of(record: &ImageRecord, roots: &VaultRoots) -> Self {
        if record.is_internal() {
            Target::Internal
        } else {
            Target::External {
                source: record.source_id.clone(),
                root: roots.root_of(&record.source_id).map(Path::to_path_buf),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    IntoInternal,
    OutOfInternal,
    BetweenLinked,
}

/// Copy a disk file into another vault root, then trash the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultMoveOp {
    pub direction: MoveDirection,
    pub from: PathBuf,
    pub target_root: PathBuf,
    pub target_source: SourceId,
    /// Source restored on the record when the move fails.
    pub revert_to: SourceId,
}

impl VaultMoveOp {
    pub const LABEL: &'static str = "vault_move";
}

/// Write an in-memory blob into `root` and point the record at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeOp {
    pub root: PathBuf,
    /// Source the record belongs to once the file exists.
    pub source: SourceId,
}

impl MaterializeOp {
    pub const LABEL: &'static str = "materialize";
}

/// Rename the file to match a new title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOp {
    pub from: PathBuf,
    pub to: PathBuf,
}

impl RenameOp {
    pub const LABEL: &'static str = "rename";
}

/// Rewrite embedded tags and sidecars from the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataSyncOp {
    pub path: PathBuf,
}

impl MetadataSyncOp {
    pub const LABEL: &'static str = "metadata_sync";
}

/// The location transition chosen for one reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationPlan {
    Stay,
    Materialize(MaterializeOp),
    VaultMove(VaultMoveOp),
    /// The requested source has nowhere to put the file; restore this one.
    RevertSource(SourceId),
    /// The source did not change but the file sits in a linked folder while
    /// the record claims the internal vault; record the real owner instead
    /// of moving bytes.
    AdoptSource(SourceId),
}

/// Choose the location transition for `current`, which was `prior_source`
/// before the edit that triggered the reconcile.
pub fn plan_location(
    prior_source: &SourceId,
    current: &ImageRecord,
    disk_path: Option<&Path>,
    roots: &VaultRoots,
) -> LocationPlan {
    let Some(state) = StorageState::classify(current, disk_path, roots) else {
        return LocationPlan::Stay;
    };
    let target = Target::of(current, roots);

    let path = match (state, disk_path) {
        (StorageState::InMemory, _) | (_, None) => return plan_materialize(target, roots),
        (_, Some(path)) => path,
    };

    if prior_source == &current.source_id {
        if state == StorageState::External
            && current.is_internal()
            && let Some(owner) = roots.owner_of(path)
            && !owner.is_internal()
        {
            return LocationPlan::AdoptSource(owner);
        }
        return LocationPlan::Stay;
    }

    match (state, target) {
        (StorageState::Internal, Target::Internal) => LocationPlan::Stay,
        (StorageState::External, Target::Internal) => match roots.internal() {
            Some(root) => LocationPlan::VaultMove(VaultMoveOp {
                direction: MoveDirection::IntoInternal,
                from: path.to_path_buf(),
                target_root: root.to_path_buf(),
                target_source: SourceId::internal(),
                revert_to: prior_source.clone(),
            }),
            None => LocationPlan::RevertSource(prior_source.clone()),
        },
        (_, Target::External { root: None, .. }) => LocationPlan::RevertSource(prior_source.clone()),
        (_, Target::External { root: Some(root), .. }) if is_within(path, &root) => LocationPlan::Stay,
        (state, Target::External { source, root: Some(root) }) => {
            let direction = if state == StorageState::Internal {
                MoveDirection::OutOfInternal
            } else {
                MoveDirection::BetweenLinked
            };
            LocationPlan::VaultMove(VaultMoveOp {
                direction,
                from: path.to_path_buf(),
                target_root: root,
                target_source: source,
                revert_to: prior_source.clone(),
            })
        }
        (StorageState::InMemory, _) => LocationPlan::Stay,
    }
}

fn plan_materialize(target: Target, roots: &VaultRoots) -> LocationPlan {
    let internal = roots.internal().map(Path::to_path_buf);
    match target {
        Target::External { source, root: Some(root) } => {
            LocationPlan::Materialize(MaterializeOp { root, source })
        }
        Target::Internal | Target::External { root: None, .. } => match internal {
            Some(root) => LocationPlan::Materialize(MaterializeOp {
                root,
                source: SourceId::internal(),
            }),
            None => LocationPlan::Stay,
        },
    }
}

/// Rename needed to follow a title change, if any.
///
/// Linked-folder files are only renamed when `rename_linked` is set. A file
/// already named after the title, ignoring case, is left alone.
pub fn plan_rename(
    prior_title: &str,
    current: &ImageRecord,
    path: &Path,
    rename_linked: bool,
) -> Option<RenameOp> {
    let title = current.title.trim();
    if title.is_empty() || prior_title.trim().is_empty() || prior_title == current.title {
        return None;
    }
    if !current.is_internal() && !rename_linked {
        return None;
    }

    let stem = sanitize_filename(&current.title);
    let (current_stem, _) = split_file_name(path);
    if current_stem.to_lowercase() == stem.to_lowercase() {
        return None;
    }

    let dir = path.parent()?;
    let to = match path.extension() {
        Some(ext) => dir.join(format!("{stem}.{}", ext.to_string_lossy())),
        None => dir.join(&stem),
    };
    if path_key(&to) == path_key(path) {
        return None;
    }
    Some(RenameOp {
        from: path.to_path_buf(),
        to,
    })
}

#[cfg(test)]
mod tests {
    use archivist_model::ImageBlob;

    use super::*;

    fn pictures() -> SourceId {
        SourceId::from_string("pictures").unwrap()
    }

    fn archive() -> SourceId {
        SourceId::from_string("archive").unwrap()
    }

    fn roots() -> VaultRoots {
        VaultRoots::new(Some(PathBuf::from("/vault/internal")))
            .with_linked(pictures(), "/Users/me/Pictures")
            .with_linked(archive(), "/mnt/archive")
    }

    fn on_disk(source: SourceId) -> ImageRecord {
        ImageRecord::new("cat").with_source(source)
    }

    #[test]
    fn blobs_materialise_into_the_target_vault() {
        let blob = ImageBlob::new(vec![1], "image/png");
        let record = ImageRecord::new("cat").with_blob(blob.clone());
        assert_eq!(
            plan_location(&SourceId::internal(), &record, None, &roots()),
            LocationPlan::Materialize(MaterializeOp {
                root: "/vault/internal".into(),
                source: SourceId::internal(),
            })
        );

        let external = record.clone().with_source(pictures());
        assert_eq!(
            plan_location(&pictures(), &external, None, &roots()),
            LocationPlan::Materialize(MaterializeOp {
                root: "/Users/me/Pictures".into(),
                source: pictures(),
            })
        );

        let unknown = record.with_source(SourceId::from_string("gone").unwrap());
        assert_eq!(
            plan_location(&SourceId::internal(), &unknown, None, &roots()),
            LocationPlan::Materialize(MaterializeOp {
                root: "/vault/internal".into(),
                source: SourceId::internal(),
            })
        );
    }

    #[test]
    fn internal_to_linked_moves_out() {
        let record = on_disk(pictures());
        let plan = plan_location(
            &SourceId::internal(),
            &record,
            Some(Path::new("/vault/internal/cat.png")),
            &roots(),
        );
        let LocationPlan::VaultMove(op) = plan else {
            panic!("expected a move, got {plan:?}");
        };
        assert_eq!(op.direction, MoveDirection::OutOfInternal);
        assert_eq!(op.target_root, PathBuf::from("/Users/me/Pictures"));
        assert_eq!(op.revert_to, SourceId::internal());
    }

    #[test]
    fn linked_to_internal_and_between_linked() {
        let into = plan_location(
            &pictures(),
            &on_disk(SourceId::internal()),
            Some(Path::new("/Users/me/Pictures/cat.png")),
            &roots(),
        );
        assert!(matches!(
            into,
            LocationPlan::VaultMove(VaultMoveOp { direction: MoveDirection::IntoInternal, .. })
        ));

        let between = plan_location(
            &pictures(),
            &on_disk(archive()),
            Some(Path::new("/Users/me/Pictures/cat.png")),
            &roots(),
        );
        assert!(matches!(
            between,
            LocationPlan::VaultMove(VaultMoveOp { direction: MoveDirection::BetweenLinked, .. })
        ));
    }

    #[test]
    fn sources_without_a_folder_revert() {
        let missing = SourceId::from_string("missing").unwrap();
        assert_eq!(
            plan_location(
                &SourceId::internal(),
                &on_disk(missing.clone()),
                Some(Path::new("/vault/internal/cat.png")),
                &roots(),
            ),
            LocationPlan::RevertSource(SourceId::internal())
        );
        assert_eq!(
            plan_location(
                &pictures(),
                &on_disk(missing),
                Some(Path::new("/Users/me/Pictures/cat.png")),
                &roots(),
            ),
            LocationPlan::RevertSource(pictures())
        );
    }

    #[test]
    fn moving_into_internal_without_a_vault_reverts() {
        let roots = VaultRoots::default().with_linked(pictures(), "/Users/me/Pictures");
        assert_eq!(
            plan_location(
                &pictures(),
                &on_disk(SourceId::internal()),
                Some(Path::new("/Users/me/Pictures/cat.png")),
                &roots,
            ),
            LocationPlan::RevertSource(pictures())
        );
    }

    #[test]
    fn settled_records_stay() {
        assert_eq!(
            plan_location(
                &SourceId::internal(),
                &on_disk(pictures()),
                Some(Path::new("/Users/me/Pictures/cat.png")),
                &roots(),
            ),
            LocationPlan::Stay
        );
        assert_eq!(
            plan_location(
                &pictures(),
                &on_disk(SourceId::internal()),
                Some(Path::new("/vault/internal/cat.png")),
                &roots(),
            ),
            LocationPlan::Stay
        );
        assert_eq!(
            plan_location(&SourceId::internal(), &on_disk(SourceId::internal()), None, &roots()),
            LocationPlan::Stay
        );
    }

    #[test]
    fn unchanged_internal_record_in_linked_folder_adopts_owner() {
        assert_eq!(
            plan_location(
                &SourceId::internal(),
                &on_disk(SourceId::internal()),
                Some(Path::new("/Users/me/Pictures/cat.png")),
                &roots(),
            ),
            LocationPlan::AdoptSource(pictures())
        );
    }

    #[test]
    fn rename_follows_title_with_sanitised_case_kept_name() {
        let mut record = on_disk(SourceId::internal());
        record.title = "Cat 2024".into();
        let op = plan_rename("cat", &record, Path::new("/vault/internal/cat.png"), false).unwrap();
        assert_eq!(op.to, PathBuf::from("/vault/internal/Cat_2024.png"));

        assert!(plan_rename("cat", &record, Path::new("/vault/internal/cat_2024.png"), false).is_none());
        let op = plan_rename("cat", &record, Path::new("/vault/internal/Cat_2024_3.png"), false)
            .unwrap();
        assert_eq!(op.to, PathBuf::from("/vault/internal/Cat_2024.png"));
        assert!(plan_rename("Cat 2024", &record, Path::new("/vault/internal/cat.png"), false).is_none());
    }

    #[test]
    fn undoing_a_title_renames_back_over_a_suffix_lookalike() {
        let mut record = on_disk(SourceId::internal());
        record.title = "cat".into();
        let op = plan_rename("cat 2024", &record, Path::new("/vault/internal/cat_2024.png"), false)
            .unwrap();
        assert_eq!(op.to, PathBuf::from("/vault/internal/cat.png"));
    }

    #[test]
    fn a_file_that_only_starts_with_the_new_title_is_still_renamed() {
        let mut record = on_disk(SourceId::internal());
        record.title = "sunset".into();
        let op = plan_rename("beach", &record, Path::new("/vault/internal/sunset_2024.png"), false)
            .unwrap();
        assert_eq!(op.from, PathBuf::from("/vault/internal/sunset_2024.png"));
        assert_eq!(op.to, PathBuf::from("/vault/internal/sunset.png"));
    }

    #[test]
    fn linked_files_rename_only_when_enabled() {
        let mut record = on_disk(pictures());
        record.title = "dog".into();
        let path = Path::new("/Users/me/Pictures/cat.png");
        assert!(plan_rename("cat", &record, path, false).is_none());
        assert!(plan_rename("cat", &record, path, true).is_some());
    }
}
