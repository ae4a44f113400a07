use std::path::{Path, PathBuf};
use std::sync::Arc;

use archivist_core::config::{RuntimeConfig, VaultLayout};
use archivist_core::context::ArchiveContext;
use archivist_core::error::ArchiveError;
use archivist_core::hashing::content_hash;
use archivist_core::import::{DuplicateChoice, FixedChoice, ImportCandidate};
use archivist_core::provider::{AllowList, FsEvent, FsProvider, InMemoryProvider, ProviderFault};
use archivist_core::store::{InMemoryStore, LibraryStore};
use archivist_core::toast::RecordingNotifier;
use archivist_core::watcher::{SkipReason, WatchOutcome};
use archivist_model::{ImagePatch, ImageRecord, LibrarySource, SourceId, SourceKind};

const PICTURES: &str = "/Users/me/Pictures";

struct Harness {
    ctx: ArchiveContext,
    fs: Arc<InMemoryProvider>,
    store: Arc<InMemoryStore>,
    toasts: Arc<RecordingNotifier>,
}

fn ext1() -> SourceId {
    SourceId::from_string("ext1").unwrap()
}

async fn harness() -> Harness {
    let fs = Arc::new(InMemoryProvider::new(AllowList::new(None)));
    let store = Arc::new(InMemoryStore::new());
    store
        .put_source(LibrarySource {
            id: ext1(),
            name: "Pictures".into(),
            kind: SourceKind::LocalFolder,
            path: Some(PICTURES.into()),
            count: 0,
        })
        .await
        .unwrap();

    let config = RuntimeConfig {
        vault: VaultLayout {
            internal_root: Some("/vault/internal".into()),
            ..VaultLayout::default()
        },
        ..RuntimeConfig::default()
    };
    let toasts = Arc::new(RecordingNotifier::new());
    let ctx = ArchiveContext::from_parts(
        fs.clone(),
        store.clone(),
        toasts.clone(),
        Arc::new(FixedChoice(DuplicateChoice::Skip)),
        config,
    )
    .await
    .unwrap();
    Harness {
        ctx,
        fs,
        store,
        toasts,
    }
}

/// `cat.png` in the internal vault with sidecars already written.
async fn internal_cat(h: &Harness) -> ImageRecord {
    h.fs.insert_file("/vault/internal/cat.png", b"cat pixels".to_vec());
    let mut record = ImageRecord::new("cat").with_src("file:///vault/internal/cat.png");
    record.prompt = "a cat on a windowsill".into();
    record.hash = Some(content_hash(b"cat pixels"));
    h.store.put_image(record.clone()).await.unwrap();
    h.ctx.engine.write_through(&record).await.unwrap();
    record
}

async fn stored(h: &Harness, record: &ImageRecord) -> ImageRecord {
    h.store.get_image(&record.id).await.unwrap().unwrap()
}

fn sidecar_id(h: &Harness, path: &str) -> String {
    let bytes = h.fs.file(path).unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    doc["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn moving_to_a_linked_folder_copies_and_trashes_the_original() {
    let h = harness().await;
    let cat = internal_cat(&h).await;

    let moved = h
        .ctx
        .library
        .update_image(&cat.id, ImagePatch::source(ext1()), true)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(moved.src.as_deref(), Some("file:///Users/me/Pictures/cat.png"));
    assert_eq!(moved.original_src.as_deref(), Some("file:///vault/internal/cat.png"));
    assert_eq!(moved.source_id, ext1());
    assert!(h.fs.has_file("/Users/me/Pictures/cat.png"));
    assert!(h.fs.has_file("/Users/me/Pictures/cat.json"));
    assert!(!h.fs.has_file("/vault/internal/cat.png"));
    assert!(!h.fs.has_file("/vault/internal/cat.json"));
    assert!(h.fs.trashed().contains(&PathBuf::from("/vault/internal/cat.png")));
}

#[tokio::test]
async fn moving_back_after_the_original_is_gone_makes_a_new_copy() {
    let h = harness().await;
    let cat = internal_cat(&h).await;
    h.ctx
        .library
        .update_image(&cat.id, ImagePatch::source(ext1()), true)
        .await
        .unwrap();

    let back = h
        .ctx
        .library
        .update_image(&cat.id, ImagePatch::source(SourceId::internal()), true)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(back.src.as_deref(), Some("file:///vault/internal/cat.png"));
    assert_eq!(back.original_src.as_deref(), Some("file:///Users/me/Pictures/cat.png"));
    assert!(h.fs.has_file("/vault/internal/cat.png"));
    assert!(!h.fs.has_file("/Users/me/Pictures/cat.png"));
}

#[tokio::test]
async fn moving_back_to_a_surviving_original_is_a_round_trip() {
    let h = harness().await;
    let cat = internal_cat(&h).await;
    h.ctx
        .library
        .update_image(&cat.id, ImagePatch::source(ext1()), true)
        .await
        .unwrap();
    h.fs.insert_file("/vault/internal/cat.png", b"cat pixels".to_vec());
    let copies_before = h.fs.files().len();

    let back = h
        .ctx
        .library
        .update_image(&cat.id, ImagePatch::source(SourceId::internal()), true)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(back.src.as_deref(), Some("file:///vault/internal/cat.png"));
    assert!(back.original_src.is_none());
    assert!(!h.fs.has_file("/Users/me/Pictures/cat.png"));
    assert!(h.fs.files().len() <= copies_before);
}

#[tokio::test]
async fn title_change_renames_file_and_sidecars_then_undo_reverses_it() {
    let h = harness().await;
    let cat = internal_cat(&h).await;
    assert!(h.fs.has_file("/vault/internal/cat.txt"));

    let renamed = h
        .ctx
        .library
        .update_image(&cat.id, ImagePatch::title("cat 2024"), true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renamed.src.as_deref(), Some("file:///vault/internal/cat_2024.png"));
    assert!(!h.fs.has_file("/vault/internal/cat.png"));
    assert!(!h.fs.has_file("/vault/internal/cat.json"));
    assert!(!h.fs.has_file("/vault/internal/cat.txt"));
    assert!(h.fs.has_file("/vault/internal/cat_2024.txt"));
    assert_eq!(sidecar_id(&h, "/vault/internal/cat_2024.json"), cat.id.as_str());

    h.ctx.library.undo().await.unwrap();
    let undone = stored(&h, &cat).await;
    assert_eq!(undone.title, "cat");
    assert_eq!(undone.src.as_deref(), Some("file:///vault/internal/cat.png"));
    assert!(h.fs.has_file("/vault/internal/cat.png"));
    assert!(!h.fs.has_file("/vault/internal/cat_2024.png"));
    assert_eq!(h.ctx.history.future().len(), 1);

    h.ctx.library.redo().await.unwrap();
    let redone = stored(&h, &cat).await;
    assert_eq!(redone.title, "cat 2024");
    assert_eq!(redone.src.as_deref(), Some("file:///vault/internal/cat_2024.png"));
    assert!(h.ctx.history.future().is_empty());
}

#[tokio::test]
async fn reconciling_an_unchanged_record_touches_nothing() {
    let h = harness().await;
    let cat = internal_cat(&h).await;
    let current = stored(&h, &cat).await;
    let files = h.fs.files();
    let trashed = h.fs.trashed().len();

    let again = h.ctx.engine.reconcile(&cat.id, &current).await;
    let third = h.ctx.engine.reconcile(&cat.id, &again).await;

    assert_eq!(third.src, current.src);
    assert_eq!(third.source_id, current.source_id);
    let mut after = h.fs.files();
    let mut before = files;
    after.sort();
    before.sort();
    assert_eq!(after, before);
    assert_eq!(h.fs.trashed().len(), trashed);
}

#[tokio::test]
async fn engine_writes_do_not_come_back_as_imports() {
    let h = harness().await;
    let cat = internal_cat(&h).await;
    h.ctx
        .library
        .update_image(&cat.id, ImagePatch::title("tabby"), true)
        .await
        .unwrap();

    for path in ["/vault/internal/tabby.png", "/vault/internal/tabby.json"] {
        let outcome = h.ctx.reconciler.handle_event(&FsEvent::added(path)).await;
        assert_eq!(outcome, WatchOutcome::Skipped(SkipReason::SelfWrite));
    }
    assert_eq!(h.store.list_images().await.unwrap().len(), 1);
}

#[tokio::test]
async fn files_dropped_into_a_linked_folder_are_imported_once() {
    let h = harness().await;
    h.fs.insert_file("/Users/me/Pictures/dog.png", b"dog pixels".to_vec());
    h.fs.insert_file("/Users/me/Pictures/dog.txt", b"a good dog".to_vec());

    let event = FsEvent::added("/Users/me/Pictures/dog.png");
    let WatchOutcome::Imported(id) = h.ctx.reconciler.handle_event(&event).await else {
        panic!("expected an import");
    };
    let dog = h.store.get_image(&id).await.unwrap().unwrap();
    assert_eq!(dog.source_id, ext1());
    assert_eq!(dog.src.as_deref(), Some("file:///Users/me/Pictures/dog.png"));
    assert_eq!(dog.title, "dog");
    assert!(dog.hash.is_some());

    let copy = FsEvent::added("/Users/me/Pictures/dog_copy.png");
    h.fs.insert_file("/Users/me/Pictures/dog_copy.png", b"dog pixels".to_vec());
    assert_eq!(
        h.ctx.reconciler.handle_event(&copy).await,
        WatchOutcome::Skipped(SkipReason::DuplicateHash)
    );
    assert_eq!(h.store.list_images().await.unwrap().len(), 1);
}

#[tokio::test]
async fn nothing_outside_a_vault_is_reachable() {
    let h = harness().await;
    let err = h.fs.read_file(Path::new("/etc/passwd")).await.unwrap_err();
    assert!(matches!(err, ArchiveError::UnauthorizedPath(_)));

    h.fs.insert_file("/tmp/stray.png", b"stray".to_vec());
    let outcome = h
        .ctx
        .reconciler
        .handle_event(&FsEvent::added("/tmp/stray.png"))
        .await;
    assert!(!matches!(outcome, WatchOutcome::Imported(_)));
    assert!(h.store.list_images().await.unwrap().is_empty());
}

#[tokio::test]
async fn importing_known_bytes_is_skipped() {
    let h = harness().await;
    internal_cat(&h).await;

    let report = h
        .ctx
        .importer
        .import(
            vec![
                ImportCandidate::new("again", b"cat pixels".to_vec(), "image/png"),
                ImportCandidate::new("owl", b"owl pixels".to_vec(), "image/png"),
            ],
            &SourceId::internal(),
            "Drop",
        )
        .await
        .unwrap();

    assert_eq!(report.imported.len(), 1);
    assert_eq!(report.skipped, 1);
    assert!(h.fs.has_file("/vault/internal/owl.png"));
}

#[tokio::test]
async fn startup_pass_drops_orphans_and_picks_up_strays() {
    let h = harness().await;
    let ghost = ImageRecord::new("ghost").with_src("file:///vault/internal/ghost.png");
    h.store.put_image(ghost.clone()).await.unwrap();
    h.fs.insert_file("/Users/me/Pictures/fox.png", b"fox pixels".to_vec());

    let summary = h.ctx.pass.run(true).await.unwrap();
    assert_eq!(summary.orphaned, 1);
    assert_eq!(summary.imported, 1);
    assert!(h.store.get_image(&ghost.id).await.unwrap().is_none());
    assert!(h.store.find_by_src("file:///Users/me/Pictures/fox.png").await.unwrap().is_some());
}

#[tokio::test]
async fn failed_copy_out_keeps_the_record_in_the_local_vault() {
    let h = harness().await;
    let cat = internal_cat(&h).await;
    h.fs.fail(ProviderFault::Copy);

    let kept = h
        .ctx
        .library
        .update_image(&cat.id, ImagePatch::source(ext1()), true)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(kept.source_id, SourceId::internal());
    assert_eq!(kept.src.as_deref(), Some("file:///vault/internal/cat.png"));
    assert_eq!(stored(&h, &cat).await.source_id, SourceId::internal());
    assert!(h.fs.has_file("/vault/internal/cat.png"));
    assert!(!h.fs.has_file("/Users/me/Pictures/cat.png"));
    assert!(
        h.toasts
            .errors()
            .iter()
            .any(|message| message == "Failed to copy to external vault")
    );
}

#[tokio::test]
async fn failed_rename_keeps_the_old_name_and_still_writes_sidecars() {
    let h = harness().await;
    let cat = internal_cat(&h).await;
    h.fs.fail(ProviderFault::Rename);

    let mut patch = ImagePatch::title("cat 2024");
    patch.prompt = Some("a cat asleep on a windowsill".into());
    let record = h
        .ctx
        .library
        .update_image(&cat.id, patch, true)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.src.as_deref(), Some("file:///vault/internal/cat.png"));
    assert_eq!(record.title, "cat 2024");
    assert!(!h.fs.has_file("/vault/internal/cat_2024.png"));
    assert_eq!(
        h.fs.file("/vault/internal/cat.txt").unwrap(),
        b"a cat asleep on a windowsill".to_vec()
    );
    let doc: serde_json::Value =
        serde_json::from_slice(&h.fs.file("/vault/internal/cat.json").unwrap()).unwrap();
    assert_eq!(doc["title"], "cat 2024");
}

#[tokio::test]
async fn failed_write_leaves_no_file_and_reports_it() {
    let h = harness().await;
    h.fs.fail(ProviderFault::Write);

    let record = h
        .ctx
        .library
        .create_image(b"owl pixels".to_vec(), "image/png", "owl")
        .await
        .unwrap();

    assert!(record.src.is_none());
    assert!(
        !h.fs
            .files()
            .iter()
            .any(|path| path.starts_with("/vault/internal"))
    );
    assert!(
        h.toasts
            .errors()
            .iter()
            .any(|message| message.starts_with("Disk sync failed"))
    );
    assert!(
        !h.toasts
            .toasts()
            .iter()
            .any(|toast| toast.message == "Image saved to vault")
    );
}
