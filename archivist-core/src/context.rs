//! Wiring for a running archive.
//!
//! [`ArchiveContext`] owns one instance of every service and hands out
//! shared references. Nothing runs in the background until
//! [`ArchiveContext::start`] is called.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use archivist_model::{GeneralSettings, SourceKind};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::event_gate::EventGate;
use crate::history::HistoryCoordinator;
use crate::import::{DuplicateResolver, Importer};
use crate::library::{LibraryService, RefreshSink};
use crate::maintenance::{HashBackfill, MaintenanceHandle, MetadataEnrichment, spawn_maintenance};
use crate::provider::{AllowList, FsProvider, LocalFsProvider, TrashBin};
use crate::store::{InMemoryStore, JsonFileStore, LibraryStore};
use crate::sync::DiskSyncEngine;
use crate::toast::{Notifier, TracingNotifier};
use crate::watcher::{RefreshDebouncer, ReconcilePass, VaultWatcher, WatchReconciler};

/// Every service of one archive, wired together.
pub struct ArchiveContext {
    pub provider: Arc<dyn FsProvider>,
    pub store: Arc<dyn LibraryStore>,
    pub gate: Arc<EventGate>,
    pub notifier: Arc<dyn Notifier>,
    pub engine: Arc<DiskSyncEngine>,
    pub history: Arc<HistoryCoordinator>,
    pub library: Arc<LibraryService>,
    pub importer: Arc<Importer>,
    pub reconciler: Arc<WatchReconciler>,
    pub pass: Arc<ReconcilePass>,
    pub watcher: Arc<VaultWatcher>,
    pub hashes: Arc<HashBackfill>,
    pub metadata: Arc<MetadataEnrichment>,
    config: RuntimeConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    maintenance: Mutex<Option<MaintenanceHandle>>,
}

impl fmt::Debug for ArchiveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveContext")
            .field("engine", &self.engine)
            .field("watcher", &self.watcher)
            .field("started", &self.sweeper.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl ArchiveContext {
    /// Open the archive described by `config` on the local filesystem.
    pub async fn build(
        config: RuntimeConfig,
        resolver: Arc<dyn DuplicateResolver>,
    ) -> Result<Self> {
        let mut provider = LocalFsProvider::new(AllowList::new(None), &config.vault.backup_dir)
            .with_settle_window(config.watch.settle_window);
        if let Some(dir) = &config.vault.trash_dir {
            provider = provider.with_trash(TrashBin::Folder(dir.clone()));
        }

        let store: Arc<dyn LibraryStore> = match &config.vault.store_file {
            Some(path) => Arc::new(JsonFileStore::open(path).await?),
            None => Arc::new(InMemoryStore::new()),
        };
        Self::from_parts(
            Arc::new(provider),
            store,
            Arc::new(TracingNotifier),
            resolver,
            config,
        )
        .await
    }

    /// Wire an archive around an existing provider and store.
    ///
    /// Seeds the stored settings on first use and registers every known
    /// vault root with the provider's allow-list.
    pub async fn from_parts(
        provider: Arc<dyn FsProvider>,
        store: Arc<dyn LibraryStore>,
        notifier: Arc<dyn Notifier>,
        resolver: Arc<dyn DuplicateResolver>,
        config: RuntimeConfig,
    ) -> Result<Self> {
        let settings = seed_settings(&*store, &config).await?;
        let allow = provider.allow_list();
        if settings.local_vault_path.is_some() {
            allow.set_internal(settings.local_vault_path.clone());
        }
        for source in store.list_sources().await? {
            if source.kind == SourceKind::LocalFolder
                && let Some(path) = &source.path
            {
                allow.add_root(path);
            }
        }

        let gate = Arc::new(EventGate::new(config.gate.clone()));
        let engine = Arc::new(DiskSyncEngine::new(
            Arc::clone(&provider),
            Arc::clone(&store),
            Arc::clone(&gate),
            Arc::clone(&notifier),
            config.engine.clone(),
        ));
        let history = Arc::new(HistoryCoordinator::new(Arc::clone(&engine)));
        let library = Arc::new(LibraryService::new(
            Arc::clone(&engine),
            Arc::clone(&history),
            config.library.clone(),
        ));
        let importer = Arc::new(Importer::new(Arc::clone(&engine), resolver));

        let hashes = Arc::new(HashBackfill::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            config.maintenance.hash_batch,
        ));
        let metadata = Arc::new(MetadataEnrichment::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            config.maintenance.metadata_batch,
        ));
        let reconciler = Arc::new(
            WatchReconciler::new(Arc::clone(&engine)).with_enrichment(Arc::clone(&metadata)),
        );
        let pass = Arc::new(ReconcilePass::new(Arc::clone(&reconciler)));

        let sink: Arc<dyn RefreshSink> = library.clone();
        let debouncer = Arc::new(RefreshDebouncer::spawn(sink, config.watch.refresh_quiet));
        let watcher = Arc::new(VaultWatcher::new(
            Arc::clone(&provider),
            Arc::clone(&reconciler),
            debouncer,
        ));
        library.attach_watcher(&watcher);

        Ok(Self {
            provider,
            store,
            gate,
            notifier,
            engine,
            history,
            library,
            importer,
            reconciler,
            pass,
            watcher,
            hashes,
            metadata,
            config,
            sweeper: Mutex::new(None),
            maintenance: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Every vault root the library currently knows about.
    pub async fn vault_roots(&self) -> Result<Vec<PathBuf>> {
        let layout = self.engine.layout().await?;
        Ok(layout
            .roots
            .iter()
            .map(|(_, root)| root.to_path_buf())
            .collect())
    }

    /// Start the gate sweeper, the watches on every vault and the
    /// maintenance loops. Calling it again restarts nothing.
    pub async fn start(&self) -> Result<()> {
        {
            let mut sweeper = self.sweeper.lock();
            if sweeper.is_some() {
                return Ok(());
            }
            *sweeper = Some(self.gate.spawn_sweeper());
        }

        for root in self.vault_roots().await? {
            if let Err(err) = self.provider.mkdir(&root).await {
                warn!(root = %root.display(), error = %err, "could not create vault root");
                continue;
            }
            if let Err(err) = self.watcher.watch(&root).await {
                warn!(root = %root.display(), error = %err, "could not watch vault root");
            }
        }

        let sink: Arc<dyn RefreshSink> = self.library.clone();
        *self.maintenance.lock() = Some(spawn_maintenance(
            Arc::clone(&self.hashes),
            Arc::clone(&self.metadata),
            sink,
            self.config.maintenance.clone(),
        ));
        info!(roots = ?self.watcher.roots(), "archive started");
        Ok(())
    }

    /// Stop every background task. Stored data is untouched.
    pub fn shutdown(&self) {
        self.watcher.shutdown();
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }
        if let Some(mut maintenance) = self.maintenance.lock().take() {
            maintenance.stop();
        }
    }
}

impl Drop for ArchiveContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Stored settings, seeded from `config` on first use. A configured
/// internal root always wins over the stored one.
async fn seed_settings(store: &dyn LibraryStore, config: &RuntimeConfig) -> Result<GeneralSettings> {
    let stored = store.load_settings().await?;
    let mut settings = stored.clone().unwrap_or_else(|| config.initial_settings.clone());
    if let Some(root) = &config.vault.internal_root {
        settings.local_vault_path = Some(root.clone());
    }
    if stored.as_ref() != Some(&settings) {
        store.save_settings(settings.clone()).await?;
    }
    Ok(settings)
}
