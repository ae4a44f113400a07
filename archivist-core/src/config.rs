//! Runtime tuning for the engine and its background tasks.
//!
//! These are the already-validated values the core consumes. File and
//! environment parsing lives in `archivist-config`, which converts into these
//! structs.

use std::path::PathBuf;

use archivist_model::GeneralSettings;
use tokio::time::Duration;

/// Disk sync engine timings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a second `reconcile` on the same id waits for the first.
    pub lock_wait: Duration,
    /// Ignore-list TTL after a direct write (sidecars, materialisation).
    pub write_ignore_ttl: Duration,
    /// Ignore-list TTL after a copy between vaults.
    pub copy_ignore_ttl: Duration,
    /// Ignore-list TTL after a rename.
    pub rename_ignore_ttl: Duration,
    /// Entries kept in the in-memory sync log.
    pub log_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_millis(500),
            write_ignore_ttl: Duration::from_millis(2000),
            copy_ignore_ttl: Duration::from_millis(3000),
            rename_ignore_ttl: Duration::from_millis(5000),
            log_capacity: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub fingerprint_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            fingerprint_ttl: Duration::from_millis(5000),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Quiet time before a changed path is reported.
    pub settle_window: Duration,
    /// Quiet time after the last event before the library refreshes.
    pub refresh_quiet: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            settle_window: Duration::from_millis(500),
            refresh_quiet: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub initial_delay: Duration,
    pub hash_batch: usize,
    /// Delay before the next hash batch when the previous one found work.
    pub hash_busy_delay: Duration,
    pub hash_idle_delay: Duration,
    pub metadata_batch: usize,
    pub metadata_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            hash_batch: 10,
            hash_busy_delay: Duration::from_secs(1),
            hash_idle_delay: Duration::from_secs(15),
            metadata_batch: 5,
            metadata_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Minimum spacing between full refreshes.
    pub refresh_interval: Duration,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(2),
        }
    }
}

/// Where the engine keeps its files.
#[derive(Debug, Clone, Default)]
pub struct VaultLayout {
    /// Internal vault root; overrides the stored settings when set.
    pub internal_root: Option<PathBuf>,
    /// Undo buffer for pre-delete backups.
    pub backup_dir: PathBuf,
    /// Library snapshot file; `None` keeps the library in memory.
    pub store_file: Option<PathBuf>,
    /// Folder trash instead of the platform trash.
    pub trash_dir: Option<PathBuf>,
}

/// Everything [`ArchiveContext`](crate::context::ArchiveContext) needs.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub vault: VaultLayout,
    pub engine: EngineConfig,
    pub gate: GateConfig,
    pub watch: WatchConfig,
    pub maintenance: MaintenanceConfig,
    pub library: LibraryConfig,
    /// Settings applied when the store has none yet.
    pub initial_settings: GeneralSettings,
}
