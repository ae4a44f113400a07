use std::path::PathBuf;
use std::time::Duration;

use archivist_core::config::{
    EngineConfig, GateConfig, LibraryConfig, MaintenanceConfig, RuntimeConfig, VaultLayout,
    WatchConfig,
};
use archivist_model::GeneralSettings;
use serde::{Deserialize, Serialize};

const DEFAULT_DATA_DIR: &str = "archivist-data";
const DEFAULT_LOG_FILTER: &str = "info,archivist_core=info";

/// Top-level configuration. Every section is optional; missing fields take
/// the defaults below.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ArchivistConfig {
    pub vault: VaultSection,
    pub sync: SyncSection,
    pub gate: GateSection,
    pub watch: WatchSection,
    pub maintenance: MaintenanceSection,
    pub library: LibrarySection,
    pub settings: SettingsSection,
    pub logging: LoggingSection,
}

/// Where the archive keeps its files.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VaultSection {
    /// Base directory for everything below that is not set explicitly.
    pub data_dir: PathBuf,
    /// Internal vault root. Defaults to `<data_dir>/vault`.
    pub internal_root: Option<PathBuf>,
    /// Undo buffer for pre-delete backups. Defaults to `<data_dir>/undo`.
    pub backup_dir: Option<PathBuf>,
    /// Library snapshot. Defaults to `<data_dir>/library.json`.
    pub store_file: Option<PathBuf>,
    /// Keep the library in memory only; nothing survives a restart.
    pub in_memory: bool,
    /// Move trashed files here instead of the platform trash. Useful on
    /// headless hosts without a desktop trash.
    pub trash_dir: Option<PathBuf>,
}

impl Default for VaultSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            internal_root: None,
            backup_dir: None,
            store_file: None,
            in_memory: false,
            trash_dir: None,
        }
    }
}

/// Disk sync engine timings, in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSection {
    /// How long a second sync of the same image waits for the first.
    pub lock_wait_ms: u64,
    /// Watch suppression after writing sidecars or materialising a file.
    pub write_ignore_ttl_ms: u64,
    /// Watch suppression after copying a file between vaults.
    pub copy_ignore_ttl_ms: u64,
    /// Watch suppression after a rename. Renames report late on some
    /// platforms, so this is the longest of the three.
    pub rename_ignore_ttl_ms: u64,
    /// Entries kept in the in-memory sync log.
    pub log_capacity: usize,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            lock_wait_ms: 500,
            write_ignore_ttl_ms: 2_000,
            copy_ignore_ttl_ms: 3_000,
            rename_ignore_ttl_ms: 5_000,
            log_capacity: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GateSection {
    /// How long a `(size, mtime)` fingerprint suppresses repeat events.
    pub fingerprint_ttl_ms: u64,
    pub sweep_interval_ms: u64,
}

impl Default for GateSection {
    fn default() -> Self {
        Self {
            fingerprint_ttl_ms: 5_000,
            sweep_interval_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchSection {
    /// Quiet time before a changed file is handed to the reconciler. Raise
    /// it when large files are copied in slowly.
    pub settle_window_ms: u64,
    /// Quiet time after the last watch event before the library refreshes.
    pub refresh_quiet_ms: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            settle_window_ms: 500,
            refresh_quiet_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceSection {
    pub initial_delay_ms: u64,
    /// Images hashed per backfill batch.
    pub hash_batch: usize,
    pub hash_busy_delay_ms: u64,
    pub hash_idle_delay_ms: u64,
    /// Images enriched per metadata batch.
    pub metadata_batch: usize,
    pub metadata_interval_ms: u64,
}

impl Default for MaintenanceSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: 2_000,
            hash_batch: 10,
            hash_busy_delay_ms: 1_000,
            hash_idle_delay_ms: 15_000,
            metadata_batch: 5,
            metadata_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LibrarySection {
    /// Minimum spacing between full library refreshes.
    pub refresh_interval_ms: u64,
}

impl Default for LibrarySection {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 2_000,
        }
    }
}

/// Initial user settings, applied only when the library has none stored.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SettingsSection {
    pub rename_linked_vault_files: bool,
    pub delete_linked_vault_files: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

impl VaultSection {
    pub fn internal_root(&self) -> PathBuf {
        self.internal_root
            .clone()
            .unwrap_or_else(|| self.data_dir.join("vault"))
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("undo"))
    }

    pub fn store_file(&self) -> Option<PathBuf> {
        if self.in_memory {
            return None;
        }
        Some(
            self.store_file
                .clone()
                .unwrap_or_else(|| self.data_dir.join("library.json")),
        )
    }
}

impl ArchivistConfig {
    /// Resolve defaults and convert into the structs the core consumes.
    pub fn into_runtime(self) -> RuntimeConfig {
        let internal_root = self.vault.internal_root();
        RuntimeConfig {
            vault: VaultLayout {
                internal_root: Some(internal_root.clone()),
                backup_dir: self.vault.backup_dir(),
                store_file: self.vault.store_file(),
                trash_dir: self.vault.trash_dir.clone(),
            },
            engine: EngineConfig {
                lock_wait: ms(self.sync.lock_wait_ms),
                write_ignore_ttl: ms(self.sync.write_ignore_ttl_ms),
                copy_ignore_ttl: ms(self.sync.copy_ignore_ttl_ms),
                rename_ignore_ttl: ms(self.sync.rename_ignore_ttl_ms),
                log_capacity: self.sync.log_capacity.max(1),
            },
            gate: GateConfig {
                fingerprint_ttl: ms(self.gate.fingerprint_ttl_ms),
                sweep_interval: ms(self.gate.sweep_interval_ms),
            },
            watch: WatchConfig {
                settle_window: ms(self.watch.settle_window_ms),
                refresh_quiet: ms(self.watch.refresh_quiet_ms),
            },
            maintenance: MaintenanceConfig {
                initial_delay: ms(self.maintenance.initial_delay_ms),
                hash_batch: self.maintenance.hash_batch.max(1),
                hash_busy_delay: ms(self.maintenance.hash_busy_delay_ms),
                hash_idle_delay: ms(self.maintenance.hash_idle_delay_ms),
                metadata_batch: self.maintenance.metadata_batch.max(1),
                metadata_interval: ms(self.maintenance.metadata_interval_ms),
            },
            library: LibraryConfig {
                refresh_interval: ms(self.library.refresh_interval_ms),
            },
            initial_settings: GeneralSettings {
                local_vault_path: Some(internal_root),
                rename_linked_vault_files: self.settings.rename_linked_vault_files,
                delete_linked_vault_files: self.settings.delete_linked_vault_files,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_core_defaults() {
        let runtime = ArchivistConfig::default().into_runtime();
        let engine = EngineConfig::default();
        assert_eq!(runtime.engine.lock_wait, engine.lock_wait);
        assert_eq!(runtime.engine.rename_ignore_ttl, engine.rename_ignore_ttl);
        assert_eq!(runtime.engine.log_capacity, engine.log_capacity);
        assert_eq!(
            runtime.gate.fingerprint_ttl,
            GateConfig::default().fingerprint_ttl
        );
        assert_eq!(
            runtime.maintenance.hash_idle_delay,
            MaintenanceConfig::default().hash_idle_delay
        );
        assert_eq!(
            runtime.library.refresh_interval,
            LibraryConfig::default().refresh_interval
        );
    }

    #[test]
    fn paths_hang_off_the_data_dir() {
        let mut config = ArchivistConfig::default();
        config.vault.data_dir = PathBuf::from("/srv/archive");
        let runtime = config.clone().into_runtime();
        assert_eq!(
            runtime.vault.internal_root,
            Some(PathBuf::from("/srv/archive/vault"))
        );
        assert_eq!(runtime.vault.backup_dir, PathBuf::from("/srv/archive/undo"));
        assert_eq!(
            runtime.vault.store_file,
            Some(PathBuf::from("/srv/archive/library.json"))
        );

        config.vault.in_memory = true;
        assert!(config.into_runtime().vault.store_file.is_none());
    }
}
