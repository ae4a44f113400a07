//! Configuration for Archivist.
//!
//! Loads [`ArchivistConfig`] from a file, the environment or built-in
//! defaults, converts it into the runtime structs `archivist-core` consumes,
//! and bootstraps tracing for the `archivist-sync` binary.

#![allow(missing_docs)]

pub mod loader;
pub mod logging;
pub mod models;

pub use loader::ConfigSource;
pub use logging::init_tracing;
pub use models::{
    ArchivistConfig, GateSection, LibrarySection, LoggingSection, MaintenanceSection,
    SettingsSection, SyncSection, VaultSection, WatchSection,
};
