use std::path::PathBuf;

/// User-facing library settings persisted alongside the records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct GeneralSettings {
    /// Root of the app-managed vault. Disk sync is inert until this is set.
    pub local_vault_path: Option<PathBuf>,
    /// Rename files inside linked folders when their title changes.
    pub rename_linked_vault_files: bool,
    /// Physically trash files inside linked folders when they are deleted.
    pub delete_linked_vault_files: bool,
}
