use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tracing::debug;

use crate::models::ArchivistConfig;

pub const CONFIG_PATH_ENV: &str = "ARCHIVIST_CONFIG_PATH";
pub const CONFIG_JSON_ENV: &str = "ARCHIVIST_CONFIG_JSON";

const CANDIDATES: &[&str] = &[
    "archivist.toml",
    "archivist.json",
    "config/archivist.toml",
    "config/archivist.json",
];

/// Where the loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

impl ArchivistConfig {
    /// Load configuration. A `.env` file in the working directory is read
    /// first, then the first hit wins:
    /// 1) `$ARCHIVIST_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$ARCHIVIST_CONFIG_JSON` (inline JSON),
    /// 3) `archivist.toml` or `config/archivist.toml`,
    /// 4) defaults.
    pub fn load_from_env() -> anyhow::Result<(Self, ConfigSource)> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(err) if err.not_found() => {}
            Err(err) => return Err(err).context("failed to read .env"),
        }

        if let Ok(path_str) = env::var(CONFIG_PATH_ENV)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Ok(raw) = env::var(CONFIG_JSON_ENV)
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .with_context(|| format!("failed to parse {CONFIG_JSON_ENV}"))?;
            return Ok((parsed, ConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file(Path::new(".")) {
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((Self::default(), ConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents)
                .with_context(|| format!("invalid config {}", path.display())),
            Some("toml") => toml::from_str(&contents)
                .map_err(|err| anyhow!("invalid config {}: {err}", path.display())),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    /// TOML first, then JSON.
    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse config {origin}: toml error: {toml_err}; json error: {json_err}"
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).map_err(|err| anyhow!("invalid config json: {err}"))
    }

    /// First default config file under `base`.
    pub fn find_default_file(base: &Path) -> Option<PathBuf> {
        CANDIDATES
            .iter()
            .map(|candidate| base.join(candidate))
            .find(|path| path.is_file())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = ArchivistConfig::parse_from_str(
            r#"
            [vault]
            internal_root = "/data/vault"

            [sync]
            rename_ignore_ttl_ms = 8000
            "#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.vault.internal_root, Some(PathBuf::from("/data/vault")));
        assert_eq!(config.sync.rename_ignore_ttl_ms, 8_000);
        assert_eq!(config.sync.lock_wait_ms, 500);
        assert_eq!(config.watch.settle_window_ms, 500);
    }

    #[test]
    fn json_files_are_accepted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archivist.json");
        fs::write(&path, r#"{"maintenance": {"hash_batch": 25}}"#).unwrap();

        let config = ArchivistConfig::load_from_file(&path).unwrap();
        assert_eq!(config.maintenance.hash_batch, 25);
        assert_eq!(config.maintenance.metadata_batch, 5);
    }

    #[test]
    fn broken_files_name_their_origin() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archivist.conf");
        fs::write(&path, "not = [valid").unwrap();

        let err = ArchivistConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("archivist.conf"));
    }

    #[test]
    fn default_file_lookup_prefers_the_top_level_file() {
        let dir = tempdir().unwrap();
        assert!(ArchivistConfig::find_default_file(dir.path()).is_none());

        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(dir.path().join("config/archivist.toml"), "").unwrap();
        assert_eq!(
            ArchivistConfig::find_default_file(dir.path()),
            Some(dir.path().join("config/archivist.toml"))
        );

        fs::write(dir.path().join("archivist.toml"), "").unwrap();
        assert_eq!(
            ArchivistConfig::find_default_file(dir.path()),
            Some(dir.path().join("archivist.toml"))
        );
    }
}
