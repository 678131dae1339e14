use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::catalog::{CatalogOptions, DEFAULT_LOAD_TIMEOUT, DEFAULT_SNAPSHOT_KEY};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CarpartsConfig {
    /// Directory holding the persisted snapshot
    pub data_dir: Option<String>,
    /// Seed SQLite file used on a cold start
    pub seed: Option<String>,
    pub snapshot_key: Option<String>,
    pub load_timeout_secs: Option<u64>,
}

impl CarpartsConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir)
    }

    pub fn catalog_options(&self) -> CatalogOptions {
        CatalogOptions {
            snapshot_key: self
                .snapshot_key
                .clone()
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_KEY.to_string()),
            load_timeout: self
                .load_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_LOAD_TIMEOUT),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("carparts.toml")
}

pub fn default_data_dir() -> PathBuf {
    PathBuf::from(".carparts")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<CarpartsConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: CarpartsConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &CarpartsConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}
