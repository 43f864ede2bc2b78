//! Storage configuration.

use std::path::{Path, PathBuf};

use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Toml, Yaml},
};
use serde::{Deserialize, Serialize};

/// Configuration for the checkpoint database.
///
/// # Example TOML
///
/// ```toml
/// path = "/var/lib/keel/checkpointing.redb"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the redb database file.
    pub path: PathBuf,
}

impl StorageConfig {
    /// Loads the configuration from a TOML/YAML file, with `KEEL_STORAGE_`
    /// environment variable overrides (`KEEL_STORAGE_PATH=...`).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut figment = Figment::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            figment = match ext {
                "toml" => figment.merge(Toml::file(path)),
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                _ => {
                    return Err(anyhow::anyhow!(
                        "Unsupported config file format: {}. Use .toml, .yaml, or .yml",
                        ext
                    ));
                }
            };
        }
        figment = figment.merge(Env::prefixed("KEEL_STORAGE_"));

        let config: StorageConfig = figment.extract()?;
        Ok(config)
    }
}
