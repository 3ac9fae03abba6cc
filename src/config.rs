//! Project configuration file (`selectest.toml`).
//!
//! A versioned struct with `#[serde(default = "...")]` per field so adding
//! a field never breaks an existing config file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default = "Config::default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "Config::default_cache_size")]
    pub cache_size: usize,

    #[serde(default)]
    pub remote_url: Option<String>,

    #[serde(default = "Config::default_remote_key")]
    pub remote_key: String,

    #[serde(default = "Config::default_extensions")]
    pub extensions: Vec<String>,
}

impl Config {
    fn default_batch_size() -> usize {
        20
    }

    fn default_cache_size() -> usize {
        100_000
    }

    fn default_remote_key() -> String {
        "baseline.db".to_string()
    }

    fn default_extensions() -> Vec<String> {
        vec!["rs".to_string()]
    }

    /// Loads `selectest.toml` from `path`. A missing file is not an error —
    /// it just means every field takes its default.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: Self::default_batch_size(),
            cache_size: Self::default_cache_size(),
            remote_url: None,
            remote_key: Self::default_remote_key(),
            extensions: Self::default_extensions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("selectest.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selectest.toml");
        std::fs::write(&path, "batch_size = 5\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.cache_size, Config::default_cache_size());
    }
}
