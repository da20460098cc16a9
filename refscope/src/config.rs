//! # Chain Registry
//!
//! Maps chain ids to gRPC addresses, stored as a JSON file:
//!
//! ```json
//! { "chains": { "cosmoshub": { "grpc_addr": "grpc.cosmos.example:443" } } }
//! ```
use anyhow::{Context, Result};
use directories::ProjectDirs;
use refscope_core::target::ChainRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub chains: BTreeMap<String, ChainConfig>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct ChainConfig {
    #[serde(default)]
    pub grpc_addr: String,
}

impl ChainRegistry for Config {
    fn grpc_address(&self, chain_id: &str) -> Option<String> {
        self.chains.get(chain_id).map(|chain| chain.grpc_addr.clone())
    }

    fn chain_ids(&self) -> Vec<String> {
        self.chains.keys().cloned().collect()
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Uses `path` if given, otherwise `config.json` in the platform's config directory.
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path,
            None => ProjectDirs::from("", "", "refscope")
                .context("Could not determine config directory")?
                .config_dir()
                .join("config.json"),
        };

        Ok(Self { config_path })
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Loads the registry. A missing file is an empty registry.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            tracing::debug!(path = %self.config_path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&self.config_path).with_context(|| {
            format!("failed to read config file {}", self.config_path.display())
        })?;

        serde_json::from_str(&content).with_context(|| {
            format!("failed to parse config file {}", self.config_path.display())
        })
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(dir) = self.config_path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create config directory {}", dir.display()))?;
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_path, content).with_context(|| {
            format!("failed to write config file {}", self.config_path.display())
        })?;

        tracing::debug!(path = %self.config_path.display(), "Saved config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &tempfile::TempDir) -> ConfigManager {
        ConfigManager::new(Some(dir.path().join("nested").join("config.json"))).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty_registry() {
        let dir = tempfile::tempdir().unwrap();

        let config = manager(&dir).load().unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let mut config = Config::default();
        config.chains.insert(
            "cosmoshub".to_string(),
            ChainConfig {
                grpc_addr: "localhost:9090".to_string(),
            },
        );
        manager.save(&config).unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded.grpc_address("cosmoshub").as_deref(), Some("localhost:9090"));
        assert_eq!(loaded.grpc_address("osmosis"), None);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = ConfigManager::new(Some(path)).unwrap().load().unwrap_err();

        assert!(
            err.to_string().starts_with("failed to parse config file"),
            "unexpected message: {err}"
        );
    }

    #[test]
    fn test_chain_without_address_field() {
        let config: Config = serde_json::from_str(r#"{ "chains": { "osmosis": {} } }"#).unwrap();

        assert_eq!(config.grpc_address("osmosis").as_deref(), Some(""));
    }
}
