//! Configuration management for Ledgerchain

use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::blockchain::{Block, Snapshot};
use crate::error::{ChainError, Result};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub genesis: GenesisConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenesisConfig {
    #[serde(default = "default_genesis_path")]
    pub path: String,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            path: default_genesis_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// JSON lines file with one block per line.
    #[serde(default)]
    pub blocks_path: Option<String>,
    #[serde(default = "default_validate_on_load")]
    pub validate_on_load: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            blocks_path: None,
            validate_on_load: default_validate_on_load(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_genesis_path() -> String {
    "genesis.json".to_string()
}

fn default_validate_on_load() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Reads `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config: Config = match fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Config file not found, using defaults");
            Config::default()
        }
        Err(e) => return Err(e.into()),
    };

    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.genesis.path.is_empty() {
            return Err(ChainError::Config("genesis.path must be set".to_string()));
        }
        if !LOG_LEVELS.contains(&self.log.level.to_lowercase().as_str()) {
            return Err(ChainError::Config(format!(
                "log.level must be one of {:?}, got {:?}",
                LOG_LEVELS, self.log.level
            )));
        }
        Ok(())
    }

    pub fn load_genesis(&self) -> Result<Snapshot> {
        let contents = fs::read_to_string(&self.genesis.path)?;
        let genesis: Snapshot = serde_json::from_str(&contents)?;
        info!(path = %self.genesis.path, accounts = genesis.balances.len(), "Loaded genesis snapshot");
        Ok(genesis)
    }

    /// Blocks listed in `chain.blocks_path`, in file order. Blank lines are skipped.
    pub fn load_blocks(&self) -> Result<Vec<Block>> {
        let path = match &self.chain.blocks_path {
            Some(path) => path,
            None => return Ok(Vec::new()),
        };

        let contents = fs::read_to_string(path)?;
        let blocks = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<Block>(line).map_err(ChainError::from))
            .collect::<Result<Vec<_>>>()?;
        info!(path = %path, blocks = blocks.len(), "Loaded blocks");
        Ok(blocks)
    }
}
