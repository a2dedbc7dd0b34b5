//! Command line arguments and the YAML service configuration.

use std::path::Path;

use clap::Parser;
use common::StorageConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// CLI arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "graphite")]
#[command(about = "Graphite-compatible time series query server")]
pub struct CliArgs {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "GRAPHITE_CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(short, long, default_value = "8000", env = "GRAPHITE_PORT")]
    pub port: u16,
}

/// Service configuration, loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    /// Prefix of every partition table name.
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    /// Maximum number of metric names read in one backend request.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

fn default_table_prefix() -> String {
    "diamondb.timeseries".to_string()
}

fn default_batch_limit() -> usize {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            table_prefix: default_table_prefix(),
            batch_limit: default_batch_limit(),
        }
    }
}

impl Config {
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            table_prefix: self.table_prefix.clone(),
            batch_limit: self.batch_limit,
        }
    }

    fn validate(self) -> Result<Self> {
        if self.batch_limit == 0 {
            return Err(Error::Config("batch_limit must be at least 1".to_string()));
        }
        if self.table_prefix.is_empty() {
            return Err(Error::Config("table_prefix must not be empty".to_string()));
        }
        Ok(self)
    }
}

/// Settings the partition selector and fetch engine need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub table_prefix: String,
    pub batch_limit: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Config::default().fetch_config()
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
    parse_config(&contents)
}

fn parse_config(yaml: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(yaml)
        .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
    config.validate()
}
