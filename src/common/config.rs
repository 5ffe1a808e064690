//! Configuration for cellbroker components

use crate::cells::Cell;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for overrides (`CELLBROKER__ROUTER__INITIAL_PORT=...`)
pub const ENV_PREFIX: &str = "CELLBROKER";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Cells available for placement
    #[serde(default)]
    pub cells: Vec<Cell>,

    /// Coordination store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Port allocator settings
    #[serde(default)]
    pub router: RouterConfig,

    /// Outbound cell API settings
    #[serde(default)]
    pub cell_api: CellApiConfig,

    /// Node count used when provisioning parameters omit one
    #[serde(default = "default_node_count")]
    pub default_node_count: usize,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_node_count() -> usize {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Coordination store backend selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process store, lost on restart
    #[default]
    Memory,
    /// etcd v2 keys API
    Etcd { endpoint: String },
    /// Local RocksDB directory
    Rocksdb { path: PathBuf },
}

/// Port allocator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// First port handed out on a fresh counter
    #[serde(default = "default_initial_port")]
    pub initial_port: u16,

    /// CAS attempts per allocation
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

fn default_initial_port() -> u16 {
    30000
}
fn default_max_attempts() -> usize {
    10
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            initial_port: default_initial_port(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Cell API client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellApiConfig {
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for CellApiConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CellApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            cells: Vec::new(),
            store: StoreConfig::default(),
            router: RouterConfig::default(),
            cell_api: CellApiConfig::default(),
            default_node_count: default_node_count(),
            log_level: default_log_level(),
        }
    }
}

impl BrokerConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: BrokerConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse from a TOML string
    pub fn from_toml(raw: &str) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()?;
        let cfg: BrokerConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.router.max_attempts == 0 {
            return Err(crate::Error::InvalidConfig(
                "router.max_attempts must be at least 1".into(),
            ));
        }
        if self.default_node_count == 0 {
            return Err(crate::Error::InvalidConfig(
                "default_node_count must be at least 1".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for cell in &self.cells {
            if cell.guid.is_empty() {
                return Err(crate::Error::InvalidConfig("cell guid cannot be empty".into()));
            }
            if !seen.insert(cell.guid.as_str()) {
                return Err(crate::Error::InvalidConfig(format!(
                    "duplicate cell guid: {}",
                    cell.guid
                )));
            }
        }
        Ok(())
    }
}
