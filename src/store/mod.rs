//! Coordination store abstraction
//!
//! A hierarchical key-value store with etcd v2 semantics:
//! - Keys are `/`-separated paths; directories exist implicitly
//! - `set` accepts compare-and-swap guards (`prev_value`, `prev_exist`)
//! - `get` and `delete` can operate recursively on directories
//!
//! Backends: in-memory (tests, single process), etcd v2 over HTTP, RocksDB.

pub mod etcd;
pub mod memory;
pub mod rocks;

use crate::common::{Result, StoreConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use etcd::EtcdStore;
pub use memory::MemoryStore;
pub use rocks::RocksStore;

/// A key or directory returned by [`CoordinationStore::get`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreNode {
    pub key: String,
    /// `None` for directories
    pub value: Option<String>,
    pub dir: bool,
    /// Children of a directory. Only directories ever have entries here.
    pub nodes: Vec<StoreNode>,
}

impl StoreNode {
    pub fn leaf(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            dir: false,
            nodes: Vec::new(),
        }
    }

    pub fn directory(key: impl Into<String>, nodes: Vec<StoreNode>) -> Self {
        Self {
            key: key.into(),
            value: None,
            dir: true,
            nodes,
        }
    }

    /// Last path segment of the key
    pub fn name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Find a direct child by name
    pub fn child(&self, name: &str) -> Option<&StoreNode> {
        self.nodes.iter().find(|n| n.name() == name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    pub sorted: bool,
    pub recursive: bool,
}

impl GetOptions {
    pub fn recursive() -> Self {
        Self {
            sorted: true,
            recursive: true,
        }
    }
}

/// Guards and expiry for [`CoordinationStore::set`]. No guards means an
/// unconditional write.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Succeed only if the current value equals this
    pub prev_value: Option<String>,
    /// `Some(false)`: create only; `Some(true)`: update only
    pub prev_exist: Option<bool>,
    pub ttl: Option<Duration>,
}

impl SetOptions {
    pub fn create_only() -> Self {
        Self {
            prev_exist: Some(false),
            ..Default::default()
        }
    }

    pub fn swap(prev_value: impl Into<String>) -> Self {
        Self {
            prev_value: Some(prev_value.into()),
            ..Default::default()
        }
    }
}

/// Durable KV store shared by every broker process.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Fetch a key or directory. Missing keys yield `Error::KeyNotFound`.
    async fn get(&self, key: &str, opts: GetOptions) -> Result<StoreNode>;

    /// Write a value, honoring CAS guards. A failed `prev_value` guard yields
    /// `Error::CompareFailed`; a failed `prev_exist = false` guard yields
    /// `Error::KeyExists`.
    async fn set(&self, key: &str, value: &str, opts: SetOptions) -> Result<()>;

    /// Delete a key, or a whole directory when `recursive`.
    async fn delete(&self, key: &str, recursive: bool) -> Result<()>;
}

/// Open the configured backend
pub fn open(config: &StoreConfig) -> Result<Arc<dyn CoordinationStore>> {
    let store: Arc<dyn CoordinationStore> = match config {
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
        StoreConfig::Etcd { endpoint } => Arc::new(EtcdStore::new(endpoint)?),
        StoreConfig::Rocksdb { path } => Arc::new(RocksStore::open(path)?),
    };
    tracing::info!("Coordination store: {:?}", config);
    Ok(store)
}

/// Normalize a key: leading `/`, no trailing `/`, no empty segments.
pub(crate) fn normalize_key(key: &str) -> String {
    let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Assemble a directory tree below `dir` from flat `(key, value)` pairs that
/// all start with `dir/`. Input must be sorted by key.
pub(crate) fn build_tree(dir: &str, entries: &[(String, String)], recursive: bool) -> StoreNode {
    let prefix = if dir == "/" {
        "/".to_string()
    } else {
        format!("{}/", dir)
    };

    let mut children: Vec<StoreNode> = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let rest = &entries[i].0[prefix.len()..];
        match rest.split_once('/') {
            None => {
                children.push(StoreNode::leaf(entries[i].0.clone(), entries[i].1.clone()));
                i += 1;
            }
            Some((name, _)) => {
                let child_key = format!("{}{}", prefix, name);
                let child_prefix = format!("{}/", child_key);
                let end = entries[i..]
                    .iter()
                    .position(|(k, _)| !k.starts_with(&child_prefix))
                    .map(|p| i + p)
                    .unwrap_or(entries.len());
                let nested = if recursive {
                    build_tree(&child_key, &entries[i..end], true).nodes
                } else {
                    Vec::new()
                };
                children.push(StoreNode::directory(child_key, nested));
                i = end;
            }
        }
    }

    StoreNode::directory(dir, children)
}
