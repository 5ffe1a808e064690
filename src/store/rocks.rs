//! Coordination store on RocksDB
//!
//! Single-node durable backend. Directories are key prefixes; values are
//! bincode-encoded with an optional expiry. Writes are serialized by a mutex
//! so CAS guards hold against concurrent tasks in this process.

use super::{build_tree, normalize_key, CoordinationStore, GetOptions, SetOptions, StoreNode};
use crate::common::{timestamp_now, Error, Result};
use async_trait::async_trait;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
    value: String,
    /// Unix seconds
    expires_at: Option<u64>,
}

impl StoredValue {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.map_or(true, |t| t > now)
    }
}

/// RocksDB store
pub struct RocksStore {
    db: DB,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create the store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path)?;
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn read(&self, key: &str) -> Result<Option<StoredValue>> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => {
                let stored: StoredValue = bincode::deserialize(&bytes)?;
                Ok(Some(stored).filter(|s| s.is_live(timestamp_now())))
            }
            None => Ok(None),
        }
    }

    /// Live `(key, value)` pairs below `prefix`, sorted
    fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let now = timestamp_now();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key_bytes, value_bytes) = item?;
            if !key_bytes.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8(key_bytes.to_vec())
                .map_err(|_| Error::Store("invalid UTF-8 key".into()))?;
            let stored: StoredValue = bincode::deserialize(&value_bytes)?;
            if stored.is_live(now) {
                entries.push((key, stored.value));
            }
        }
        Ok(entries)
    }

    fn dir_prefix(key: &str) -> String {
        if key == "/" {
            "/".to_string()
        } else {
            format!("{}/", key)
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| Error::Internal("rocks store lock poisoned".into()))
    }

    /// Flush to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for RocksStore {
    async fn get(&self, key: &str, opts: GetOptions) -> Result<StoreNode> {
        let key = normalize_key(key);
        if let Some(stored) = self.read(&key)? {
            return Ok(StoreNode::leaf(key, stored.value));
        }

        let children = self.scan(&Self::dir_prefix(&key))?;
        if children.is_empty() && key != "/" {
            return Err(Error::KeyNotFound(key));
        }
        Ok(build_tree(&key, &children, opts.recursive))
    }

    async fn set(&self, key: &str, value: &str, opts: SetOptions) -> Result<()> {
        let key = normalize_key(key);
        let _guard = self.lock()?;

        if !self.scan(&Self::dir_prefix(&key))?.is_empty() {
            return Err(Error::Store(format!("not a file: {}", key)));
        }

        let current = self.read(&key)?;
        match opts.prev_exist {
            Some(false) if current.is_some() => return Err(Error::KeyExists(key)),
            Some(true) if current.is_none() => return Err(Error::KeyNotFound(key)),
            _ => {}
        }
        if let Some(expected) = &opts.prev_value {
            match &current {
                None => return Err(Error::KeyNotFound(key)),
                Some(s) if &s.value != expected => return Err(Error::CompareFailed(key)),
                Some(_) => {}
            }
        }

        let stored = StoredValue {
            value: value.to_string(),
            expires_at: opts.ttl.map(|ttl| timestamp_now() + ttl.as_secs().max(1)),
        };
        self.db.put(key.as_bytes(), bincode::serialize(&stored)?)?;
        Ok(())
    }

    async fn delete(&self, key: &str, recursive: bool) -> Result<()> {
        let key = normalize_key(key);
        let _guard = self.lock()?;

        if self.read(&key)?.is_some() {
            self.db.delete(key.as_bytes())?;
            return Ok(());
        }

        let children = self.scan(&Self::dir_prefix(&key))?;
        if children.is_empty() {
            return Err(Error::KeyNotFound(key));
        }
        if !recursive {
            return Err(Error::Store(format!("directory not empty: {}", key)));
        }

        let mut batch = WriteBatch::default();
        for (child, _) in &children {
            batch.delete(child.as_bytes());
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocks_store_cas() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path().join("coord.db")).unwrap();

        store
            .set("/routing/nextport", "30000", SetOptions::create_only())
            .await
            .unwrap();
        assert!(matches!(
            store
                .set("/routing/nextport", "1", SetOptions::create_only())
                .await,
            Err(Error::KeyExists(_))
        ));
        assert!(matches!(
            store
                .set("/routing/nextport", "30002", SetOptions::swap("30001"))
                .await,
            Err(Error::CompareFailed(_))
        ));
        store
            .set("/routing/nextport", "30001", SetOptions::swap("30000"))
            .await
            .unwrap();

        let node = store
            .get("/routing/nextport", GetOptions::default())
            .await
            .unwrap();
        assert_eq!(node.value.as_deref(), Some("30001"));
    }

    #[tokio::test]
    async fn test_rocks_store_directories_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coord.db");

        {
            let store = RocksStore::open(&path).unwrap();
            store.set("/service/a/state", "sa", SetOptions::default()).await.unwrap();
            store.set("/service/b/state", "sb", SetOptions::default()).await.unwrap();
            store.flush().unwrap();
        }

        let store = RocksStore::open(&path).unwrap();
        let tree = store.get("/service", GetOptions::recursive()).await.unwrap();
        assert_eq!(tree.nodes.len(), 2);

        store.delete("/service/a", true).await.unwrap();
        let tree = store.get("/service", GetOptions::recursive()).await.unwrap();
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].name(), "b");
    }
}
