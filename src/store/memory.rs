//! In-process coordination store
//!
//! Same CAS and directory semantics as the etcd backend, held in a sorted map.

use super::{build_tree, normalize_key, CoordinationStore, GetOptions, SetOptions, StoreNode};
use crate::common::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |t| t > now)
    }
}

/// In-memory store (default)
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<BTreeMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, BTreeMap<String, Entry>>> {
        let mut map = self
            .map
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".into()))?;
        let now = Instant::now();
        map.retain(|_, e| e.is_live(now));
        Ok(map)
    }

    fn dir_prefix(key: &str) -> String {
        if key == "/" {
            "/".to_string()
        } else {
            format!("{}/", key)
        }
    }

    fn has_children(map: &BTreeMap<String, Entry>, key: &str) -> bool {
        let prefix = Self::dir_prefix(key);
        map.range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix))
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get(&self, key: &str, opts: GetOptions) -> Result<StoreNode> {
        let key = normalize_key(key);
        let map = self.entries()?;

        if let Some(entry) = map.get(&key) {
            return Ok(StoreNode::leaf(key, entry.value.clone()));
        }

        let prefix = Self::dir_prefix(&key);
        let children: Vec<(String, String)> = map
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect();

        if children.is_empty() && key != "/" {
            return Err(Error::KeyNotFound(key));
        }

        Ok(build_tree(&key, &children, opts.recursive))
    }

    async fn set(&self, key: &str, value: &str, opts: SetOptions) -> Result<()> {
        let key = normalize_key(key);
        let mut map = self.entries()?;

        if Self::has_children(&map, &key) {
            return Err(Error::Store(format!("not a file: {}", key)));
        }

        let current = map.get(&key);
        match opts.prev_exist {
            Some(false) if current.is_some() => return Err(Error::KeyExists(key)),
            Some(true) if current.is_none() => return Err(Error::KeyNotFound(key)),
            _ => {}
        }
        if let Some(expected) = &opts.prev_value {
            match current {
                None => return Err(Error::KeyNotFound(key)),
                Some(e) if &e.value != expected => return Err(Error::CompareFailed(key)),
                Some(_) => {}
            }
        }

        tracing::debug!("memory store set {}", key);
        map.insert(
            key,
            Entry {
                value: value.to_string(),
                expires_at: opts.ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str, recursive: bool) -> Result<()> {
        let key = normalize_key(key);
        let mut map = self.entries()?;

        if map.remove(&key).is_some() {
            return Ok(());
        }

        if !Self::has_children(&map, &key) {
            return Err(Error::KeyNotFound(key));
        }
        if !recursive {
            return Err(Error::Store(format!("directory not empty: {}", key)));
        }

        let prefix = Self::dir_prefix(&key);
        map.retain(|k, _| !k.starts_with(&prefix));
        tracing::debug!("memory store deleted directory {}", key);
        Ok(())
    }
}
