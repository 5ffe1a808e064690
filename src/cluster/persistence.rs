//! Cluster records in the coordination store
//!
//! Layout:
//! - `/service/<instance id>/state`: JSON-encoded [`ClusterState`]
//! - `/service/<instance id>/plan_id`: service plan, kept for lookups
//!
//! Saves overwrite the whole record with no version check, so two writers on
//! the same instance race and the last one wins.

use crate::cells::ClusterLister;
use crate::cluster::ClusterState;
use crate::common::{Error, Result};
use crate::store::{CoordinationStore, GetOptions, SetOptions};
use async_trait::async_trait;
use std::sync::Arc;

const SERVICE_ROOT: &str = "/service";

fn instance_dir(instance_id: &str) -> String {
    format!("{}/{}", SERVICE_ROOT, instance_id)
}

fn state_key(instance_id: &str) -> String {
    format!("{}/{}/state", SERVICE_ROOT, instance_id)
}

fn plan_id_key(instance_id: &str) -> String {
    format!("{}/{}/plan_id", SERVICE_ROOT, instance_id)
}

/// Persistence handle for cluster records
#[derive(Clone)]
pub struct State {
    store: Arc<dyn CoordinationStore>,
}

impl State {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    pub async fn cluster_exists(&self, instance_id: &str) -> Result<bool> {
        match self
            .store
            .get(&state_key(instance_id), GetOptions::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(Error::KeyNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn save_cluster(&self, cluster: &ClusterState) -> Result<()> {
        let encoded = serde_json::to_string(cluster)?;
        self.store
            .set(&state_key(&cluster.instance_id), &encoded, SetOptions::default())
            .await?;
        self.store
            .set(
                &plan_id_key(&cluster.instance_id),
                &cluster.plan_id,
                SetOptions::default(),
            )
            .await?;
        tracing::debug!(
            "Saved cluster {} ({} nodes)",
            cluster.instance_id,
            cluster.node_count()
        );
        Ok(())
    }

    pub async fn load_cluster(&self, instance_id: &str) -> Result<ClusterState> {
        let node = match self
            .store
            .get(&state_key(instance_id), GetOptions::default())
            .await
        {
            Ok(node) => node,
            Err(Error::KeyNotFound(_)) => {
                return Err(Error::InstanceNotFound(instance_id.to_string()))
            }
            Err(e) => return Err(e),
        };

        let raw = node
            .value
            .ok_or_else(|| Error::Store(format!("{} is a directory", node.key)))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Remove the whole instance directory. Deleting a missing instance is a
    /// no-op.
    pub async fn delete_cluster(&self, instance_id: &str) -> Result<()> {
        match self.store.delete(&instance_dir(instance_id), true).await {
            Ok(()) => {
                tracing::info!("Deleted cluster {}", instance_id);
                Ok(())
            }
            Err(Error::KeyNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Stored service plan of an instance
    pub async fn plan_id(&self, instance_id: &str) -> Result<String> {
        match self
            .store
            .get(&plan_id_key(instance_id), GetOptions::default())
            .await
        {
            Ok(node) => Ok(node.value.unwrap_or_default()),
            Err(Error::KeyNotFound(_)) => Err(Error::InstanceNotFound(instance_id.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Every persisted cluster. Instance directories without a state record
    /// are skipped.
    pub async fn list_clusters(&self) -> Result<Vec<ClusterState>> {
        let root = match self.store.get(SERVICE_ROOT, GetOptions::recursive()).await {
            Ok(root) => root,
            Err(Error::KeyNotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut clusters = Vec::with_capacity(root.nodes.len());
        for instance in root.nodes.iter().filter(|n| n.dir) {
            let Some(raw) = instance.child("state").and_then(|s| s.value.as_deref()) else {
                tracing::warn!("Instance directory {} has no state record", instance.key);
                continue;
            };
            clusters.push(serde_json::from_str(raw)?);
        }
        Ok(clusters)
    }
}

#[async_trait]
impl ClusterLister for State {
    async fn list_clusters(&self) -> Result<Vec<ClusterState>> {
        State::list_clusters(self).await
    }
}
