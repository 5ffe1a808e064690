//! Fleet-wide cell load
//!
//! Health is the number of nodes each cell hosts across every persisted
//! cluster. It is recomputed from a full scan on each call and never cached.

use crate::cells::Cell;
use crate::cluster::ClusterState;
use crate::common::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Cell GUID → node count
pub type CellsHealth = HashMap<String, usize>;

/// Enumerates every persisted cluster.
#[async_trait]
pub trait ClusterLister: Send + Sync {
    async fn list_clusters(&self) -> Result<Vec<ClusterState>>;
}

#[derive(Clone)]
pub struct HealthInspector {
    lister: Arc<dyn ClusterLister>,
}

impl HealthInspector {
    pub fn new(lister: Arc<dyn ClusterLister>) -> Self {
        Self { lister }
    }

    /// Node counts for `available` cells only. Cells without nodes report 0;
    /// nodes on cells outside `available` are ignored.
    pub async fn inspect(&self, available: &[Cell]) -> Result<CellsHealth> {
        let mut health: CellsHealth = available.iter().map(|c| (c.guid.clone(), 0)).collect();

        let clusters = self.lister.list_clusters().await?;
        for cluster in &clusters {
            for node in &cluster.nodes {
                if let Some(count) = health.get_mut(&node.cell_guid) {
                    *count += 1;
                }
            }
        }

        tracing::debug!(
            "Inspected {} clusters across {} cells",
            clusters.len(),
            health.len()
        );
        Ok(health)
    }
}
