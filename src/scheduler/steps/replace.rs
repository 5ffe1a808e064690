//! Vertical resize steps
//!
//! Resizing is not wired end to end: the planner never selects these steps,
//! and performing one fails with `Unsupported` without touching the cluster.

use crate::cluster::ClusterModel;
use crate::common::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceMaster {
    pub new_size: u64,
}

impl ReplaceMaster {
    pub fn new(new_size: u64) -> Self {
        Self { new_size }
    }

    pub async fn perform(&self, model: &mut ClusterModel) -> Result<()> {
        tracing::warn!(
            "Cluster {}: master replacement (size {}) requested",
            model.instance_id(),
            self.new_size
        );
        Err(Error::Unsupported(format!(
            "replacing the master with size {}",
            self.new_size
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceReplica {
    pub old_size: u64,
    pub new_size: u64,
}

impl ReplaceReplica {
    pub fn new(old_size: u64, new_size: u64) -> Self {
        Self { old_size, new_size }
    }

    pub async fn perform(&self, model: &mut ClusterModel) -> Result<()> {
        tracing::warn!(
            "Cluster {}: replica replacement ({} -> {}) requested",
            model.instance_id(),
            self.old_size,
            self.new_size
        );
        Err(Error::Unsupported(format!(
            "replacing a replica of size {} with size {}",
            self.old_size, self.new_size
        )))
    }
}
