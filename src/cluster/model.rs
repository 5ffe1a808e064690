//! In-memory cluster state bound to its persistence
//!
//! Every mutation updates the local copy and then saves the entire record.
//! Reads within one process see their own writes; nothing guards against a
//! second process mutating the same instance concurrently.

use crate::cluster::{ClusterState, Node, PlanStatus, State};
use crate::common::Result;

pub struct ClusterModel {
    state: State,
    cluster: ClusterState,
}

impl ClusterModel {
    pub fn new(state: State, cluster: ClusterState) -> Self {
        Self { state, cluster }
    }

    /// Load the persisted record of `instance_id`
    pub async fn load(state: State, instance_id: &str) -> Result<Self> {
        let cluster = state.load_cluster(instance_id).await?;
        Ok(Self::new(state, cluster))
    }

    pub fn instance_id(&self) -> &str {
        &self.cluster.instance_id
    }

    pub fn cluster(&self) -> &ClusterState {
        &self.cluster
    }

    pub fn nodes(&self) -> &[Node] {
        &self.cluster.nodes
    }

    pub fn node_count(&self) -> usize {
        self.cluster.node_count()
    }

    pub async fn save(&self) -> Result<()> {
        self.state.save_cluster(&self.cluster).await
    }

    pub async fn add_node(&mut self, node: Node) -> Result<()> {
        tracing::info!(
            "Cluster {}: added node {} on cell {}",
            self.cluster.instance_id,
            node.id,
            node.cell_guid
        );
        self.cluster.nodes.push(node);
        self.save().await
    }

    /// Drop the node with `node_id`; unknown IDs leave the record untouched
    /// but still persist it.
    pub async fn remove_node(&mut self, node_id: &str) -> Result<()> {
        let before = self.cluster.nodes.len();
        self.cluster.nodes.retain(|n| n.id != node_id);
        if self.cluster.nodes.len() == before {
            tracing::warn!(
                "Cluster {}: node {} not present",
                self.cluster.instance_id,
                node_id
            );
        }
        self.save().await
    }

    /// Reset progress for a plan of `steps` steps and clear any old error.
    pub async fn new_cluster_plan(&mut self, steps: usize) -> Result<()> {
        self.cluster.plan.steps = steps;
        self.cluster.plan.completed_steps = 0;
        self.cluster.plan.message = String::new();
        self.cluster.error_msg.clear();
        self.save().await
    }

    pub async fn plan_step_started(&mut self, message: impl Into<String>) -> Result<()> {
        self.cluster.plan.message = message.into();
        self.save().await
    }

    pub async fn plan_step_completed(&mut self) -> Result<()> {
        self.cluster.plan.completed_steps += 1;
        self.save().await
    }

    pub async fn plan_error(&mut self, err: &crate::Error) -> Result<()> {
        self.cluster.error_msg = err.to_string();
        self.save().await
    }

    pub fn current_plan_status(&self) -> (PlanStatus, String) {
        self.cluster.plan_status()
    }
}
