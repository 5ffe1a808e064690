//! Atomic topology changes
//!
//! A plan is a list of [`Step`]s executed one after another. Each step may
//! read the cluster as left by the previous one, so steps never run in
//! parallel within a plan.

mod add_node;
mod remove_node;
mod replace;

pub use add_node::AddNode;
pub use remove_node::{deprovision_best_effort, RemoveNode};
pub use replace::{ReplaceMaster, ReplaceReplica};

use crate::cells::{CellApi, CellRegistry, HealthInspector};
use crate::cluster::ClusterModel;
use crate::common::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Collaborators a step needs besides the cluster itself
#[derive(Clone)]
pub struct StepEnv {
    pub registry: Arc<CellRegistry>,
    pub cell_api: Arc<dyn CellApi>,
    pub health: HealthInspector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepType {
    AddNode,
    RemoveNode,
    ReplaceMaster,
    ReplaceReplica,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepType::AddNode => write!(f, "AddNode"),
            StepType::RemoveNode => write!(f, "RemoveNode"),
            StepType::ReplaceMaster => write!(f, "ReplaceMaster"),
            StepType::ReplaceReplica => write!(f, "ReplaceReplica"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    AddNode(AddNode),
    RemoveNode(RemoveNode),
    ReplaceMaster(ReplaceMaster),
    ReplaceReplica(ReplaceReplica),
}

impl Step {
    pub fn step_type(&self) -> StepType {
        match self {
            Step::AddNode(_) => StepType::AddNode,
            Step::RemoveNode(_) => StepType::RemoveNode,
            Step::ReplaceMaster(_) => StepType::ReplaceMaster,
            Step::ReplaceReplica(_) => StepType::ReplaceReplica,
        }
    }

    /// Progress message recorded while the step runs
    pub fn description(&self) -> String {
        match self {
            Step::AddNode(_) => "Adding node to cluster".to_string(),
            Step::RemoveNode(s) => format!("Removing node {}", s.node.id),
            Step::ReplaceMaster(s) => format!("Replacing master with size {}", s.new_size),
            Step::ReplaceReplica(s) => format!(
                "Replacing replica of size {} with size {}",
                s.old_size, s.new_size
            ),
        }
    }

    pub async fn perform(
        &self,
        env: &StepEnv,
        model: &mut ClusterModel,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self {
            Step::AddNode(s) => s.perform(env, model, cancel).await,
            Step::RemoveNode(s) => s.perform(env, model, cancel).await,
            Step::ReplaceMaster(s) => s.perform(model).await,
            Step::ReplaceReplica(s) => s.perform(model).await,
        }
    }
}
