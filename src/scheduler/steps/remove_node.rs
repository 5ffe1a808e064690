use super::StepEnv;
use crate::cells::{Cell, CellApi, DeprovisionRequest};
use crate::cluster::{ClusterModel, Node};
use crate::common::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Deprovision one node and drop it from the cluster.
#[derive(Debug, Clone)]
pub struct RemoveNode {
    pub node: Node,
}

impl RemoveNode {
    pub fn new(node: Node) -> Self {
        Self { node }
    }

    pub async fn perform(
        &self,
        env: &StepEnv,
        model: &mut ClusterModel,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let cell = env.registry.get(&self.node.cell_guid).ok_or_else(|| {
            Error::Internal(format!(
                "cell {} of node {} is no longer configured",
                self.node.cell_guid, self.node.id
            ))
        })?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        deprovision_best_effort(env.cell_api.as_ref(), cell, &self.node).await;

        model.remove_node(&self.node.id).await
    }
}

/// Ask the cell to deprovision `node`, logging and swallowing any failure.
///
/// The node is dropped from the cluster record whatever the cell answers, so
/// a cell that is down or has already lost the node cannot block scale-in or
/// teardown. Anything the cell failed to clean up is left behind on it.
pub async fn deprovision_best_effort(cell_api: &dyn CellApi, cell: &Cell, node: &Node) {
    let request = DeprovisionRequest {
        plan_id: node.plan_id.clone(),
        service_id: node.service_id.clone(),
    };
    if let Err(e) = cell_api.deprovision(cell, &node.id, &request).await {
        tracing::warn!(
            "Deprovisioning node {} on cell {} failed, removing it anyway: {}",
            node.id,
            cell.guid,
            e
        );
    }
}
