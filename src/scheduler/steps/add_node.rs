use super::StepEnv;
use crate::cells::{Cell, NodeParameters, ProvisionRequest};
use crate::cluster::{ClusterModel, ClusterState, Node};
use crate::common::{generate_node_id, Error, Result};
use crate::scheduler::placement::Placement;
use tokio_util::sync::CancellationToken;

/// Provision one new node on the best cell that accepts it.
#[derive(Debug, Clone)]
pub struct AddNode {
    /// Cells allowed for the new node
    pub candidates: Vec<Cell>,
}

impl AddNode {
    pub fn new(candidates: Vec<Cell>) -> Self {
        Self { candidates }
    }

    pub async fn perform(
        &self,
        env: &StepEnv,
        model: &mut ClusterModel,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let health = env.health.inspect(&self.candidates).await?;
        let ordered = Placement::new(&env.registry).order(&self.candidates, model.nodes(), &health);

        for cell in &ordered {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let node_id = generate_node_id();
            let request = provision_request(model.cluster(), &node_id);
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                res = env.cell_api.provision(cell, &node_id, &request) => res,
            };

            match outcome {
                Ok(()) => {
                    let node = Node {
                        id: node_id,
                        cell_guid: cell.guid.clone(),
                        plan_id: model.cluster().plan_id.clone(),
                        service_id: model.cluster().service_id.clone(),
                    };
                    return model.add_node(node).await;
                }
                Err(e) => {
                    tracing::warn!(
                        "Cluster {}: cell {} rejected node, trying next: {}",
                        model.instance_id(),
                        cell.guid,
                        e
                    );
                }
            }
        }

        Err(Error::PlacementExhausted {
            attempted: ordered.len(),
        })
    }
}

fn provision_request(cluster: &ClusterState, node_id: &str) -> ProvisionRequest {
    ProvisionRequest {
        organization_guid: cluster.organization_guid.clone(),
        plan_id: cluster.plan_id.clone(),
        service_id: cluster.service_id.clone(),
        space_guid: cluster.space_guid.clone(),
        parameters: NodeParameters {
            scope: cluster.instance_id.clone(),
            node_id: node_id.to_string(),
            admin_username: cluster.admin_credentials.username.clone(),
            admin_password: cluster.admin_credentials.password.clone(),
            superuser_username: cluster.superuser_credentials.username.clone(),
            superuser_password: cluster.superuser_credentials.password.clone(),
            app_username: cluster.app_credentials.username.clone(),
            app_password: cluster.app_credentials.password.clone(),
        },
    }
}
