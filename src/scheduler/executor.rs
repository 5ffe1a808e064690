//! Sequential plan execution
//!
//! Progress is written to the cluster record before and after every step so
//! status queries can follow a plan running in another task. The first
//! failing step stops the plan and its error is recorded; nothing is retried.

use crate::cells::{CellApi, CellRegistry, ClusterLister, HealthInspector};
use crate::cluster::{ClusterFeatures, ClusterModel};
use crate::common::Result;
use crate::scheduler::planner;
use crate::scheduler::steps::{Step, StepEnv};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Plans and executes topology changes for one cluster at a time.
#[derive(Clone)]
pub struct Scheduler {
    env: StepEnv,
}

impl Scheduler {
    pub fn new(
        registry: Arc<CellRegistry>,
        cell_api: Arc<dyn CellApi>,
        lister: Arc<dyn ClusterLister>,
    ) -> Self {
        Self {
            env: StepEnv {
                registry,
                cell_api,
                health: HealthInspector::new(lister),
            },
        }
    }

    pub fn registry(&self) -> &CellRegistry {
        &self.env.registry
    }

    /// Steps turning the cluster held by `model` into `desired`.
    pub fn plan(&self, model: &ClusterModel, desired: &ClusterFeatures) -> Result<Vec<Step>> {
        planner::plan(&self.env.registry, model.cluster(), desired)
    }

    /// Run `steps` in order, stopping at the first failure. Failures,
    /// including store errors while recording progress, end up in the
    /// cluster's error message.
    pub async fn execute(
        &self,
        model: &mut ClusterModel,
        steps: Vec<Step>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self.execute_steps(model, &steps, cancel).await {
            Ok(()) => {
                tracing::info!(
                    "Cluster {}: plan of {} steps completed",
                    model.instance_id(),
                    steps.len()
                );
                Ok(())
            }
            Err(err) => {
                record_failure(model, &err).await;
                Err(err)
            }
        }
    }

    async fn execute_steps(
        &self,
        model: &mut ClusterModel,
        steps: &[Step],
        cancel: &CancellationToken,
    ) -> Result<()> {
        model.new_cluster_plan(steps.len()).await?;

        for (i, step) in steps.iter().enumerate() {
            tracing::info!(
                "Cluster {}: step {}/{} {}",
                model.instance_id(),
                i + 1,
                steps.len(),
                step.step_type()
            );
            model.plan_step_started(step.description()).await?;
            step.perform(&self.env, model, cancel).await?;
            model.plan_step_completed().await?;
        }
        Ok(())
    }

    /// Plan then execute. A planning failure is recorded like a step failure.
    pub async fn run(
        &self,
        model: &mut ClusterModel,
        desired: &ClusterFeatures,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let steps = match self.plan(model, desired) {
            Ok(steps) => steps,
            Err(err) => {
                record_failure(model, &err).await;
                return Err(err);
            }
        };
        self.execute(model, steps, cancel).await
    }
}

async fn record_failure(model: &mut ClusterModel, err: &crate::Error) {
    tracing::error!("Cluster {}: plan failed: {}", model.instance_id(), err);
    if let Err(save_err) = model.plan_error(err).await {
        tracing::error!(
            "Cluster {}: could not record plan failure: {}",
            model.instance_id(),
            save_err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::registry::mock_cell;
    use crate::cells::{Cell, DeprovisionRequest, ProvisionRequest};
    use crate::cluster::{ClusterState, Node, PlanStatus, State};
    use crate::common::Error;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Cell API fake: records calls, rejects provisioning on `broken` cells.
    #[derive(Default)]
    struct FakeCells {
        broken: HashSet<String>,
        provisioned: Mutex<Vec<String>>,
        deprovisioned: Mutex<Vec<String>>,
        fail_deprovision: bool,
    }

    #[async_trait]
    impl CellApi for FakeCells {
        async fn provision(&self, cell: &Cell, _node_id: &str, _req: &ProvisionRequest) -> Result<()> {
            self.provisioned.lock().unwrap().push(cell.guid.clone());
            if self.broken.contains(&cell.guid) {
                return Err(Error::CellRequest {
                    cell: cell.guid.clone(),
                    reason: "status 500".into(),
                });
            }
            Ok(())
        }

        async fn deprovision(
            &self,
            cell: &Cell,
            node_id: &str,
            _req: &DeprovisionRequest,
        ) -> Result<()> {
            self.deprovisioned.lock().unwrap().push(node_id.to_string());
            if self.fail_deprovision {
                return Err(Error::CellRequest {
                    cell: cell.guid.clone(),
                    reason: "connection refused".into(),
                });
            }
            Ok(())
        }
    }

    fn cells() -> Vec<Cell> {
        vec![
            mock_cell("z1-c1", "z1"),
            mock_cell("z1-c2", "z1"),
            mock_cell("z2-c1", "z2"),
        ]
    }

    fn setup(fake: FakeCells) -> (Scheduler, State, Arc<FakeCells>) {
        let state = State::new(Arc::new(MemoryStore::new()));
        let fake = Arc::new(fake);
        let scheduler = Scheduler::new(
            Arc::new(CellRegistry::new(cells())),
            fake.clone(),
            Arc::new(state.clone()),
        );
        (scheduler, state, fake)
    }

    async fn new_model(state: &State) -> ClusterModel {
        let model = ClusterModel::new(
            state.clone(),
            ClusterState {
                instance_id: "i1".into(),
                plan_id: "plan".into(),
                service_id: "svc".into(),
                ..Default::default()
            },
        );
        model.save().await.unwrap();
        model
    }

    #[tokio::test]
    async fn test_scale_out_spreads_across_zones() {
        let (scheduler, state, _) = setup(FakeCells::default());
        let mut model = new_model(&state).await;
        let cancel = CancellationToken::new();

        scheduler
            .run(&mut model, &ClusterFeatures::new(2), &cancel)
            .await
            .unwrap();

        let stored = state.load_cluster("i1").await.unwrap();
        let cells: Vec<&str> = stored.nodes.iter().map(|n| n.cell_guid.as_str()).collect();
        assert_eq!(cells, vec!["z1-c1", "z2-c1"]);
        assert_eq!(stored.plan_status().0, PlanStatus::Success);
        assert_eq!(stored.plan.completed_steps, 2);
    }

    #[tokio::test]
    async fn test_failed_cell_falls_through_to_next() {
        let fake = FakeCells {
            broken: ["z1-c1".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let (scheduler, state, fake) = setup(fake);
        let mut model = new_model(&state).await;

        scheduler
            .run(&mut model, &ClusterFeatures::new(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*fake.provisioned.lock().unwrap(), vec!["z1-c1", "z1-c2"]);
        assert_eq!(model.nodes()[0].cell_guid, "z1-c2");
    }

    #[tokio::test]
    async fn test_exhausted_placement_records_failure() {
        let fake = FakeCells {
            broken: cells().into_iter().map(|c| c.guid).collect(),
            ..Default::default()
        };
        let (scheduler, state, _) = setup(fake);
        let mut model = new_model(&state).await;

        let err = scheduler
            .run(&mut model, &ClusterFeatures::new(2), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PlacementExhausted { attempted: 3 }));

        let stored = state.load_cluster("i1").await.unwrap();
        assert!(stored.nodes.is_empty());
        let (status, message) = stored.plan_status();
        assert_eq!(status, PlanStatus::Failed);
        assert!(message.starts_with("Error: "));
        assert!(message.ends_with("(0/2 steps)"));
    }

    #[tokio::test]
    async fn test_remove_node_ignores_deprovision_failure() {
        let fake = FakeCells {
            fail_deprovision: true,
            ..Default::default()
        };
        let (scheduler, state, fake) = setup(fake);
        let mut model = new_model(&state).await;
        model
            .add_node(Node {
                id: "n1".into(),
                cell_guid: "z1-c1".into(),
                plan_id: "plan".into(),
                service_id: "svc".into(),
            })
            .await
            .unwrap();

        scheduler
            .run(&mut model, &ClusterFeatures::teardown(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*fake.deprovisioned.lock().unwrap(), vec!["n1"]);
        assert!(state.load_cluster("i1").await.unwrap().nodes.is_empty());
    }

    #[tokio::test]
    async fn test_remove_node_on_unknown_cell_fails() {
        let (scheduler, state, _) = setup(FakeCells::default());
        let mut model = new_model(&state).await;
        model
            .add_node(Node {
                id: "n1".into(),
                cell_guid: "decommissioned".into(),
                plan_id: "plan".into(),
                service_id: "svc".into(),
            })
            .await
            .unwrap();

        let err = scheduler
            .run(&mut model, &ClusterFeatures::teardown(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(model.node_count(), 1);
        assert_eq!(model.current_plan_status().0, PlanStatus::Failed);
    }

    #[tokio::test]
    async fn test_no_backends_recorded_before_any_step() {
        let (scheduler, state, fake) = setup(FakeCells::default());
        let mut model = new_model(&state).await;
        let desired = ClusterFeatures::new(1).with_cells(vec!["nowhere".into()]);

        let err = scheduler
            .run(&mut model, &desired, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoBackendsAvailable));
        assert!(fake.provisioned.lock().unwrap().is_empty());

        let stored = state.load_cluster("i1").await.unwrap();
        assert_eq!(stored.plan_status().0, PlanStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_plan_stops() {
        let (scheduler, state, fake) = setup(FakeCells::default());
        let mut model = new_model(&state).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = scheduler
            .run(&mut model, &ClusterFeatures::new(1), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(fake.provisioned.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_steps_are_unsupported() {
        use crate::scheduler::steps::{ReplaceMaster, ReplaceReplica};

        let (scheduler, state, fake) = setup(FakeCells::default());
        let mut model = new_model(&state).await;
        let steps = vec![
            Step::ReplaceMaster(ReplaceMaster::new(2)),
            Step::ReplaceReplica(ReplaceReplica::new(1, 2)),
        ];

        let err = scheduler
            .execute(&mut model, steps, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        assert!(fake.provisioned.lock().unwrap().is_empty());

        let stored = state.load_cluster("i1").await.unwrap();
        assert!(stored.nodes.is_empty());
        let (status, message) = stored.plan_status();
        assert_eq!(status, PlanStatus::Failed);
        assert!(message.ends_with("(0/2 steps)"));
    }
}
