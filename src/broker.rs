//! Instance lifecycle entry points
//!
//! Preconditions are checked synchronously and reported straight to the
//! caller. The topology change itself runs in a spawned task; callers follow
//! it through [`Broker::last_operation`] or the returned [`PlanHandle`].

use crate::cells::{CellApi, CellRegistry, HttpCellClient};
use crate::cluster::{
    ClusterFeatures, ClusterModel, ClusterState, Credentials, PlanStatus, State,
};
use crate::common::{validate_instance_id, BrokerConfig, Error, Result};
use crate::router::Router;
use crate::scheduler::Scheduler;
use crate::store::{self, CoordinationStore};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const ADMIN_USERNAME: &str = "admin";
pub const SUPERUSER_USERNAME: &str = "postgres";
pub const APP_USERNAME: &str = "appuser";
const DEFAULT_NODE_COUNT: usize = 2;

/// Ownership details of a new instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionDetails {
    pub organization_guid: String,
    pub plan_id: String,
    pub service_id: String,
    pub space_guid: String,
}

/// A plan running in the background
pub struct PlanHandle {
    instance_id: String,
    cancel: CancellationToken,
    join: JoinHandle<Result<()>>,
}

impl PlanHandle {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Ask the plan to stop before its next remote call
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the plan task to finish
    pub async fn wait(self) -> Result<()> {
        self.join
            .await
            .map_err(|e| Error::Internal(format!("plan task for {} failed: {}", self.instance_id, e)))?
    }
}

pub struct Broker {
    state: State,
    router: Router,
    scheduler: Scheduler,
    default_node_count: usize,
}

impl Broker {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        registry: Arc<CellRegistry>,
        cell_api: Arc<dyn CellApi>,
        router: Router,
    ) -> Self {
        let state = State::new(store);
        let scheduler = Scheduler::new(registry, cell_api, Arc::new(state.clone()));
        Self {
            state,
            router,
            scheduler,
            default_node_count: DEFAULT_NODE_COUNT,
        }
    }

    pub fn with_default_node_count(mut self, node_count: usize) -> Self {
        self.default_node_count = node_count;
        self
    }

    /// Wire up the store, cell client and router described by `config`.
    pub async fn from_config(config: &BrokerConfig) -> Result<Self> {
        config.validate()?;
        let store = store::open(&config.store)?;
        let registry = Arc::new(CellRegistry::new(config.cells.clone()));
        let cell_api = Arc::new(HttpCellClient::new(config.cell_api.timeout())?);
        let router = Router::new(store.clone(), &config.router).await?;

        tracing::info!(
            "Broker ready: {} cells in {} availability zones",
            registry.len(),
            registry.availability_zones().len()
        );
        Ok(Self::new(store, registry, cell_api, router)
            .with_default_node_count(config.default_node_count))
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Desired topology for a new instance. Without `node-count` the
    /// configured default applies.
    pub fn provision_features(&self, params: &Value) -> Result<ClusterFeatures> {
        ClusterFeatures::from_parameters(params, self.default_node_count)
    }

    /// Desired topology for an existing instance. Without `node-count` the
    /// current node count is kept.
    pub async fn update_features(&self, instance_id: &str, params: &Value) -> Result<ClusterFeatures> {
        let current = self.state.load_cluster(instance_id).await?;
        ClusterFeatures::from_parameters(params, current.node_count())
    }

    fn check_backends(&self, features: &ClusterFeatures) -> Result<()> {
        if self
            .scheduler
            .registry()
            .filter_by_guids(&features.cell_guids_for_new_nodes)
            .is_empty()
        {
            return Err(Error::NoBackendsAvailable);
        }
        Ok(())
    }

    /// Create the instance record, reserve its port and start building nodes.
    pub async fn provision(
        &self,
        instance_id: &str,
        details: ProvisionDetails,
        features: ClusterFeatures,
    ) -> Result<PlanHandle> {
        validate_instance_id(instance_id)?;
        features.validate_for_provision()?;
        if self.state.cluster_exists(instance_id).await? {
            return Err(Error::InstanceExists(instance_id.to_string()));
        }
        self.check_backends(&features)?;

        let port = self.router.allocate_port().await?;
        self.router.assign_port_to_cluster(instance_id, port).await?;

        let cluster = ClusterState {
            instance_id: instance_id.to_string(),
            organization_guid: details.organization_guid,
            plan_id: details.plan_id,
            service_id: details.service_id,
            space_guid: details.space_guid,
            admin_credentials: Credentials::generate(ADMIN_USERNAME),
            superuser_credentials: Credentials::generate(SUPERUSER_USERNAME),
            app_credentials: Credentials::generate(APP_USERNAME),
            allocated_port: port,
            ..Default::default()
        };
        let model = ClusterModel::new(self.state.clone(), cluster);
        if let Err(e) = model.save().await {
            tracing::error!("Could not save new instance {}: {}", instance_id, e);
            if let Err(cleanup) = self.router.remove_cluster_assignment(instance_id).await {
                tracing::warn!(
                    "Port {} stays assigned to unsaved instance {}: {}",
                    port,
                    instance_id,
                    cleanup
                );
            }
            return Err(e);
        }

        tracing::info!(
            "Provisioning {} with {} nodes on port {}",
            instance_id,
            features.node_count,
            port
        );
        Ok(self.spawn_plan(model, features))
    }

    /// Move an existing instance to a new topology.
    pub async fn update(&self, instance_id: &str, features: ClusterFeatures) -> Result<PlanHandle> {
        if !self.state.cluster_exists(instance_id).await? {
            return Err(Error::InstanceNotFound(instance_id.to_string()));
        }
        self.check_backends(&features)?;

        let model = ClusterModel::load(self.state.clone(), instance_id).await?;
        tracing::info!(
            "Updating {} from {} to {} nodes",
            instance_id,
            model.node_count(),
            features.node_count
        );
        Ok(self.spawn_plan(model, features))
    }

    /// Remove every node, then the record and port assignment.
    pub async fn deprovision(&self, instance_id: &str) -> Result<PlanHandle> {
        if !self.state.cluster_exists(instance_id).await? {
            return Err(Error::InstanceNotFound(instance_id.to_string()));
        }

        let mut model = ClusterModel::load(self.state.clone(), instance_id).await?;
        let scheduler = self.scheduler.clone();
        let state = self.state.clone();
        let router = self.router.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let id = instance_id.to_string();

        tracing::info!("Deprovisioning {} ({} nodes)", id, model.node_count());
        let join = tokio::spawn(async move {
            scheduler
                .run(&mut model, &ClusterFeatures::teardown(), &token)
                .await?;
            state.delete_cluster(&id).await?;
            router.remove_cluster_assignment(&id).await?;
            tracing::info!("Deprovisioned {}", id);
            Ok(())
        });

        Ok(PlanHandle {
            instance_id: instance_id.to_string(),
            cancel,
            join,
        })
    }

    /// Status of the last plan run against `instance_id`.
    pub async fn last_operation(&self, instance_id: &str) -> Result<(PlanStatus, String)> {
        let cluster = self.state.load_cluster(instance_id).await?;
        Ok(cluster.plan_status())
    }

    fn spawn_plan(&self, mut model: ClusterModel, features: ClusterFeatures) -> PlanHandle {
        let scheduler = self.scheduler.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let instance_id = model.instance_id().to_string();

        let join = tokio::spawn(async move { scheduler.run(&mut model, &features, &token).await });

        PlanHandle {
            instance_id,
            cancel,
            join,
        }
    }
}
