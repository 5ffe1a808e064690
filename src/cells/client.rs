//! Cell provisioning API client
//!
//! Each cell exposes a service-broker style endpoint:
//! `PUT/DELETE <cell uri>/v2/service_instances/<node id>` with basic auth.

use crate::cells::Cell;
use crate::common::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-node parameters handed to the cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeParameters {
    /// Cluster-wide scope shared by every node (the instance ID)
    pub scope: String,
    pub node_id: String,
    pub admin_username: String,
    pub admin_password: String,
    pub superuser_username: String,
    pub superuser_password: String,
    pub app_username: String,
    pub app_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub organization_guid: String,
    pub plan_id: String,
    pub service_id: String,
    pub space_guid: String,
    pub parameters: NodeParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprovisionRequest {
    pub plan_id: String,
    pub service_id: String,
}

/// Remote operations a cell supports.
#[async_trait]
pub trait CellApi: Send + Sync {
    async fn provision(&self, cell: &Cell, node_id: &str, req: &ProvisionRequest) -> Result<()>;

    async fn deprovision(&self, cell: &Cell, node_id: &str, req: &DeprovisionRequest)
        -> Result<()>;
}

/// reqwest-backed [`CellApi`]
pub struct HttpCellClient {
    client: reqwest::Client,
}

impl HttpCellClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn instance_url(cell: &Cell, node_id: &str) -> String {
        format!(
            "{}/v2/service_instances/{}",
            cell.uri.trim_end_matches('/'),
            node_id
        )
    }

    async fn check(cell: &Cell, url: &str, response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Cell {} returned {} for {}: {}", cell.guid, status, url, body);
            return Err(Error::CellRequest {
                cell: cell.guid.clone(),
                reason: format!("status {}", status),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CellApi for HttpCellClient {
    async fn provision(&self, cell: &Cell, node_id: &str, req: &ProvisionRequest) -> Result<()> {
        let url = Self::instance_url(cell, node_id);
        tracing::info!("Provisioning node {} on cell {}", node_id, cell.guid);

        let response = self
            .client
            .put(&url)
            .basic_auth(&cell.username, Some(&cell.password))
            .json(req)
            .send()
            .await
            .map_err(|e| Error::CellRequest {
                cell: cell.guid.clone(),
                reason: e.to_string(),
            })?;

        Self::check(cell, &url, response).await
    }

    async fn deprovision(
        &self,
        cell: &Cell,
        node_id: &str,
        req: &DeprovisionRequest,
    ) -> Result<()> {
        let url = Self::instance_url(cell, node_id);
        tracing::info!("Deprovisioning node {} from cell {}", node_id, cell.guid);

        let response = self
            .client
            .delete(&url)
            .basic_auth(&cell.username, Some(&cell.password))
            .json(req)
            .send()
            .await
            .map_err(|e| Error::CellRequest {
                cell: cell.guid.clone(),
                reason: e.to_string(),
            })?;

        Self::check(cell, &url, response).await
    }
}
