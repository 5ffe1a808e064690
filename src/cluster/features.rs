//! Desired cluster topology

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provisioning parameter carrying the desired node count
pub const PARAM_NODE_COUNT: &str = "node-count";
/// Provisioning parameter restricting cells for new nodes
pub const PARAM_CELLS: &str = "cells";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterFeatures {
    pub node_count: usize,
    /// Empty means every configured cell is a candidate
    #[serde(default)]
    pub cell_guids_for_new_nodes: Vec<String>,
}

impl ClusterFeatures {
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            cell_guids_for_new_nodes: Vec::new(),
        }
    }

    /// Features for a full teardown
    pub fn teardown() -> Self {
        Self::new(0)
    }

    pub fn with_cells(mut self, cells: Vec<String>) -> Self {
        self.cell_guids_for_new_nodes = cells;
        self
    }

    /// Parse arbitrary request parameters. A missing `node-count` falls back
    /// to `default_node_count`.
    pub fn from_parameters(params: &Value, default_node_count: usize) -> Result<Self> {
        let node_count = match params.get(PARAM_NODE_COUNT) {
            None | Some(Value::Null) => default_node_count,
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| Error::InvalidNodeCount(n.to_string()))?,
            Some(other) => return Err(Error::InvalidNodeCount(other.to_string())),
        };

        let cells = match params.get(PARAM_CELLS) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        Error::InvalidParameters(format!("cell guid must be a string: {}", item))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(Error::InvalidParameters(format!(
                    "{} must be a list of cell guids, got {}",
                    PARAM_CELLS, other
                )))
            }
        };

        Ok(Self::new(node_count).with_cells(cells))
    }

    /// A freshly provisioned cluster needs at least one node.
    pub fn validate_for_provision(&self) -> Result<()> {
        if self.node_count == 0 {
            return Err(Error::InvalidNodeCount(
                "node count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
