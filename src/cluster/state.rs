//! Persisted cluster record

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Fixed username, random password
    pub fn generate(username: &str) -> Self {
        Self {
            username: username.to_string(),
            password: crate::common::generate_password(24),
        }
    }
}

/// One database node hosted by a cell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub cell_guid: String,
    pub plan_id: String,
    pub service_id: String,
}

/// Progress counters of the plan currently (or last) executed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanProgress {
    pub steps: usize,
    pub completed_steps: usize,
    pub message: String,
}

/// Durable record of one provisioned instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    pub instance_id: String,
    pub organization_guid: String,
    pub plan_id: String,
    pub service_id: String,
    pub space_guid: String,
    pub admin_credentials: Credentials,
    pub superuser_credentials: Credentials,
    pub app_credentials: Credentials,
    pub allocated_port: u16,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub plan: PlanProgress,
    #[serde(default)]
    pub error_msg: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Unknown,
    InProgress,
    Success,
    Failed,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Unknown => write!(f, "unknown"),
            PlanStatus::InProgress => write!(f, "in progress"),
            PlanStatus::Success => write!(f, "succeeded"),
            PlanStatus::Failed => write!(f, "failed"),
        }
    }
}

impl ClusterState {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Derive the plan status from the progress counters and error message.
    /// A recorded error wins over any progress, so a plan that failed
    /// before its first step (zero steps) reports `Failed`, not `Unknown`.
    pub fn plan_status(&self) -> (PlanStatus, String) {
        let plan = &self.plan;
        if !self.error_msg.is_empty() {
            return (
                PlanStatus::Failed,
                format!(
                    "Error: {} ({}/{} steps)",
                    self.error_msg, plan.completed_steps, plan.steps
                ),
            );
        }
        if plan.steps == 0 {
            return (PlanStatus::Unknown, String::new());
        }
        if plan.completed_steps == plan.steps {
            return (
                PlanStatus::Success,
                format!("Completed {}/{} steps", plan.completed_steps, plan.steps),
            );
        }
        (
            PlanStatus::InProgress,
            format!(
                "{} ({}/{} steps)",
                plan.message, plan.completed_steps, plan.steps
            ),
        )
    }
}
