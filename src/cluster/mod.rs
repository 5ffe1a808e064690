//! Cluster records: data model, desired topology, persistence

pub mod features;
pub mod model;
pub mod persistence;
pub mod state;

pub use features::ClusterFeatures;
pub use model::ClusterModel;
pub use persistence::State;
pub use state::{ClusterState, Credentials, Node, PlanProgress, PlanStatus};
