//! Cells: configured backends, their provisioning API and fleet-wide load

pub mod client;
pub mod health;
pub mod registry;

pub use client::{CellApi, DeprovisionRequest, HttpCellClient, NodeParameters, ProvisionRequest};
pub use health::{CellsHealth, ClusterLister, HealthInspector};
pub use registry::{Cell, CellRegistry};
