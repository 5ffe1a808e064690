//! # cellbroker
//!
//! Orchestrates multi-node database clusters spread over a fleet of cells:
//! - Plans topology changes as ordered add/remove steps
//! - Places new nodes across availability zones, least loaded cell first
//! - Persists cluster records and plan progress in a coordination store
//! - Hands out routing ports from a shared compare-and-swap counter
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!            provision / update / deprovision / last_operation
//!                              │
//!                      ┌───────▼────────┐
//!                      │     Broker     │──── Router (port counter)
//!                      └───────┬────────┘
//!                              │ spawned plan
//!                      ┌───────▼────────┐
//!                      │   Scheduler    │──── planner + placement
//!                      └───┬────────┬───┘
//!          progress, nodes │        │ PUT / DELETE node
//!                ┌─────────▼──┐   ┌─▼───────────────────────────┐
//!                │   State    │   │ Cell 1 (z1)  Cell 2 (z2) ... │
//!                │ etcd/rocks │   └─────────────────────────────┘
//!                └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```toml
//! default_node_count = 2
//!
//! [store]
//! backend = "etcd"
//! endpoint = "http://localhost:2379"
//!
//! [router]
//! initial_port = 30000
//!
//! [[cells]]
//! guid = "cell-1"
//! uri = "http://10.0.0.1:8888"
//! availability_zone = "z1"
//! username = "broker"
//! password = "secret"
//! ```
//!
//! Any key can be overridden from the environment, e.g.
//! `CELLBROKER__ROUTER__INITIAL_PORT=31000`.

pub mod broker;
pub mod cells;
pub mod cluster;
pub mod common;
pub mod router;
pub mod scheduler;
pub mod store;

// Re-export commonly used types
pub use broker::{Broker, PlanHandle, ProvisionDetails};
pub use common::{BrokerConfig, Error, Result};
pub use router::Router;
pub use scheduler::Scheduler;
pub use cluster::State;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
