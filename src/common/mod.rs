//! Common utilities and types shared across cellbroker

pub mod config;
pub mod error;
pub mod telemetry;
pub mod utils;

pub use config::{BrokerConfig, CellApiConfig, RouterConfig, StoreConfig};
pub use error::{Error, Result};
pub use telemetry::init_tracing;
pub use utils::{generate_node_id, generate_password, timestamp_now, validate_instance_id};
