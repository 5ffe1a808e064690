//! Error types for cellbroker

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Validation Errors ===
    #[error("Instance already exists: {0}")]
    InstanceExists(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("No backends available")]
    NoBackendsAvailable,

    #[error("Invalid node count: {0}")]
    InvalidNodeCount(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    // === Cell Errors ===
    #[error("Cell {cell} request failed: {reason}")]
    CellRequest { cell: String, reason: String },

    #[error("No cell accepted the node after {attempted} attempts")]
    PlacementExhausted { attempted: usize },

    #[error("HTTP error: {0}")]
    Http(String),

    // === Coordination Store Errors ===
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Key already exists: {0}")]
    KeyExists(String),

    #[error("Compare failed: {0}")]
    CompareFailed(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Gave up after {attempts} attempts: {source}")]
    ExhaustedRetries {
        attempts: usize,
        #[source]
        source: Box<Error>,
    },

    // === Serialization ===
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Synchronous precondition failures, returned straight to the caller.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InstanceExists(_)
                | Error::InstanceNotFound(_)
                | Error::NoBackendsAvailable
                | Error::InvalidNodeCount(_)
                | Error::InvalidParameters(_)
        )
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::InstanceExists(_) => StatusCode::CONFLICT,
            Error::InstanceNotFound(_) => StatusCode::GONE,
            Error::InvalidNodeCount(_) | Error::InvalidParameters(_) => StatusCode::BAD_REQUEST,
            Error::NoBackendsAvailable | Error::PlacementExhausted { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Unsupported(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Store(format!("encoding error: {}", e))
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
