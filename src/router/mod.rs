//! Routing port allocation
//!
//! Ports come from one counter in the coordination store, advanced only by
//! compare-and-swap so concurrent brokers never hand out the same port:
//!
//! ```text
//! /routing/nextport              next free port
//! /routing/allocation/<instance> port assigned to an instance
//! ```
//!
//! Allocation retries immediately on a lost race, up to a fixed number of
//! attempts.

use crate::common::{Error, Result, RouterConfig};
use crate::store::{CoordinationStore, GetOptions, SetOptions};
use std::sync::Arc;

pub const NEXT_PORT_KEY: &str = "/routing/nextport";
const ALLOCATION_DIR: &str = "/routing/allocation";

fn allocation_key(instance_id: &str) -> String {
    format!("{}/{}", ALLOCATION_DIR, instance_id)
}

#[derive(Clone)]
pub struct Router {
    store: Arc<dyn CoordinationStore>,
    max_attempts: usize,
}

impl Router {
    /// Seed the counter with `initial_port` unless it already exists.
    pub async fn new(store: Arc<dyn CoordinationStore>, config: &RouterConfig) -> Result<Self> {
        match store
            .set(
                NEXT_PORT_KEY,
                &config.initial_port.to_string(),
                SetOptions::create_only(),
            )
            .await
        {
            Ok(()) => tracing::info!("Seeded port counter at {}", config.initial_port),
            Err(Error::KeyExists(_)) => tracing::debug!("Port counter already initialized"),
            Err(e) => return Err(e),
        }

        Ok(Self {
            store,
            max_attempts: config.max_attempts.max(1),
        })
    }

    /// Reserve the next port. Each success advances the counter by one.
    pub async fn allocate_port(&self) -> Result<u16> {
        let mut last_err = None;

        for attempt in 1..=self.max_attempts {
            match self.try_allocate().await {
                Ok(port) => {
                    tracing::debug!("Allocated port {} (attempt {})", port, attempt);
                    return Ok(port);
                }
                Err(e @ Error::CompareFailed(_)) => {
                    tracing::debug!("Port allocation attempt {} lost a race", attempt);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let source = last_err.unwrap_or_else(|| Error::Internal("no allocation attempt".into()));
        tracing::warn!(
            "Port allocation gave up after {} attempts: {}",
            self.max_attempts,
            source
        );
        Err(Error::ExhaustedRetries {
            attempts: self.max_attempts,
            source: Box::new(source),
        })
    }

    async fn try_allocate(&self) -> Result<u16> {
        let node = self.store.get(NEXT_PORT_KEY, GetOptions::default()).await?;
        let current = node.value.unwrap_or_default();
        let port: u16 = current
            .parse()
            .map_err(|_| Error::Store(format!("{} holds invalid port {:?}", NEXT_PORT_KEY, current)))?;
        let next = port
            .checked_add(1)
            .ok_or_else(|| Error::Internal("port range exhausted".into()))?;

        self.store
            .set(NEXT_PORT_KEY, &next.to_string(), SetOptions::swap(current))
            .await?;
        Ok(port)
    }

    pub async fn assign_port_to_cluster(&self, instance_id: &str, port: u16) -> Result<()> {
        self.store
            .set(
                &allocation_key(instance_id),
                &port.to_string(),
                SetOptions::default(),
            )
            .await?;
        tracing::info!("Assigned port {} to {}", port, instance_id);
        Ok(())
    }

    /// Port assigned to `instance_id`, if any
    pub async fn cluster_assignment(&self, instance_id: &str) -> Result<Option<u16>> {
        match self
            .store
            .get(&allocation_key(instance_id), GetOptions::default())
            .await
        {
            Ok(node) => {
                let raw = node.value.unwrap_or_default();
                raw.parse()
                    .map(Some)
                    .map_err(|_| Error::Store(format!("invalid port assignment {:?}", raw)))
            }
            Err(Error::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Drop the assignment. Removing a missing assignment is a no-op.
    pub async fn remove_cluster_assignment(&self, instance_id: &str) -> Result<()> {
        match self.store.delete(&allocation_key(instance_id), false).await {
            Ok(()) | Err(Error::KeyNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
