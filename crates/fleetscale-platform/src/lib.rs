//! fleetscale-platform — the platform APIs the fleet scaler consumes.
//!
//! # Backends
//!
//! ```text
//! FleetPlatform (trait)
//!   ├── KubePlatform      OpenShift Machine API (MachineSets, Machines) + core Nodes
//!   └── InMemoryPlatform  in-process fleet with failure injection, for tests
//! ```
//!
//! Handles are built once and passed down explicitly as a
//! [`SharedPlatform`]; nothing in the scaler reaches for a global client.

pub mod openshift;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use fleetscale_core::{ComputeInstance, MachinePool, NodeRecord, PlatformResult};

pub use crate::openshift::KubePlatform;
pub use crate::memory::InMemoryPlatform;

/// Pool, node and compute-instance APIs of a cluster platform.
///
/// Implementations must be safe to call concurrently; the mutator fans
/// out one `set_replicas` call per pool.
#[async_trait]
pub trait FleetPlatform: Send + Sync {
    /// List every machine pool with its current replica count.
    async fn list_pools(&self) -> PlatformResult<Vec<MachinePool>>;

    /// Set the replica count of a named pool.
    async fn set_replicas(&self, pool: &str, replicas: u32) -> PlatformResult<()>;

    /// List cluster nodes with their readiness.
    async fn list_nodes(&self) -> PlatformResult<Vec<NodeRecord>>;

    /// List the compute instances backing the pools.
    async fn list_instances(&self) -> PlatformResult<Vec<ComputeInstance>>;
}

/// Platform handle shared across the scaler's components.
pub type SharedPlatform = Arc<dyn FleetPlatform>;
