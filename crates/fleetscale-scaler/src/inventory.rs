//! Fleet inventory reader.
//!
//! Listing failures map to [`ScaleError::InventoryQuery`] and are not
//! retried: reads happen before the fleet changes, so failing fast is safe.

use tracing::debug;

use fleetscale_core::{InstanceSnapshot, MachinePool, ReplicaCountGroup};
use fleetscale_platform::SharedPlatform;

use crate::error::{ScaleError, ScaleResult};

/// Read-only view of the fleet.
#[derive(Clone)]
pub struct Inventory {
    platform: SharedPlatform,
}

impl Inventory {
    pub fn new(platform: SharedPlatform) -> Self {
        Self { platform }
    }

    /// Every machine pool with its current replica count.
    pub async fn pools(&self) -> ScaleResult<Vec<MachinePool>> {
        let pools = self
            .platform
            .list_pools()
            .await
            .map_err(|source| ScaleError::InventoryQuery {
                resource: "machine pools",
                source,
            })?;
        debug!(count = pools.len(), "machine pools listed");
        Ok(pools)
    }

    /// Pools grouped by replica count, ready for balancing.
    pub async fn replica_groups(&self) -> ScaleResult<ReplicaCountGroup> {
        Ok(ReplicaCountGroup::from_pools(&self.pools().await?))
    }

    /// Current backing compute instances.
    pub async fn instances(&self) -> ScaleResult<InstanceSnapshot> {
        let instances = self
            .platform
            .list_instances()
            .await
            .map_err(|source| ScaleError::InventoryQuery {
                resource: "compute instances",
                source,
            })?;
        debug!(count = instances.len(), "compute instances listed");
        Ok(InstanceSnapshot::from_instances(instances))
    }
}
