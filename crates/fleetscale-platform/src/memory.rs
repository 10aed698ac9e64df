//! In-memory platform — an in-process fleet for tests and dry runs.
//!
//! Pools own instances and nodes named `{pool}-{index}`. Scaling a pool
//! up creates the missing instances and nodes; scaling down removes them.
//! New nodes turn ready after a configurable number of node listings,
//! and pool reads can lag behind writes to mimic an eventually
//! consistent API.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use fleetscale_core::{ComputeInstance, MachinePool, NodeRecord, PlatformError, PlatformResult};

use crate::FleetPlatform;

const DEFAULT_IMAGE: &str = "ami-baseline";

struct PoolEntry {
    name: String,
    replicas: u32,
    /// What `list_pools` reports while reads are lagging.
    visible: u32,
}

struct FakeNode {
    name: String,
    /// Ready once this many node listings have happened.
    ready_at_list: usize,
}

struct Inner {
    pools: Vec<PoolEntry>,
    nodes: Vec<FakeNode>,
    instances: Vec<ComputeInstance>,
    image: String,
    node_ready_delay: usize,
    read_lag: u32,
    lag_remaining: u32,
    node_lists: usize,
    fail_pool_listing: bool,
    fail_node_listing: bool,
    fail_instance_listing: bool,
    failing_pools: BTreeSet<String>,
    mutations: Vec<(String, u32)>,
}

/// Thread-safe in-memory fleet. Clones share the same state.
#[derive(Clone)]
pub struct InMemoryPlatform {
    inner: Arc<Mutex<Inner>>,
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                pools: Vec::new(),
                nodes: Vec::new(),
                instances: Vec::new(),
                image: DEFAULT_IMAGE.to_string(),
                node_ready_delay: 0,
                read_lag: 0,
                lag_remaining: 0,
                node_lists: 0,
                fail_pool_listing: false,
                fail_node_listing: false,
                fail_instance_listing: false,
                failing_pools: BTreeSet::new(),
                mutations: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock only happens in a failing test.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a pool with `replicas` ready nodes and running instances.
    pub fn with_pool(self, name: &str, replicas: u32) -> Self {
        {
            let mut inner = self.lock();
            inner.pools.push(PoolEntry {
                name: name.to_string(),
                replicas,
                visible: replicas,
            });
            let ready_at = inner.node_lists;
            inner.provision(name, 0, replicas, ready_at);
        }
        self
    }

    /// Add a standalone node that turns ready after `ready_after` listings.
    pub fn with_node(self, name: &str, ready_after: usize) -> Self {
        self.lock().nodes.push(FakeNode {
            name: name.to_string(),
            ready_at_list: ready_after,
        });
        self
    }

    /// Image reported by instances created from now on.
    pub fn with_image(self, image: &str) -> Self {
        self.lock().image = image.to_string();
        self
    }

    /// Nodes created by scaling up turn ready after `lists` more listings.
    pub fn with_node_ready_delay(self, lists: usize) -> Self {
        self.lock().node_ready_delay = lists;
        self
    }

    /// After each write, the next `reads` pool listings show old counts.
    pub fn with_read_lag(self, reads: u32) -> Self {
        self.lock().read_lag = reads;
        self
    }

    pub fn fail_pool_listing(self) -> Self {
        self.lock().fail_pool_listing = true;
        self
    }

    pub fn fail_node_listing(self) -> Self {
        self.lock().fail_node_listing = true;
        self
    }

    pub fn fail_instance_listing(self) -> Self {
        self.lock().fail_instance_listing = true;
        self
    }

    /// Reject every replica update for `pool`.
    pub fn fail_updates_for(self, pool: &str) -> Self {
        self.lock().failing_pools.insert(pool.to_string());
        self
    }

    /// Toggle instance-listing failures on a live platform.
    pub fn set_instance_listing_failure(&self, fail: bool) {
        self.lock().fail_instance_listing = fail;
    }

    /// Current (not lagged) replica count of a pool.
    pub fn replicas(&self, pool: &str) -> Option<u32> {
        self.lock()
            .pools
            .iter()
            .find(|p| p.name == pool)
            .map(|p| p.replicas)
    }

    /// Every `set_replicas` call received, in order, including rejected ones.
    pub fn mutations(&self) -> Vec<(String, u32)> {
        self.lock().mutations.clone()
    }

    /// Number of `list_nodes` calls served so far.
    pub fn node_list_calls(&self) -> usize {
        self.lock().node_lists
    }
}

impl Inner {
    fn provision(&mut self, pool: &str, from: u32, to: u32, ready_at_list: usize) {
        for index in from..to {
            let name = format!("{pool}-{index}");
            self.instances.push(ComputeInstance {
                name: name.clone(),
                image: Some(self.image.clone()),
            });
            self.nodes.push(FakeNode {
                name,
                ready_at_list,
            });
        }
    }

    fn decommission(&mut self, pool: &str, from: u32, to: u32) {
        let doomed: BTreeSet<String> = (from..to).map(|i| format!("{pool}-{i}")).collect();
        self.instances.retain(|i| !doomed.contains(&i.name));
        self.nodes.retain(|n| !doomed.contains(&n.name));
    }
}

#[async_trait]
impl FleetPlatform for InMemoryPlatform {
    async fn list_pools(&self) -> PlatformResult<Vec<MachinePool>> {
        let mut inner = self.lock();
        if inner.fail_pool_listing {
            return Err(PlatformError::Api("machine pool listing unavailable".to_string()));
        }
        let lagging = inner.lag_remaining > 0;
        if lagging {
            inner.lag_remaining -= 1;
        } else {
            for pool in &mut inner.pools {
                pool.visible = pool.replicas;
            }
        }
        Ok(inner
            .pools
            .iter()
            .map(|p| MachinePool::new(p.name.clone(), p.visible))
            .collect())
    }

    async fn set_replicas(&self, pool: &str, replicas: u32) -> PlatformResult<()> {
        let mut inner = self.lock();
        inner.mutations.push((pool.to_string(), replicas));
        if inner.failing_pools.contains(pool) {
            return Err(PlatformError::Api(format!("update rejected for {pool}")));
        }
        let Some(entry) = inner.pools.iter_mut().find(|p| p.name == pool) else {
            return Err(PlatformError::NotFound(pool.to_string()));
        };
        let previous = entry.replicas;
        entry.replicas = replicas;

        if replicas > previous {
            let ready_at = inner.node_lists + inner.node_ready_delay;
            inner.provision(pool, previous, replicas, ready_at);
        } else if replicas < previous {
            inner.decommission(pool, replicas, previous);
        }
        inner.lag_remaining = inner.read_lag;
        debug!(%pool, from = previous, to = replicas, "in-memory pool resized");
        Ok(())
    }

    async fn list_nodes(&self) -> PlatformResult<Vec<NodeRecord>> {
        let mut inner = self.lock();
        if inner.fail_node_listing {
            return Err(PlatformError::Api("node listing unavailable".to_string()));
        }
        inner.node_lists += 1;
        let seen = inner.node_lists;
        Ok(inner
            .nodes
            .iter()
            .map(|n| NodeRecord {
                name: n.name.clone(),
                ready: seen > n.ready_at_list,
            })
            .collect())
    }

    async fn list_instances(&self) -> PlatformResult<Vec<ComputeInstance>> {
        let inner = self.lock();
        if inner.fail_instance_listing {
            return Err(PlatformError::Api("machine listing unavailable".to_string()));
        }
        Ok(inner.instances.clone())
    }
}
