//! Domain types for the fleet scaler.
//!
//! These types describe the worker fleet as seen by one scaling run:
//! machine pools and their replica counts, the scaling plan derived from
//! them, nodes, and the compute instances backing the pools.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of a machine pool (a MachineSet on OpenShift).
pub type PoolName = String;

/// Largest replica count a pool can hold (MachineSet replicas are int32).
pub const MAX_REPLICAS: u32 = i32::MAX as u32;

// ── Pools ──────────────────────────────────────────────────────────

/// A named group of homogeneous compute nodes sized by a replica count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachinePool {
    pub name: PoolName,
    pub replicas: u32,
}

impl MachinePool {
    pub fn new(name: impl Into<PoolName>, replicas: u32) -> Self {
        Self {
            name: name.into(),
            replicas,
        }
    }
}

/// Pool names grouped by their current replica count.
///
/// Levels iterate in ascending order. Within a level, pools keep the
/// order in which they were listed or moved in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaCountGroup {
    levels: BTreeMap<u32, VecDeque<PoolName>>,
}

impl ReplicaCountGroup {
    /// Group pools by replica count, preserving listing order per level.
    pub fn from_pools(pools: &[MachinePool]) -> Self {
        let mut group = Self::default();
        for pool in pools {
            group.push(pool.replicas, pool.name.clone());
        }
        group
    }

    /// Replica counts that currently hold at least one pool, ascending.
    pub fn levels(&self) -> impl Iterator<Item = u32> + '_ {
        self.levels.keys().copied()
    }

    /// Pools currently at `level`.
    pub fn pools_at(&self, level: u32) -> Option<&VecDeque<PoolName>> {
        self.levels.get(&level)
    }

    /// Append a pool to the end of `level`, creating the level if absent.
    pub fn push(&mut self, level: u32, pool: PoolName) {
        self.levels.entry(level).or_default().push_back(pool);
    }

    /// Remove and return every pool at `level`.
    pub fn take(&mut self, level: u32) -> VecDeque<PoolName> {
        self.levels.remove(&level).unwrap_or_default()
    }

    /// Put pools back at the front of `level`, ahead of any already there.
    pub fn restore(&mut self, level: u32, mut pools: VecDeque<PoolName>) {
        if pools.is_empty() {
            return;
        }
        if let Some(existing) = self.levels.remove(&level) {
            pools.extend(existing);
        }
        self.levels.insert(level, pools);
    }

    /// Replicas that can still be added before every pool reaches
    /// [`MAX_REPLICAS`].
    pub fn headroom(&self) -> u64 {
        self.levels
            .iter()
            .map(|(&level, pools)| u64::from(MAX_REPLICAS.saturating_sub(level)) * pools.len() as u64)
            .sum()
    }

    /// Total number of pools across all levels.
    pub fn pool_count(&self) -> usize {
        self.levels.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

// ── Scaling plan ───────────────────────────────────────────────────

/// Replica counts for one pool touched by a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaChange {
    /// Replica count before the run. Never changes once recorded.
    pub previous_replicas: u32,
    /// Replica count the pool is scaled to.
    pub current_replicas: u32,
}

impl ReplicaChange {
    /// Replicas added on top of the previous count.
    pub fn added(&self) -> u32 {
        self.current_replicas.saturating_sub(self.previous_replicas)
    }
}

/// Which side of a plan to drive the fleet towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Scale each pool up to `current_replicas`.
    Apply,
    /// Restore each pool to `previous_replicas`.
    Revert,
}

impl Direction {
    /// Replica count this direction targets for a change.
    pub fn target(self, change: &ReplicaChange) -> u32 {
        match self {
            Direction::Apply => change.current_replicas,
            Direction::Revert => change.previous_replicas,
        }
    }
}

/// Per-pool replica changes for one scaling run.
///
/// The plan is the only record needed to roll the fleet back: reverting
/// sets every pool to its `previous_replicas`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScalingPlan {
    changes: BTreeMap<PoolName, ReplicaChange>,
}

impl ScalingPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one extra replica for a pool currently at `level`.
    ///
    /// The first increment pins `previous_replicas` to `level`; later
    /// increments only raise `current_replicas`.
    pub fn record_increment(&mut self, pool: &str, level: u32) {
        let change = self
            .changes
            .entry(pool.to_string())
            .or_insert(ReplicaChange {
                previous_replicas: level,
                current_replicas: level,
            });
        change.current_replicas = change.current_replicas.max(level.saturating_add(1));
    }

    pub fn get(&self, pool: &str) -> Option<&ReplicaChange> {
        self.changes.get(pool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PoolName, &ReplicaChange)> {
        self.changes.iter()
    }

    /// `(pool, replicas)` pairs the fleet should reach in `direction`.
    pub fn targets(&self, direction: Direction) -> impl Iterator<Item = (&PoolName, u32)> + '_ {
        self.changes
            .iter()
            .map(move |(name, change)| (name, direction.target(change)))
    }

    /// Total replicas added across all pools.
    pub fn total_added(&self) -> u64 {
        self.changes.values().map(|c| u64::from(c.added())).sum()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

// ── Nodes and instances ────────────────────────────────────────────

/// A cluster node and whether it reports `Ready=True`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub ready: bool,
}

/// A compute instance backing a machine pool (a Machine on OpenShift).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeInstance {
    pub name: String,
    /// Image or version tag, e.g. the AMI id on AWS.
    pub image: Option<String>,
}

/// Compute instances observed at one point in time, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceSnapshot {
    instances: BTreeMap<String, ComputeInstance>,
}

impl InstanceSnapshot {
    pub fn from_instances(instances: impl IntoIterator<Item = ComputeInstance>) -> Self {
        Self {
            instances: instances
                .into_iter()
                .map(|inst| (inst.name.clone(), inst))
                .collect(),
        }
    }

    /// Instances present here but absent from `baseline`, ordered by name.
    pub fn new_since(&self, baseline: &InstanceSnapshot) -> Vec<ComputeInstance> {
        self.instances
            .iter()
            .filter(|(name, _)| !baseline.instances.contains_key(*name))
            .map(|(_, inst)| inst.clone())
            .collect()
    }

    /// Image identifier for the run.
    ///
    /// Taken from the first new instance that reports one, falling back
    /// to any instance in this snapshot.
    pub fn image_identifier(&self, new_instances: &[ComputeInstance]) -> Option<String> {
        new_instances
            .iter()
            .chain(self.instances.values())
            .find_map(|inst| inst.image.clone())
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

// ── Retry policy ───────────────────────────────────────────────────

/// Backoff schedule plus attempt budget for retrying a probe.
///
/// The last backoff entry is reused for every attempt past the end of
/// the list. An empty list means no wait between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Vec<Duration>,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(backoff: Vec<Duration>, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts,
        }
    }

    /// Same wait between every attempt.
    pub fn constant(interval: Duration, max_attempts: u32) -> Self {
        Self::new(vec![interval], max_attempts)
    }

    /// Wait after the failed attempt with 0-based index `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize).min(self.backoff.len().saturating_sub(1));
        self.backoff.get(idx).copied().unwrap_or_default()
    }

    /// Attempt budget, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(5),
                Duration::from_secs(10),
            ],
            10,
        )
    }
}
