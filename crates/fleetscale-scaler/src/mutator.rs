//! Fleet mutator — pushes a plan's replica counts to the platform.
//!
//! One `set_replicas` call per pool, fanned out as tasks and bounded by a
//! semaphore. Results come back over a channel; a failed pool never stops
//! the others from being attempted.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, warn};

use fleetscale_core::{Direction, PlatformError, PoolName, ScalingPlan};
use fleetscale_platform::SharedPlatform;

const DEFAULT_CONCURRENCY: usize = 8;

/// A pool update that the platform rejected or that never completed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to set {pool} to {replicas} replicas: {source}")]
pub struct MutationFailure {
    pub pool: PoolName,
    pub replicas: u32,
    #[source]
    pub source: PlatformError,
}

/// Outcome of applying or reverting a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReport {
    pub direction: Direction,
    /// Pools updated successfully, with the count they were set to.
    pub updated: Vec<(PoolName, u32)>,
    pub failures: Vec<MutationFailure>,
}

impl MutationReport {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            updated: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of pools the report covers.
    pub fn total(&self) -> usize {
        self.updated.len() + self.failures.len()
    }
}

/// Applies and reverts scaling plans.
#[derive(Clone)]
pub struct FleetMutator {
    platform: SharedPlatform,
    concurrency: usize,
}

impl FleetMutator {
    pub fn new(platform: SharedPlatform) -> Self {
        Self {
            platform,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Cap on concurrent platform calls (at least one).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set every pool in the plan to its `current_replicas`.
    pub async fn apply(&self, plan: &ScalingPlan) -> MutationReport {
        self.mutate(plan, Direction::Apply).await
    }

    /// Set every pool in the plan back to its `previous_replicas`.
    pub async fn revert(&self, plan: &ScalingPlan) -> MutationReport {
        self.mutate(plan, Direction::Revert).await
    }

    async fn mutate(&self, plan: &ScalingPlan, direction: Direction) -> MutationReport {
        let mut report = MutationReport::new(direction);
        if plan.is_empty() {
            return report;
        }

        let (tx, mut rx) = mpsc::channel(plan.len());
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut outstanding: BTreeSet<PoolName> = BTreeSet::new();

        for (pool, replicas) in plan.targets(direction) {
            outstanding.insert(pool.clone());
            let platform = Arc::clone(&self.platform);
            let permits = Arc::clone(&permits);
            let tx = tx.clone();
            let pool = pool.clone();

            tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let result = platform.set_replicas(&pool, replicas).await;
                let _ = tx.send((pool, replicas, result)).await;
            });
        }
        drop(tx);

        while let Some((pool, replicas, result)) = rx.recv().await {
            outstanding.remove(&pool);
            match result {
                Ok(()) => {
                    debug!(%pool, replicas, ?direction, "machine pool updated");
                    report.updated.push((pool, replicas));
                }
                Err(source) => {
                    warn!(%pool, replicas, ?direction, error = %source, "machine pool update failed");
                    report.failures.push(MutationFailure {
                        pool,
                        replicas,
                        source,
                    });
                }
            }
        }

        // Tasks that died before reporting back.
        for pool in outstanding {
            let replicas = plan.get(&pool).map_or(0, |c| direction.target(c));
            warn!(%pool, ?direction, "machine pool update task did not report");
            report.failures.push(MutationFailure {
                pool,
                replicas,
                source: PlatformError::Api("update task aborted".to_string()),
            });
        }

        report.updated.sort();
        report.failures.sort_by(|a, b| a.pool.cmp(&b.pool));
        info!(
            ?direction,
            updated = report.updated.len(),
            failed = report.failures.len(),
            "machine pool updates finished"
        );
        report
    }
}
