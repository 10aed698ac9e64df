//! Scaling orchestrator — one linear pass from baseline to cleanup.
//!
//! Each step finishes before the next starts, so the measurement window
//! never overlaps a half-issued plan and the post-scale snapshot always
//! follows every planned mutation.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};

use fleetscale_core::{
    Direction, ReadinessSettings, ScalingPlan, Settings, VerifySettings,
};
use fleetscale_health::retry::total_delay;
use fleetscale_health::{RetryExhausted, retry, wait_ready};
use fleetscale_platform::{FleetPlatform, SharedPlatform};

use crate::balancer::balance;
use crate::collaborators::{Measurement, MetricsSink, ScaleReport};
use crate::error::{ScaleError, ScaleResult};
use crate::inventory::Inventory;
use crate::mutator::{FleetMutator, MutationReport};

/// Steps of a scaling run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalePhase {
    Init,
    SnapshotBaseline,
    MeasureStart,
    Apply,
    MeasureStop,
    SnapshotPostScale,
    DiffNewInstances,
    FinalizeMetrics,
    Revert,
    Done,
}

/// What to scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleRequest {
    /// Benchmark run identifier, carried into the report.
    pub uuid: String,
    /// Replicas to add across the fleet. Zero or less is a no-op.
    pub additional_workers: i64,
    /// Restore the fleet to its prior size at the end of the run.
    pub gc: bool,
}

/// How to scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleOptions {
    pub readiness: ReadinessSettings,
    pub verify: VerifySettings,
    pub concurrency: usize,
}

impl ScaleOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            readiness: settings.readiness.clone(),
            verify: settings.verify.clone(),
            concurrency: settings.mutation_concurrency,
        }
    }
}

impl Default for ScaleOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Result of a run that got past its first mutation.
#[derive(Debug)]
pub struct ScaleOutcome {
    pub report: ScaleReport,
    pub applied: MutationReport,
    /// Present when the request asked for garbage collection.
    pub reverted: Option<MutationReport>,
    /// Failures after mutation began. Empty means the run succeeded.
    pub failures: Vec<ScaleError>,
    /// Phases entered, in order.
    pub phases: Vec<ScalePhase>,
}

impl ScaleOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn plan(&self) -> &ScalingPlan {
        &self.report.plan
    }
}

/// Drives a scaling run against a platform and its collaborators.
pub struct Orchestrator {
    platform: SharedPlatform,
    measurement: Arc<dyn Measurement>,
    sink: Arc<dyn MetricsSink>,
    options: ScaleOptions,
}

impl Orchestrator {
    pub fn new(
        platform: SharedPlatform,
        measurement: Arc<dyn Measurement>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            platform,
            measurement,
            sink,
            options: ScaleOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ScaleOptions) -> Self {
        self.options = options;
        self
    }

    /// Run one scaling pass.
    ///
    /// Returns `Err` only when the run stopped before touching the fleet.
    pub async fn run(&self, request: &ScaleRequest) -> ScaleResult<ScaleOutcome> {
        let mut phases = vec![ScalePhase::Init];
        let mut failures = Vec::new();
        let inventory = Inventory::new(Arc::clone(&self.platform));
        let mutator =
            FleetMutator::new(Arc::clone(&self.platform)).with_concurrency(self.options.concurrency);

        info!(
            uuid = %request.uuid,
            additional_workers = request.additional_workers,
            gc = request.gc,
            "starting workers scale"
        );

        enter(&mut phases, ScalePhase::SnapshotBaseline);
        let mut groups = inventory.replica_groups().await?;
        let baseline = inventory.instances().await?;

        enter(&mut phases, ScalePhase::MeasureStart);
        self.measurement
            .start()
            .await
            .map_err(ScaleError::MeasurementStart)?;
        let measurement_start = epoch_secs();

        enter(&mut phases, ScalePhase::Apply);
        let plan = balance(&mut groups, request.additional_workers);
        info!(
            pools = plan.len(),
            replicas = plan.total_added(),
            "updating machine pools evenly to reach desired count"
        );
        let applied = mutator.apply(&plan).await;
        if !applied.is_success() {
            failures.push(ScaleError::Mutation {
                failed: applied.failures.len(),
                total: applied.total(),
            });
        }
        if !plan.is_empty() {
            if self.options.verify.enabled
                && applied.is_success()
                && let Err(e) = self.verify_replicas(&plan).await
            {
                error!(error = %e, "machine pools did not report their new replica counts");
                failures.push(ScaleError::Verification(e));
            }
            if applied.updated.is_empty() {
                warn!("no machine pool was updated, skipping node readiness wait");
            } else if self.options.readiness.enabled {
                let interval = self.options.readiness.interval;
                let timeout = self.options.readiness.timeout;
                info!(timeout_secs = timeout.as_secs(), "waiting for nodes to be ready");
                if let Err(e) = wait_ready(self.platform.as_ref(), interval, timeout).await {
                    error!(error = %e, "nodes did not become ready");
                    failures.push(ScaleError::Readiness(e));
                }
            }
        }

        enter(&mut phases, ScalePhase::MeasureStop);
        if let Err(e) = self.measurement.stop().await {
            error!(error = %e, "failed to stop measurements");
        }
        let measurement_end = epoch_secs();

        enter(&mut phases, ScalePhase::SnapshotPostScale);
        let scaled = match inventory.instances().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                error!(error = %e, "post-scale snapshot failed, new instances unknown");
                failures.push(e);
                None
            }
        };

        enter(&mut phases, ScalePhase::DiffNewInstances);
        let (new_instances, image_identifier) = match &scaled {
            Some(scaled) => {
                let new_instances = scaled.new_since(&baseline);
                let image = scaled.image_identifier(&new_instances);
                (new_instances, image)
            }
            None => (Vec::new(), None),
        };
        info!(
            new_instances = new_instances.len(),
            image = image_identifier.as_deref().unwrap_or("unknown"),
            "new compute instances identified"
        );

        enter(&mut phases, ScalePhase::FinalizeMetrics);
        let report = ScaleReport {
            uuid: request.uuid.clone(),
            plan,
            new_instances,
            image_identifier,
            measurement_start,
            measurement_end,
        };
        if let Err(e) = self.sink.finalize(&report).await {
            error!(error = %e, "failed to finalize metrics");
            failures.push(ScaleError::Finalize(e));
        }

        let reverted = if request.gc {
            enter(&mut phases, ScalePhase::Revert);
            info!("restoring machine pools to previous state");
            let reverted = mutator.revert(&report.plan).await;
            for failure in &reverted.failures {
                warn!(error = %failure, "machine pool was not restored");
            }
            Some(reverted)
        } else {
            None
        };

        enter(&mut phases, ScalePhase::Done);
        info!(
            uuid = %request.uuid,
            failures = failures.len(),
            "workers scale finished"
        );

        Ok(ScaleOutcome {
            report,
            applied,
            reverted,
            failures,
            phases,
        })
    }

    /// Re-read pools until each planned pool shows its new count.
    async fn verify_replicas(&self, plan: &ScalingPlan) -> Result<u32, RetryExhausted> {
        let policy = &self.options.verify.policy;
        debug!(
            attempts = policy.attempts(),
            max_wait_secs = total_delay(policy, policy.attempts() - 1).as_secs(),
            "verifying replica counts"
        );
        let platform = self.platform.as_ref();
        let attempts = retry(policy, || replicas_converged(platform, plan)).await?;
        debug!(attempts, "replica counts verified");
        Ok(attempts)
    }
}

async fn replicas_converged(platform: &dyn FleetPlatform, plan: &ScalingPlan) -> bool {
    let pools = match platform.list_pools().await {
        Ok(pools) => pools,
        Err(e) => {
            debug!(error = %e, "pool listing failed during verification");
            return false;
        }
    };
    plan.targets(Direction::Apply).all(|(name, target)| {
        pools
            .iter()
            .any(|p| &p.name == name && p.replicas == target)
    })
}

fn enter(phases: &mut Vec<ScalePhase>, phase: ScalePhase) {
    debug!(?phase, "entering phase");
    phases.push(phase);
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
