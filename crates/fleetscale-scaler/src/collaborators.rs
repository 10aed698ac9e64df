//! Seams to the collaborators that bracket a scaling run.

use async_trait::async_trait;
use serde::Serialize;

use fleetscale_core::{ComputeInstance, ScalingPlan};

/// Starts and stops measurement collection around the scaled interval.
#[async_trait]
pub trait Measurement: Send + Sync {
    async fn start(&self) -> anyhow::Result<()>;

    /// A failure here is logged by the orchestrator and the run goes on.
    async fn stop(&self) -> anyhow::Result<()>;
}

/// Receives the result of a run for recording or indexing.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn finalize(&self, report: &ScaleReport) -> anyhow::Result<()>;
}

/// Everything a run hands to the [`MetricsSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleReport {
    pub uuid: String,
    pub plan: ScalingPlan,
    pub new_instances: Vec<ComputeInstance>,
    pub image_identifier: Option<String>,
    /// Unix timestamp (seconds) when measurements started.
    pub measurement_start: u64,
    /// Unix timestamp (seconds) when measurements stopped.
    pub measurement_end: u64,
}
