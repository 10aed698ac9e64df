//! Scaler error types.

use thiserror::Error;

use fleetscale_core::PlatformError;
use fleetscale_health::{ReadinessError, RetryExhausted};

/// Errors raised during a scaling run.
///
/// `InventoryQuery` and `MeasurementStart` abort a run before any pool is
/// touched. The rest are collected on the outcome once mutation began.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("failed to list {resource}: {source}")]
    InventoryQuery {
        resource: &'static str,
        #[source]
        source: PlatformError,
    },

    #[error("failed to start measurements: {0}")]
    MeasurementStart(#[source] anyhow::Error),

    #[error("{failed} of {total} machine pool updates failed")]
    Mutation { failed: usize, total: usize },

    #[error("replica counts did not converge: {0}")]
    Verification(#[from] RetryExhausted),

    #[error("node readiness: {0}")]
    Readiness(#[from] ReadinessError),

    #[error("failed to finalize metrics: {0}")]
    Finalize(#[source] anyhow::Error),
}

pub type ScaleResult<T> = Result<T, ScaleError>;
