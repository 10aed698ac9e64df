//! Node readiness poller.
//!
//! Lists nodes immediately, then every `interval`, until every node
//! reports `Ready=True` or `timeout` elapses. A failed listing aborts the
//! wait straight away rather than being retried.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use fleetscale_core::{PlatformError, RetryPolicy};
use fleetscale_platform::FleetPlatform;

use crate::retry::{Backoff, Budget};

/// Stand-in deadline for timeouts too large to represent as an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("nodes not ready after {timeout:?}: {}", not_ready.join(", "))]
    Timeout {
        timeout: Duration,
        /// Nodes not ready at the last observation.
        not_ready: Vec<String>,
    },

    #[error("failed to list nodes: {0}")]
    Query(#[from] PlatformError),
}

/// Block until every node is ready, returning how long it took.
pub async fn wait_ready(
    platform: &dyn FleetPlatform,
    interval: Duration,
    timeout: Duration,
) -> Result<Duration, ReadinessError> {
    let start = Instant::now();
    let deadline = start
        .checked_add(timeout)
        .unwrap_or_else(|| start + FAR_FUTURE);
    let schedule = RetryPolicy::constant(interval, 1);
    let mut backoff = Backoff::new(&schedule, Budget::Deadline(deadline));

    loop {
        let nodes = platform.list_nodes().await?;
        let not_ready: Vec<String> = nodes
            .into_iter()
            .filter(|n| !n.ready)
            .map(|n| n.name)
            .collect();

        if not_ready.is_empty() {
            let elapsed = start.elapsed();
            info!(elapsed_secs = elapsed.as_secs(), "all nodes are ready");
            return Ok(elapsed);
        }
        for name in &not_ready {
            debug!(node = %name, "node is not ready");
        }

        if !backoff.wait().await {
            return Err(ReadinessError::Timeout { timeout, not_ready });
        }
    }
}
