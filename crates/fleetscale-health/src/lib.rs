//! fleetscale-health — waiting on eventually consistent cluster state.
//!
//! Two primitives, both driven by the same [`Backoff`] schedule:
//!
//! ```text
//! retry(policy, probe)        attempt-bounded: probe() -> bool, sleep backoff[i] between tries
//! wait_ready(platform, ..)    deadline-bounded: list nodes every interval until all Ready
//! ```
//!
//! Neither needs a cancellation signal. The retry driver stops when its
//! attempt budget runs out and the poller stops at its deadline.

pub mod readiness;
pub mod retry;

pub use readiness::{ReadinessError, wait_ready};
pub use retry::{Backoff, Budget, RetryExhausted, retry};
