//! fleetscale-scaler — temporarily grow the worker fleet for a benchmark.
//!
//! # Run sequence
//!
//! ```text
//! Init → SnapshotBaseline → MeasureStart → Apply → MeasureStop
//!      → SnapshotPostScale → DiffNewInstances → FinalizeMetrics
//!      → (gc) Revert → Done
//! ```
//!
//! Apply balances the requested replicas across pools level by level
//! (see [`balancer`]), pushes the counts to the platform, confirms they
//! read back, and waits for nodes to turn ready, all inside the
//! measurement window.
//!
//! # Failure policy
//!
//! Anything that fails before the first mutation aborts the run with a
//! [`ScaleError`]. After that, failures are logged and collected on the
//! [`ScaleOutcome`] while the run carries on to finalize metrics and, if
//! requested, restore the fleet.

pub mod balancer;
pub mod collaborators;
pub mod error;
pub mod inventory;
pub mod mutator;
pub mod orchestrator;

pub use balancer::balance;
pub use collaborators::{Measurement, MetricsSink, ScaleReport};
pub use error::ScaleError;
pub use inventory::Inventory;
pub use mutator::{FleetMutator, MutationFailure, MutationReport};
pub use orchestrator::{Orchestrator, ScaleOptions, ScaleOutcome, ScalePhase, ScaleRequest};
