//! fleetscale-core — shared types for the worker fleet scaler.
//!
//! Holds the data model passed between the platform layer, the balancer,
//! the mutator and the orchestrator, plus the `fleetscale.toml` parser.

pub mod config;
pub mod error;
pub mod types;

pub use config::{FleetConfig, ReadinessSettings, Settings, VerifySettings};
pub use error::{ConfigError, PlatformError, PlatformResult};
pub use types::*;
