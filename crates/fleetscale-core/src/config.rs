//! fleetscale.toml configuration parser.
//!
//! Every field is optional. [`FleetConfig::resolve`] fills in defaults
//! and turns duration strings into [`Duration`]s.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::RetryPolicy;

pub const DEFAULT_NAMESPACE: &str = "openshift-machine-api";
pub const DEFAULT_FIELD_MANAGER: &str = "fleetscale";
pub const DEFAULT_METRICS_DIRECTORY: &str = "collected-metrics";

/// Longest readiness timeout accepted from config or flags (30 days).
pub const MAX_READINESS_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    pub platform: Option<PlatformConfig>,
    pub readiness: Option<ReadinessConfig>,
    pub verify: Option<VerifyConfig>,
    pub mutation: Option<MutationConfig>,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub namespace: Option<String>,
    pub field_manager: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadinessConfig {
    pub enabled: Option<bool>,
    pub interval: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyConfig {
    pub enabled: Option<bool>,
    pub backoff: Option<Vec<String>>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MutationConfig {
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub metrics_directory: Option<PathBuf>,
}

/// Fully resolved settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub namespace: String,
    pub field_manager: String,
    pub readiness: ReadinessSettings,
    pub verify: VerifySettings,
    pub mutation_concurrency: usize,
    pub metrics_directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessSettings {
    pub enabled: bool,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifySettings {
    pub enabled: bool,
    pub policy: RetryPolicy,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: RetryPolicy::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            readiness: ReadinessSettings::default(),
            verify: VerifySettings::default(),
            mutation_concurrency: 8,
            metrics_directory: PathBuf::from(DEFAULT_METRICS_DIRECTORY),
        }
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply defaults and validate.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let mut settings = Settings::default();

        if let Some(platform) = &self.platform {
            if let Some(ns) = &platform.namespace {
                settings.namespace = ns.clone();
            }
            if let Some(fm) = &platform.field_manager {
                settings.field_manager = fm.clone();
            }
        }

        if let Some(readiness) = &self.readiness {
            if let Some(enabled) = readiness.enabled {
                settings.readiness.enabled = enabled;
            }
            if let Some(interval) = &readiness.interval {
                settings.readiness.interval = required_duration("readiness.interval", interval)?;
            }
            if let Some(timeout) = &readiness.timeout {
                settings.readiness.timeout = required_duration("readiness.timeout", timeout)?;
            }
            if settings.readiness.timeout > MAX_READINESS_TIMEOUT {
                return Err(ConfigError::Invalid {
                    field: "readiness.timeout",
                    reason: format!("must be at most {}h", MAX_READINESS_TIMEOUT.as_secs() / 3600),
                });
            }
            if settings.readiness.interval.is_zero() {
                return Err(ConfigError::Invalid {
                    field: "readiness.interval",
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if let Some(verify) = &self.verify {
            if let Some(enabled) = verify.enabled {
                settings.verify.enabled = enabled;
            }
            if let Some(backoff) = &verify.backoff {
                settings.verify.policy.backoff = backoff
                    .iter()
                    .map(|s| required_duration("verify.backoff", s))
                    .collect::<Result<_, _>>()?;
            }
            if let Some(max_attempts) = verify.max_attempts {
                settings.verify.policy.max_attempts = max_attempts;
            }
        }

        if let Some(concurrency) = self.mutation.as_ref().and_then(|m| m.concurrency) {
            if concurrency == 0 {
                return Err(ConfigError::Invalid {
                    field: "mutation.concurrency",
                    reason: "must be at least 1".to_string(),
                });
            }
            settings.mutation_concurrency = concurrency;
        }

        if let Some(dir) = self.output.as_ref().and_then(|o| o.metrics_directory.clone()) {
            settings.metrics_directory = dir;
        }

        Ok(settings)
    }
}

fn required_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

/// Parse a duration string like "500ms", "5s", "2m", "1h".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins = mins.parse::<u64>().ok()?;
        mins.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        let hours = hours.parse::<u64>().ok()?;
        hours.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_resolves_to_defaults() {
        let config = FleetConfig::from_toml_str("").unwrap();
        assert_eq!(config.resolve().unwrap(), Settings::default());
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[platform]
namespace = "machines"

[readiness]
interval = "2s"
timeout = "30m"

[verify]
backoff = ["500ms", "1s"]
max_attempts = 4

[mutation]
concurrency = 2

[output]
metrics_directory = "/tmp/results"
"#;
        let settings = FleetConfig::from_toml_str(toml_str)
            .unwrap()
            .resolve()
            .unwrap();

        assert_eq!(settings.namespace, "machines");
        assert_eq!(settings.field_manager, DEFAULT_FIELD_MANAGER);
        assert_eq!(settings.readiness.interval, Duration::from_secs(2));
        assert_eq!(settings.readiness.timeout, Duration::from_secs(1800));
        assert_eq!(
            settings.verify.policy,
            RetryPolicy::new(
                vec![Duration::from_millis(500), Duration::from_secs(1)],
                4
            )
        );
        assert_eq!(settings.mutation_concurrency, 2);
        assert_eq!(settings.metrics_directory, PathBuf::from("/tmp/results"));
    }

    #[test]
    fn bad_duration_is_rejected() {
        let config = FleetConfig::from_toml_str("[readiness]\ntimeout = \"soon\"\n").unwrap();
        let err = config.resolve().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration { field: "readiness.timeout", .. }
        ));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = FleetConfig::from_toml_str("[mutation]\nconcurrency = 0\n").unwrap();
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::Invalid { field: "mutation.concurrency", .. })
        ));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleetscale.toml");
        std::fs::write(&path, "[readiness]\nenabled = false\n").unwrap();

        let settings = FleetConfig::from_file(&path).unwrap().resolve().unwrap();
        assert!(!settings.readiness.enabled);
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("later"), None);
    }

    #[test]
    fn overflowing_duration_is_none() {
        assert_eq!(parse_duration("999999999999999999h"), None);
        assert_eq!(parse_duration("999999999999999999m"), None);
        assert_eq!(parse_duration("99999999999999999999"), None);

        let config =
            FleetConfig::from_toml_str("[readiness]\ntimeout = \"999999999999999999h\"\n").unwrap();
        assert!(matches!(
            config.resolve().unwrap_err(),
            ConfigError::InvalidDuration { field: "readiness.timeout", .. }
        ));
    }

    #[test]
    fn oversized_readiness_timeout_is_rejected() {
        let config =
            FleetConfig::from_toml_str("[readiness]\ntimeout = \"18446744073709551615\"\n").unwrap();
        assert!(matches!(
            config.resolve().unwrap_err(),
            ConfigError::Invalid { field: "readiness.timeout", .. }
        ));

        let config = FleetConfig::from_toml_str("[readiness]\ntimeout = \"720h\"\n").unwrap();
        assert_eq!(config.resolve().unwrap().readiness.timeout, MAX_READINESS_TIMEOUT);
    }
}
