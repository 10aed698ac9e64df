//! `fleetscale workers-scale` — grow the worker fleet for a benchmark run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Args};
use tracing::info;
use uuid::Uuid;

use fleetscale_core::config::{MAX_READINESS_TIMEOUT, parse_duration};
use fleetscale_core::{FleetConfig, MAX_REPLICAS, Settings};
use fleetscale_platform::KubePlatform;
use fleetscale_scaler::{MetricsSink, Orchestrator, ScaleOptions, ScaleOutcome, ScaleRequest};

use crate::sinks::{JsonFileSink, LogSink, WindowMeasurement};

#[derive(Args, Debug)]
pub struct WorkersScaleArgs {
    /// Worker nodes to add across the existing machine pools.
    #[arg(
        long,
        default_value_t = 3,
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i64).range(..=i64::from(MAX_REPLICAS))
    )]
    pub additional_worker_nodes: i64,

    /// Restore machine pools to their previous size afterwards.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub gc: bool,

    /// Benchmark run UUID (random when omitted).
    #[arg(long)]
    pub uuid: Option<String>,

    /// Path to a fleetscale.toml file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for the run report.
    #[arg(long)]
    pub metrics_directory: Option<PathBuf>,

    /// How long to wait for nodes to become ready, e.g. "30m".
    #[arg(long, value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Do not wait for nodes to become ready.
    #[arg(long)]
    pub no_wait: bool,

    /// Log the report instead of writing it to the metrics directory.
    #[arg(long)]
    pub local_only: bool,
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    let timeout = parse_duration(value).ok_or_else(|| format!("invalid duration: {value}"))?;
    if timeout > MAX_READINESS_TIMEOUT {
        return Err(format!(
            "timeout must be at most {}h",
            MAX_READINESS_TIMEOUT.as_secs() / 3600
        ));
    }
    Ok(timeout)
}

/// Resolve file settings and apply flag overrides.
fn settings(args: &WorkersScaleArgs) -> anyhow::Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => FleetConfig::from_file(path)
            .and_then(|config| config.resolve())
            .with_context(|| format!("loading {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(dir) = &args.metrics_directory {
        settings.metrics_directory = dir.clone();
    }
    if let Some(timeout) = args.timeout {
        settings.readiness.timeout = timeout;
    }
    if args.no_wait {
        settings.readiness.enabled = false;
    }
    Ok(settings)
}

pub async fn run(args: WorkersScaleArgs) -> anyhow::Result<()> {
    let settings = settings(&args)?;
    let request = ScaleRequest {
        uuid: args
            .uuid
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        additional_workers: args.additional_worker_nodes,
        gc: args.gc,
    };

    let platform = KubePlatform::try_default(&settings.namespace, &settings.field_manager)
        .await
        .context("connecting to the cluster")?;
    info!(namespace = %settings.namespace, "connected to cluster");

    let sink: Arc<dyn MetricsSink> = if args.local_only {
        Arc::new(LogSink)
    } else {
        Arc::new(JsonFileSink::new(&settings.metrics_directory))
    };
    let orchestrator = Orchestrator::new(
        Arc::new(platform),
        Arc::new(WindowMeasurement::default()),
        sink,
    )
    .with_options(ScaleOptions::from_settings(&settings));

    let outcome = orchestrator.run(&request).await?;
    print_summary(&request, &outcome);

    if !outcome.is_success() {
        anyhow::bail!(
            "workers scale finished with {} failure(s)",
            outcome.failures.len()
        );
    }
    Ok(())
}

fn print_summary(request: &ScaleRequest, outcome: &ScaleOutcome) {
    let report = &outcome.report;
    println!("Workers scale {}", request.uuid);
    for (pool, change) in report.plan.iter() {
        println!(
            "  {pool}: {} → {}",
            change.previous_replicas, change.current_replicas
        );
    }
    println!("  New instances: {}", report.new_instances.len());
    if let Some(image) = &report.image_identifier {
        println!("  Image: {image}");
    }
    if let Some(reverted) = &outcome.reverted {
        println!(
            "  Restored: {} pool(s), {} not restored",
            reverted.updated.len(),
            reverted.failures.len()
        );
    }
    for failure in &outcome.failures {
        eprintln!("✗ {failure}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: WorkersScaleArgs,
    }

    fn parse(argv: &[&str]) -> WorkersScaleArgs {
        let mut full = vec!["fleetscale"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args
    }

    #[test]
    fn defaults() {
        let args = parse(&[]);
        assert_eq!(args.additional_worker_nodes, 3);
        assert!(args.gc);
        assert!(args.uuid.is_none());
        assert!(!args.no_wait);

        let settings = settings(&args).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn gc_takes_an_explicit_value() {
        let args = parse(&["--gc", "false", "--additional-worker-nodes", "-2"]);
        assert!(!args.gc);
        assert_eq!(args.additional_worker_nodes, -2);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleetscale.toml");
        std::fs::write(
            &path,
            r#"
[readiness]
timeout = "2h"

[output]
metrics_directory = "from-file"
"#,
        )
        .unwrap();

        let config = path.to_str().unwrap();
        let args = parse(&["--config", config, "--timeout", "90s", "--no-wait"]);
        let resolved = settings(&args).unwrap();
        assert_eq!(resolved.readiness.timeout, Duration::from_secs(90));
        assert!(!resolved.readiness.enabled);
        assert_eq!(resolved.metrics_directory, PathBuf::from("from-file"));

        let args = parse(&["--config", config, "--metrics-directory", "out"]);
        let resolved = settings(&args).unwrap();
        assert_eq!(resolved.readiness.timeout, Duration::from_secs(2 * 60 * 60));
        assert_eq!(resolved.metrics_directory, PathBuf::from("out"));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let result = TestCli::try_parse_from(["fleetscale", "--timeout", "soon"]);
        assert!(result.is_err());
    }

    #[test]
    fn oversized_timeout_is_rejected() {
        for value in ["18446744073709551615", "999999999999999999h", "721h"] {
            let result = TestCli::try_parse_from(["fleetscale", "--timeout", value]);
            assert!(result.is_err(), "{value} accepted");
        }
        assert_eq!(
            parse(&["--timeout", "720h"]).timeout,
            Some(MAX_READINESS_TIMEOUT)
        );
    }

    #[test]
    fn worker_count_beyond_replica_limit_is_rejected() {
        let too_many = (i64::from(MAX_REPLICAS) + 1).to_string();
        let result =
            TestCli::try_parse_from(["fleetscale", "--additional-worker-nodes", too_many.as_str()]);
        assert!(result.is_err());

        let max = i64::from(MAX_REPLICAS).to_string();
        let args = parse(&["--additional-worker-nodes", max.as_str()]);
        assert_eq!(args.additional_worker_nodes, i64::from(MAX_REPLICAS));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args = parse(&["--config", "/nonexistent/fleetscale.toml"]);
        assert!(settings(&args).is_err());
    }
}
