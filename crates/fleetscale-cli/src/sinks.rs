//! Default measurement and metrics collaborators for the binary.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use fleetscale_scaler::{Measurement, MetricsSink, ScaleReport};

/// Records the wall-clock window the run was measured over.
#[derive(Debug, Default)]
pub struct WindowMeasurement {
    window: Mutex<(Option<u64>, Option<u64>)>,
}

impl WindowMeasurement {
    /// Start and stop timestamps (epoch seconds), once recorded.
    pub fn window(&self) -> (Option<u64>, Option<u64>) {
        *self.window.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn record(&self, stop: bool) -> u64 {
        let now = epoch_secs();
        let mut window = self.window.lock().unwrap_or_else(|p| p.into_inner());
        if stop {
            window.1 = Some(now);
        } else {
            *window = (Some(now), None);
        }
        now
    }
}

#[async_trait]
impl Measurement for WindowMeasurement {
    async fn start(&self) -> anyhow::Result<()> {
        let at = self.record(false);
        info!(at, "measurement window opened");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let at = self.record(true);
        let opened = self.window().0.unwrap_or(at);
        info!(at, duration_secs = at.saturating_sub(opened), "measurement window closed");
        Ok(())
    }
}

/// Logs the report as structured fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl MetricsSink for LogSink {
    async fn finalize(&self, report: &ScaleReport) -> anyhow::Result<()> {
        let document = serde_json::to_string(report)?;
        info!(
            uuid = %report.uuid,
            new_instances = report.new_instances.len(),
            image = report.image_identifier.as_deref().unwrap_or("unknown"),
            duration_secs = report.measurement_end.saturating_sub(report.measurement_start),
            report = %document,
            "workers scale report"
        );
        Ok(())
    }
}

/// Writes `<dir>/workers-scale-<uuid>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    directory: PathBuf,
}

impl JsonFileSink {
    pub fn new(directory: &Path) -> Self {
        Self {
            directory: directory.to_path_buf(),
        }
    }

    pub fn path_for(&self, uuid: &str) -> PathBuf {
        self.directory.join(format!("workers-scale-{uuid}.json"))
    }
}

#[async_trait]
impl MetricsSink for JsonFileSink {
    async fn finalize(&self, report: &ScaleReport) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .with_context(|| format!("creating {}", self.directory.display()))?;

        let path = self.path_for(&report.uuid);
        let json = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        info!(path = %path.display(), "report written");
        Ok(())
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetscale_core::{ComputeInstance, ScalingPlan};

    fn report() -> ScaleReport {
        let mut plan = ScalingPlan::new();
        plan.record_increment("worker-a", 2);
        ScaleReport {
            uuid: "abc-123".to_string(),
            plan,
            new_instances: vec![ComputeInstance {
                name: "worker-a-2".to_string(),
                image: Some("ami-0abc".to_string()),
            }],
            image_identifier: Some("ami-0abc".to_string()),
            measurement_start: 100,
            measurement_end: 160,
        }
    }

    #[tokio::test]
    async fn json_sink_writes_camel_case_report() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(&dir.path().join("collected-metrics"));

        sink.finalize(&report()).await.unwrap();

        let path = sink.path_for("abc-123");
        assert!(path.ends_with("collected-metrics/workers-scale-abc-123.json"));
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["uuid"], "abc-123");
        assert_eq!(value["imageIdentifier"], "ami-0abc");
        assert_eq!(value["measurementEnd"], 160);
        assert_eq!(value["newInstances"][0]["name"], "worker-a-2");
        assert_eq!(value["plan"]["worker-a"]["previousReplicas"], 2);
        assert_eq!(value["plan"]["worker-a"]["currentReplicas"], 3);
    }

    #[tokio::test]
    async fn json_sink_fails_when_directory_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, b"").unwrap();

        let sink = JsonFileSink::new(&blocker);
        assert!(sink.finalize(&report()).await.is_err());
    }

    #[tokio::test]
    async fn log_sink_accepts_report() {
        assert!(LogSink.finalize(&report()).await.is_ok());
    }

    #[tokio::test]
    async fn window_measurement_records_start_then_stop() {
        let measurement = WindowMeasurement::default();
        assert_eq!(measurement.window(), (None, None));

        measurement.start().await.unwrap();
        let (start, stop) = measurement.window();
        assert!(start.is_some());
        assert!(stop.is_none());

        measurement.stop().await.unwrap();
        let (start_again, stop) = measurement.window();
        assert_eq!(start_again, start);
        assert!(stop.unwrap() >= start.unwrap());
    }
}
