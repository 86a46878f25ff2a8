// core/common/src/metrics.rs
// Prometheus metrics for artifact traffic

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::time::Instant;

/// Artifact upload/download metrics
#[derive(Clone)]
pub struct ArtifactMetrics {
    pub uploads_total: IntCounterVec,
    pub downloads_total: IntCounterVec,
    pub retry_attempts_total: IntCounter,
    pub download_duration_seconds: HistogramVec,
}

impl ArtifactMetrics {
    pub fn new(registry: &Registry, namespace: &str) -> Result<Self, prometheus::Error> {
        let uploads_total = IntCounterVec::new(
            Opts::new("artifact_uploads_total", "Total number of artifact uploads")
                .namespace(namespace),
            &["status"],
        )?;
        registry.register(Box::new(uploads_total.clone()))?;

        let downloads_total = IntCounterVec::new(
            Opts::new("artifact_downloads_total", "Total number of artifact download attempts")
                .namespace(namespace),
            &["status"],
        )?;
        registry.register(Box::new(downloads_total.clone()))?;

        let retry_attempts_total = IntCounter::with_opts(
            Opts::new("artifact_retry_attempts_total", "Download attempts beyond the first")
                .namespace(namespace),
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let download_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "artifact_download_duration_seconds",
                "Time until an artifact became readable, in seconds",
            )
            .namespace(namespace)
            .buckets(vec![0.001, 0.01, 0.1, 1.0, 5.0, 15.0, 30.0, 60.0]),
            &["status"],
        )?;
        registry.register(Box::new(download_duration_seconds.clone()))?;

        Ok(Self {
            uploads_total,
            downloads_total,
            retry_attempts_total,
            download_duration_seconds,
        })
    }

    pub fn record_upload(&self, status: &str) {
        self.uploads_total.with_label_values(&[status]).inc();
    }

    pub fn record_download(&self, status: &str) {
        self.downloads_total.with_label_values(&[status]).inc();
    }

    pub fn record_retry(&self) {
        self.retry_attempts_total.inc();
    }

    pub fn record_download_duration(&self, status: &str, duration: f64) {
        self.download_duration_seconds
            .with_label_values(&[status])
            .observe(duration);
    }
}

/// Timer to measure operation duration
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for MetricsTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_metrics_creation() {
        let registry = Registry::new();
        let metrics = ArtifactMetrics::new(&registry, "test_probe");
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_record_upload_and_download() {
        let registry = Registry::new();
        let metrics = ArtifactMetrics::new(&registry, "test_probe").unwrap();

        metrics.record_upload("success");
        metrics.record_download("not_found");
        metrics.record_download("success");
        metrics.record_retry();

        assert_eq!(metrics.uploads_total.with_label_values(&["success"]).get(), 1);
        assert_eq!(metrics.downloads_total.with_label_values(&["not_found"]).get(), 1);
        assert_eq!(metrics.retry_attempts_total.get(), 1);
    }

    #[test]
    fn test_record_download_duration() {
        let registry = Registry::new();
        let metrics = ArtifactMetrics::new(&registry, "test_probe").unwrap();

        metrics.record_download_duration("success", 0.5);

        let metric_families = registry.gather();
        assert!(!metric_families.is_empty());
    }

    #[test]
    fn test_metrics_timer() {
        let timer = MetricsTimer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.elapsed_seconds();
        assert!(elapsed >= 0.01);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();

        let metrics = ArtifactMetrics::new(&registry, "test_probe");
        assert!(metrics.is_ok());

        // Registering the same metrics again should fail
        let duplicate = ArtifactMetrics::new(&registry, "test_probe");
        assert!(duplicate.is_err());
    }
}
