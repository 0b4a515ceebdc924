//! Metrics for a reconciliation run.
//!
//! Values are recorded through the `metrics` facade into a Prometheus
//! recorder. A batch run cannot be scraped, so the rendered text is pushed
//! once to a Pushgateway at the end of the run when one is configured.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::fmt;
use tracing::{info, warn};

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Every metric the pipeline records. No magic strings at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Store extraction
    StoresOpened,
    StoresFailed,
    StoreRowsExtracted,
    StoreRowsProvisional,

    // Deduplication
    DedupInputRecords,
    DedupUnidentifiedRecords,
    DedupUnparseableDates,
    DedupCanonicalTrees,

    // Status overlay
    OverlayMatched,
    OverlayUnmatched,

    // Tabular sources
    SourceFetchSuccess,
    SourceFetchError,
    SourceRows,

    // Secondary dataset
    SecondaryRowsAccepted,
    SecondaryRowsRejected,

    // Heat layer
    HeatmapBucketsEmitted,
    HeatmapBucketsSuppressed,

    // Export
    ExportArtifactsWritten,
    ExportBytesWritten,

    StageDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::StoresOpened => "reconcile_stores_opened_total",
            MetricName::StoresFailed => "reconcile_stores_failed_total",
            MetricName::StoreRowsExtracted => "reconcile_store_rows_extracted_total",
            MetricName::StoreRowsProvisional => "reconcile_store_rows_provisional_total",

            MetricName::DedupInputRecords => "reconcile_dedup_input_records_total",
            MetricName::DedupUnidentifiedRecords => "reconcile_dedup_unidentified_records_total",
            MetricName::DedupUnparseableDates => "reconcile_dedup_unparseable_dates_total",
            MetricName::DedupCanonicalTrees => "reconcile_dedup_canonical_trees_total",

            MetricName::OverlayMatched => "reconcile_overlay_matched_total",
            MetricName::OverlayUnmatched => "reconcile_overlay_unmatched_total",

            MetricName::SourceFetchSuccess => "reconcile_source_fetch_success_total",
            MetricName::SourceFetchError => "reconcile_source_fetch_error_total",
            MetricName::SourceRows => "reconcile_source_rows_total",

            MetricName::SecondaryRowsAccepted => "reconcile_secondary_rows_accepted_total",
            MetricName::SecondaryRowsRejected => "reconcile_secondary_rows_rejected_total",

            MetricName::HeatmapBucketsEmitted => "reconcile_heatmap_buckets_emitted_total",
            MetricName::HeatmapBucketsSuppressed => "reconcile_heatmap_buckets_suppressed_total",

            MetricName::ExportArtifactsWritten => "reconcile_export_artifacts_written_total",
            MetricName::ExportBytesWritten => "reconcile_export_bytes_written_total",

            MetricName::StageDuration => "reconcile_stage_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Installs the Prometheus recorder. Safe to call more than once.
pub fn init() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
        }
        Err(e) => warn!("Prometheus recorder not installed: {}", e),
    }
}

pub fn emit_counter(name: MetricName, value: f64) {
    ::metrics::counter!(name.as_str()).increment(value as u64);
}

pub fn emit_labeled_counter(name: MetricName, label: &'static str, value: &str, count: f64) {
    ::metrics::counter!(name.as_str(), label => value.to_string()).increment(count as u64);
}

pub fn emit_stage_duration(stage: &'static str, secs: f64) {
    ::metrics::histogram!(MetricName::StageDuration.as_str(), "stage" => stage).record(secs);
}

pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

/// Pushes the rendered metrics to a Pushgateway. Failures are logged only.
pub async fn push_to_gateway(pushgateway_url: &str, job: &str, instance: &str) {
    let Some(body) = render() else {
        return;
    };
    let push_url = format!(
        "{}/metrics/job/{}/instance/{}",
        pushgateway_url.trim_end_matches('/'),
        job,
        instance
    );

    let client = reqwest::Client::new();
    match client
        .post(&push_url)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            info!("Pushed metrics to Pushgateway for instance={}", instance);
        }
        Ok(resp) => warn!("Pushgateway returned status {}", resp.status()),
        Err(e) => warn!("Failed to push metrics: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_prometheus_conventions() {
        let names = [
            MetricName::StoresOpened,
            MetricName::DedupCanonicalTrees,
            MetricName::HeatmapBucketsSuppressed,
            MetricName::ExportBytesWritten,
        ];
        for name in names {
            assert!(name.as_str().starts_with("reconcile_"));
            assert!(name.as_str().ends_with("_total"));
        }
        assert!(MetricName::StageDuration.to_string().ends_with("_seconds"));
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        emit_counter(MetricName::OverlayMatched, 3.0);
        emit_labeled_counter(MetricName::SecondaryRowsRejected, "reason", "not_geotagged", 1.0);
        emit_stage_duration("dedup", 0.01);
    }
}
