use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Prometheus recorder configuration for the load generator's metrics.
pub fn recorder_builder() -> Result<PrometheusBuilder, BuildError> {
    const BATCH_SIZES: &[f64] = &[
        1.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 1000.0, 5000.0,
    ];

    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full("loadgen_batch_size".to_string()), BATCH_SIZES)
}

/// Install the process-wide recorder. Its handle renders everything recorded
/// so far in the Prometheus text format.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    recorder_builder()?.install_recorder()
}
