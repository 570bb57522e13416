use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use envconfig::Envconfig;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use loadgen::aggregator::{wait_until_healthy, Aggregator, HttpAggregator};
use loadgen::batch::BatchComposer;
use loadgen::cache::RollingCache;
use loadgen::config::Config;
use loadgen::generator::EventGenerator;
use loadgen::metrics::setup_metrics_recorder;
use loadgen::run::{LoadPlan, LoadRun, RunSummary};
use loadgen::time::SystemTime;
use loadgen::verify::{reconcile, Expectations};
use metrics_exporter_prometheus::PrometheusHandle;

enum Outcome {
    Verified,
    Failed,
    Interrupted,
}

async fn shutdown() -> std::io::Result<()> {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("Shutting down, discarding the run...");
    Ok(())
}

async fn run(config: Config, metrics: PrometheusHandle) -> anyhow::Result<Outcome> {
    info!(
        "Publishing {} events to {} ({} duplicate rate, batches of {}, {} virtual users)",
        config.total_events,
        config.base_url,
        config.duplicate_rate,
        config.batch_size,
        config.virtual_users
    );

    let aggregator = Arc::new(
        HttpAggregator::new(&config.base_url, config.request_timeout.0)
            .context("failed to build HTTP client")?,
    );

    wait_until_healthy(
        aggregator.as_ref(),
        config.health_timeout.0,
        config.health_poll_interval.0,
    )
    .await
    .context("aggregator never became healthy")?;

    let pre = aggregator
        .stats()
        .await
        .context("failed to capture stats before the run")?;
    info!(
        received = pre.received,
        unique_processed = pre.unique_processed,
        duplicate_dropped = pre.duplicate_dropped,
        "captured initial stats"
    );

    let composer = Arc::new(BatchComposer::new(
        Arc::new(EventGenerator::new(SystemTime {})),
        Arc::new(RollingCache::new(config.cache_capacity, config.cache_policy)),
    ));
    let load = LoadRun::new(composer, aggregator.clone(), LoadPlan::from_config(&config));

    let summary: RunSummary = load.run().await;
    for line in metrics.render().lines().filter(|line| !line.starts_with('#')) {
        info!("metric {}", line);
    }
    summary
        .ensure_published()
        .context("the run produced no traffic to verify")?;

    if summary.failed_batches > 0 {
        warn!(
            failed_batches = summary.failed_batches,
            failed_events = summary.failed_events,
            "some batches were not accepted: {:.1}% error rate",
            summary.error_rate() * 100.0
        );
    }

    info!(
        "Waiting {:?} for the aggregator to drain...",
        config.settle_delay.0
    );
    tokio::time::sleep(config.settle_delay.0).await;

    let post = aggregator
        .stats()
        .await
        .context("failed to capture stats after the run")?;

    let expectations = Expectations {
        duplicate_rate: config.duplicate_rate,
        tolerance: config.rate_tolerance,
        sent: Some(summary.sent()),
    };

    let report = match reconcile(&pre, &post, expectations) {
        Ok(report) => report,
        Err(err) => {
            error!("{}", err);
            return Ok(Outcome::Failed);
        }
    };

    for line in report.to_string().lines() {
        info!("{}", line);
    }

    if report.rate_within_tolerance() == Some(false) {
        warn!("duplicate rate is outside the tolerance band, not failing the run");
    }

    match report.check() {
        Ok(()) => {
            info!("Verification passed");
            Ok(Outcome::Verified)
        }
        Err(err) => {
            error!("{}", err);
            Ok(Outcome::Failed)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::init_from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {}", err);
            return ExitCode::from(1);
        }
    };

    let metrics = match setup_metrics_recorder() {
        Ok(handle) => handle,
        Err(err) => {
            error!("failed to install metrics recorder: {}", err);
            return ExitCode::from(1);
        }
    };

    // Interrupting at any stage discards the run, partial tallies included.
    let outcome = tokio::select! {
        outcome = run(config, metrics) => outcome,
        result = shutdown() => result
            .map(|()| Outcome::Interrupted)
            .context("failed to register signal handlers"),
    };

    match outcome {
        Ok(Outcome::Verified) => ExitCode::SUCCESS,
        Ok(Outcome::Failed) => ExitCode::from(2),
        Ok(Outcome::Interrupted) => ExitCode::from(130),
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(1)
        }
    }
}
