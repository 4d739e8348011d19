// Telemetry module for structured logging and optimizer metrics

use crate::models::StrategyKind;
use crate::quality::QualityMetrics;
use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging with JSON formatting
///
/// `RUST_LOG` takes precedence over `log_level` when set.
#[tracing::instrument(skip_all)]
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, "Structured logging initialized with JSON formatting");

    Ok(())
}

/// Initialize the Prometheus metrics exporter and describe optimizer metrics
#[tracing::instrument(skip_all)]
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "schedule_allocations_total",
        "Total number of allocation runs by strategy and status"
    );
    describe_counter!(
        "schedule_fallback_total",
        "Allocation runs that degraded to the hourly fallback schedule"
    );
    describe_counter!(
        "schedule_violations_total",
        "Constraint violations reported by schedule validation"
    );
    describe_counter!(
        "analytics_fetch_failures_total",
        "Analytics fetches that failed or timed out"
    );
    describe_histogram!(
        "schedule_allocation_duration_seconds",
        "Duration of optimization runs in seconds"
    );
    describe_gauge!("schedule_quality_engagement_alignment", "Latest engagement alignment score");
    describe_gauge!("schedule_quality_time_distribution", "Latest time distribution score");
    describe_gauge!("schedule_quality_board_balance", "Latest board balance score");

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_allocation(strategy: StrategyKind, fallback: bool, duration_seconds: f64) {
    let status = if fallback { "fallback" } else { "optimized" };
    counter!(
        "schedule_allocations_total",
        "strategy" => strategy.as_str(),
        "status" => status
    )
    .increment(1);
    histogram!("schedule_allocation_duration_seconds", "strategy" => strategy.as_str())
        .record(duration_seconds);
}

#[inline]
pub fn record_fallback(strategy: StrategyKind) {
    counter!("schedule_fallback_total", "strategy" => strategy.as_str()).increment(1);
}

#[inline]
pub fn record_violations(count: u64) {
    counter!("schedule_violations_total").increment(count);
}

#[inline]
pub fn record_analytics_failures(count: u64) {
    counter!("analytics_fetch_failures_total").increment(count);
}

/// Publish the latest quality scores as gauges
#[inline]
pub fn record_quality(metrics: &QualityMetrics) {
    gauge!("schedule_quality_engagement_alignment").set(metrics.engagement_alignment);
    gauge!("schedule_quality_time_distribution").set(metrics.time_distribution);
    gauge!("schedule_quality_board_balance").set(metrics.board_balance);
}
