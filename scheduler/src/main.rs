// Scheduler binary entry point: one optimization run over JSON-file collaborators

use anyhow::{Context, Result};
use chrono::Utc;
use common::config::Settings;
use common::optimizer::{OptimizationRequest, ScheduleOptimizer};
use common::providers::{
    ContentStore, JsonFileAnalyticsProvider, JsonFileContentStore, JsonFileScheduleStore,
    ScheduleStore,
};
use common::quality::QualityMonitor;
use common::schedule::next_optimal_time;
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;

    telemetry::init_logging(&settings.observability.log_level)?;
    info!("Starting content schedule optimizer");

    if let Err(e) = settings.validate() {
        error!(error = %e, "Invalid configuration");
        anyhow::bail!("Invalid configuration: {}", e);
    }

    if settings.observability.metrics_enabled {
        telemetry::init_metrics(settings.observability.metrics_port)?;
    }

    let constraints = settings
        .constraints
        .to_constraints()
        .context("Failed to resolve default constraints")?;

    info!(
        strategy = settings.optimizer.strategy.as_str(),
        items_path = %settings.io.items_path,
        analytics_path = %settings.io.analytics_path,
        output_path = %settings.io.output_path,
        timezone = %constraints.timezone,
        "Configuration loaded"
    );

    let content = JsonFileContentStore::new(&settings.io.items_path);
    let items = content
        .pending_items()
        .await
        .with_context(|| format!("Failed to read pending items from {}", settings.io.items_path))?;
    info!(pending_items = items.len(), "Pending items loaded");

    let analytics = Arc::new(JsonFileAnalyticsProvider::new(&settings.io.analytics_path));
    let optimizer = ScheduleOptimizer::new(settings.optimizer.clone(), analytics)
        .with_quality_monitor(QualityMonitor::new(settings.quality.scale_factor));

    let request = OptimizationRequest::new(
        items.clone(),
        constraints.clone(),
        settings.optimizer.strategy,
        Utc::now(),
    );
    let result = optimizer
        .optimize(&request)
        .await
        .context("Optimization run failed")?;

    if result.is_fallback() {
        warn!(
            run_id = %result.run_id,
            "Analytics were unusable; schedule follows the hourly fallback sequence"
        );
    }

    if let Some(profile) = result.profile.as_ref().filter(|p| p.has_data()) {
        if let Some(next) = next_optimal_time(profile, Utc::now(), constraints.timezone) {
            info!(
                best_hour = profile.best_hour(),
                next_optimal_time = %next,
                "Engagement profile summary"
            );
        }
    }

    if result.report.is_valid {
        info!(run_id = %result.run_id, "Schedule satisfies all constraints");
    } else {
        for message in result.report.messages() {
            warn!(run_id = %result.run_id, violation = %message, "Constraint violation");
        }
    }

    let metrics = optimizer.evaluate_quality(result.schedule(), &items, &constraints);
    info!(
        run_id = %result.run_id,
        engagement_alignment = metrics.engagement_alignment,
        time_distribution = metrics.time_distribution,
        board_balance = metrics.board_balance,
        "Schedule quality evaluated"
    );
    if metrics.needs_reoptimization(settings.quality.reoptimize_threshold) {
        warn!(
            threshold = settings.quality.reoptimize_threshold,
            "Schedule quality below threshold, re-optimization recommended"
        );
    }

    let store = JsonFileScheduleStore::new(&settings.io.output_path);
    store
        .save(result.schedule())
        .await
        .with_context(|| format!("Failed to write schedule to {}", store.path().display()))?;

    info!(
        run_id = %result.run_id,
        slots = result.schedule().len(),
        output_path = %store.path().display(),
        "Schedule written"
    );
    Ok(())
}
