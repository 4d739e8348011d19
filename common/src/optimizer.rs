// Optimization service: wires profiling, allocation and validation to the
// collaborators for a single run

use crate::allocator::{strategy_for, AllocationOutcome, AllocationRequest};
use crate::config::OptimizerConfig;
use crate::errors::OptimizerError;
use crate::models::{
    HourlyEngagementProfile, PendingItem, Schedule, ScheduleConstraints, StrategyKind,
};
use crate::profiler::EngagementProfiler;
use crate::providers::{AnalyticsProvider, ContentStore, ScheduleStore};
use crate::quality::{QualityMetrics, QualityMonitor};
use crate::telemetry;
use crate::validator::{validate_schedule, ValidationReport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Input for one optimization run
#[derive(Debug, Clone)]
pub struct OptimizationRequest {
    pub items: Vec<PendingItem>,
    pub constraints: ScheduleConstraints,
    pub strategy: StrategyKind,
    /// `now` for ranked-hour allocation, the first candidate slot for slot search
    pub start: DateTime<Utc>,
    /// Previously committed slots; seeds per-day counts for slot search
    pub existing: Schedule,
}

impl OptimizationRequest {
    pub fn new(
        items: Vec<PendingItem>,
        constraints: ScheduleConstraints,
        strategy: StrategyKind,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            items,
            constraints,
            strategy,
            start,
            existing: Schedule::new(),
        }
    }

    pub fn with_existing(mut self, existing: Schedule) -> Self {
        self.existing = existing;
        self
    }

    /// Distinct boards referenced by the items, sorted
    pub fn board_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .flat_map(|item| item.board_ids.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Output of one optimization run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub run_id: Uuid,
    pub outcome: AllocationOutcome,
    pub report: ValidationReport,
    /// Present for ranked-hour runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<HourlyEngagementProfile>,
}

impl OptimizationResult {
    pub fn schedule(&self) -> &Schedule {
        &self.outcome.schedule
    }

    pub fn is_fallback(&self) -> bool {
        self.outcome.is_fallback()
    }
}

/// Schedule optimizer with explicitly injected collaborators
pub struct ScheduleOptimizer {
    config: OptimizerConfig,
    analytics: Arc<dyn AnalyticsProvider>,
    profiler: EngagementProfiler,
    quality: QualityMonitor,
}

impl ScheduleOptimizer {
    pub fn new(config: OptimizerConfig, analytics: Arc<dyn AnalyticsProvider>) -> Self {
        let profiler = EngagementProfiler::new(config.lookback_days, config.analytics_timeout());
        Self {
            config,
            analytics,
            profiler,
            quality: QualityMonitor::default(),
        }
    }

    pub fn with_quality_monitor(mut self, quality: QualityMonitor) -> Self {
        self.quality = quality;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Allocate and validate a schedule.
    ///
    /// Fails only on malformed constraints or an exhausted slot search. An
    /// analytics outage yields a `Fallback` outcome instead.
    #[instrument(
        skip(self, request),
        fields(
            run_id = tracing::field::Empty,
            strategy = request.strategy.as_str(),
            items = request.items.len()
        )
    )]
    pub async fn optimize(
        &self,
        request: &OptimizationRequest,
    ) -> Result<OptimizationResult, OptimizerError> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started = Instant::now();

        request.constraints.validate()?;

        let profile = match request.strategy {
            StrategyKind::RankedHours => Some(
                self.profiler
                    .profile_boards(
                        self.analytics.as_ref(),
                        &request.board_ids(),
                        request.start,
                        request.constraints.timezone,
                    )
                    .await,
            ),
            StrategyKind::SlotSearch => None,
        };

        let empty_profile = HourlyEngagementProfile::zero();
        let allocation = AllocationRequest {
            items: &request.items,
            constraints: &request.constraints,
            start: request.start,
            profile: profile.as_ref().unwrap_or(&empty_profile),
            existing: &request.existing,
        };
        let strategy = strategy_for(
            request.strategy,
            self.config.minute_selection,
            self.config.max_day_steps,
        );
        let outcome = strategy.allocate(&allocation)?;
        let report = validate_schedule(&outcome.schedule, &request.constraints);

        telemetry::record_allocation(
            outcome.strategy,
            outcome.is_fallback(),
            started.elapsed().as_secs_f64(),
        );
        if outcome.is_fallback() {
            warn!(%run_id, "Fallback schedule produced; re-validate before publishing");
        }
        info!(
            %run_id,
            slots = outcome.schedule.len(),
            status = ?outcome.status,
            violations = report.violations.len(),
            "Optimization run complete"
        );

        Ok(OptimizationResult {
            run_id,
            outcome,
            report,
            profile,
        })
    }

    /// Optimize, then hand the schedule to `store`
    #[instrument(skip_all)]
    pub async fn optimize_and_store(
        &self,
        request: &OptimizationRequest,
        store: &dyn ScheduleStore,
    ) -> Result<OptimizationResult, OptimizerError> {
        let result = self.optimize(request).await?;
        store.save(result.schedule()).await?;
        Ok(result)
    }

    /// Read pending items from `content`, then optimize with the configured strategy
    #[instrument(skip_all)]
    pub async fn optimize_pending(
        &self,
        content: &dyn ContentStore,
        constraints: ScheduleConstraints,
        start: DateTime<Utc>,
        existing: Schedule,
    ) -> Result<OptimizationResult, OptimizerError> {
        let items = content.pending_items().await?;
        let request = OptimizationRequest::new(items, constraints, self.config.strategy, start)
            .with_existing(existing);
        self.optimize(&request).await
    }

    /// Advisory quality scores for a committed schedule
    pub fn evaluate_quality(
        &self,
        schedule: &Schedule,
        items: &[PendingItem],
        constraints: &ScheduleConstraints,
    ) -> QualityMetrics {
        self.quality
            .evaluate(&schedule.to_scheduled_items(items), constraints)
    }
}
