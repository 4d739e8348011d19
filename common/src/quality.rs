// Schedule quality monitoring: advisory 0-100 health scores

use crate::models::{ScheduleConstraints, ScheduledItem};
use crate::telemetry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Default divisor for millisecond gap deviation per item
pub const DEFAULT_SCALE_FACTOR: f64 = 1_000_000.0;

/// Default minimum acceptable score before re-optimization is suggested
pub const DEFAULT_REOPTIMIZE_THRESHOLD: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub engagement_alignment: f64,
    pub time_distribution: f64,
    pub board_balance: f64,
}

impl QualityMetrics {
    pub fn perfect() -> Self {
        Self {
            engagement_alignment: 100.0,
            time_distribution: 100.0,
            board_balance: 100.0,
        }
    }

    /// True when any score drops below `threshold`
    pub fn needs_reoptimization(&self, threshold: f64) -> bool {
        self.engagement_alignment < threshold
            || self.time_distribution < threshold
            || self.board_balance < threshold
    }
}

/// Computes quality metrics for a committed schedule
#[derive(Debug, Clone)]
pub struct QualityMonitor {
    scale_factor: f64,
}

impl Default for QualityMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_SCALE_FACTOR)
    }
}

impl QualityMonitor {
    pub fn new(scale_factor: f64) -> Self {
        Self { scale_factor }
    }

    #[instrument(skip_all, fields(items = items.len()))]
    pub fn evaluate(&self, items: &[ScheduledItem], constraints: &ScheduleConstraints) -> QualityMetrics {
        if items.is_empty() {
            return QualityMetrics::perfect();
        }

        let metrics = QualityMetrics {
            engagement_alignment: engagement_alignment(items, constraints),
            time_distribution: self.time_distribution(items, constraints),
            board_balance: board_balance(items),
        };
        debug!(?metrics, "Schedule quality evaluated");
        telemetry::record_quality(&metrics);
        metrics
    }

    /// `100 - sum(|gap - minInterval|) / (n * scale)`, gaps in milliseconds
    pub fn time_distribution(&self, items: &[ScheduledItem], constraints: &ScheduleConstraints) -> f64 {
        if items.is_empty() {
            return 100.0;
        }
        let mut times: Vec<_> = items.iter().map(|i| i.scheduled_at).collect();
        times.sort();

        let ideal_gap_ms = constraints.min_interval().num_milliseconds() as f64;
        let total_gap_variance: f64 = times
            .windows(2)
            .map(|pair| ((pair[1] - pair[0]).num_milliseconds() as f64 - ideal_gap_ms).abs())
            .sum();

        (100.0 - total_gap_variance / (items.len() as f64 * self.scale_factor)).max(0.0)
    }
}

/// Share of items whose local clock time lies in a preferred range, as a percentage
pub fn engagement_alignment(items: &[ScheduledItem], constraints: &ScheduleConstraints) -> f64 {
    if items.is_empty() {
        return 100.0;
    }
    let aligned = items
        .iter()
        .filter(|i| constraints.is_preferred_time(constraints.local_time(i.scheduled_at)))
        .count();
    100.0 * aligned as f64 / items.len() as f64
}

/// `100 - 10 * stddev(items per board)`; multi-board items count on each board
pub fn board_balance(items: &[ScheduledItem]) -> f64 {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for item in items {
        for board in &item.board_ids {
            *counts.entry(board.as_str()).or_insert(0) += 1;
        }
    }
    if counts.is_empty() {
        return 100.0;
    }

    let n = counts.len() as f64;
    let mean = counts.values().map(|c| f64::from(*c)).sum::<f64>() / n;
    let variance = counts
        .values()
        .map(|c| (f64::from(*c) - mean).powi(2))
        .sum::<f64>()
        / n;

    (100.0 - variance.sqrt() * 10.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeRange;
    use chrono::{DateTime, TimeZone, Utc};
    use chrono_tz::Tz;

    fn constraints(interval: u32) -> ScheduleConstraints {
        ScheduleConstraints {
            max_items_per_day: 10,
            min_interval_minutes: interval,
            preferred_time_ranges: vec![TimeRange::parse("09:00", "17:00").unwrap()],
            timezone: Tz::UTC,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, hour, minute, 0).unwrap()
    }

    fn item(id: &str, scheduled_at: DateTime<Utc>, boards: &[&str]) -> ScheduledItem {
        ScheduledItem {
            id: id.to_string(),
            scheduled_at,
            board_ids: boards.iter().map(|b| b.to_string()).collect(),
        }
    }

    #[test]
    fn test_empty_schedule_scores_perfect() {
        let metrics = QualityMonitor::default().evaluate(&[], &constraints(30));
        assert_eq!(metrics, QualityMetrics::perfect());
        assert!(!metrics.needs_reoptimization(DEFAULT_REOPTIMIZE_THRESHOLD));
    }

    #[test]
    fn test_engagement_alignment_fraction() {
        let items = vec![
            item("a", at(9, 0), &["x"]),
            item("b", at(12, 0), &["x"]),
            item("c", at(20, 0), &["x"]),
            item("d", at(23, 0), &["x"]),
        ];
        assert_eq!(engagement_alignment(&items, &constraints(30)), 50.0);
    }

    #[test]
    fn test_perfect_spacing_scores_full_distribution() {
        let items = vec![
            item("a", at(9, 0), &["x"]),
            item("b", at(9, 30), &["x"]),
            item("c", at(10, 0), &["x"]),
        ];
        let score = QualityMonitor::default().time_distribution(&items, &constraints(30));
        assert_eq!(score, 100.0);
    }

    #[test]
    fn test_gap_deviation_lowers_distribution() {
        // Gap of 90 minutes against an ideal 30: deviation 3,600,000 ms over 2 items
        let items = vec![item("a", at(9, 0), &["x"]), item("b", at(10, 30), &["x"])];
        let score = QualityMonitor::default().time_distribution(&items, &constraints(30));
        assert!((score - 98.2).abs() < 1e-9);

        let strict = QualityMonitor::new(1_000.0).time_distribution(&items, &constraints(30));
        assert_eq!(strict, 0.0);
    }

    #[test]
    fn test_board_balance_even_and_skewed() {
        let even = vec![item("a", at(9, 0), &["x"]), item("b", at(10, 0), &["y"])];
        assert_eq!(board_balance(&even), 100.0);

        // x: 3, y: 1 -> mean 2, stddev 1
        let skewed = vec![
            item("a", at(9, 0), &["x", "y"]),
            item("b", at(10, 0), &["x"]),
            item("c", at(11, 0), &["x"]),
        ];
        assert!((board_balance(&skewed) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_board_balance_never_negative() {
        let mut items: Vec<ScheduledItem> = (0..40)
            .map(|i| item(&format!("p{i}"), at(9, 0), &["busy"]))
            .collect();
        items.push(item("q", at(9, 0), &["quiet"]));
        assert_eq!(board_balance(&items), 0.0);
    }

    #[test]
    fn test_needs_reoptimization() {
        let metrics = QualityMetrics {
            engagement_alignment: 100.0,
            time_distribution: 45.0,
            board_balance: 100.0,
        };
        assert!(metrics.needs_reoptimization(60.0));
        assert!(!metrics.needs_reoptimization(40.0));
    }
}
