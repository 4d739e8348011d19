// Engagement profiling: historical samples to an hourly score table

use crate::models::{AnalyticsSample, DateRange, HourlyEngagementProfile};
use crate::providers::AnalyticsProvider;
use crate::telemetry;
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Weight of the engagement rate in a slot insight score
const ENGAGEMENT_RATE_WEIGHT: f64 = 0.7;
/// Weight of relative impression volume in a slot insight score
const IMPRESSION_WEIGHT: f64 = 0.3;

/// Accumulate `impressions + 2*saves + 3*clicks` per local hour of day
pub fn build_profile(samples: &[AnalyticsSample], tz: Tz) -> HourlyEngagementProfile {
    let mut profile = HourlyEngagementProfile::zero();
    for sample in samples {
        let hour = sample.timestamp.with_timezone(&tz).hour() as usize;
        profile.scores[hour] += sample.weighted_score();
    }
    profile.sample_count = samples.len();
    profile
}

/// Per-hour engagement rate and impression volume for observed hours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlotInsight {
    pub hour: u32,
    /// Sum of `(saves + clicks) / impressions`, normalized by days of data
    pub engagement_rate: f64,
    pub total_impressions: u64,
    pub score: f64,
}

/// Break samples down into per-hour insights, ordered by hour.
///
/// Rates are normalized by `samples / 24`, an approximation of the number of
/// days observed. Samples with zero impressions contribute a rate of 0.
pub fn analyze_time_slots(samples: &[AnalyticsSample], tz: Tz) -> Vec<TimeSlotInsight> {
    if samples.is_empty() {
        return Vec::new();
    }
    let days = samples.len() as f64 / 24.0;
    let mut slots: [Option<(f64, u64)>; 24] = [None; 24];

    for sample in samples {
        let hour = sample.timestamp.with_timezone(&tz).hour() as usize;
        let rate = if sample.impressions == 0 {
            0.0
        } else {
            (sample.saves + sample.clicks) as f64 / sample.impressions as f64
        };
        let slot = slots[hour].get_or_insert((0.0, 0));
        slot.0 += rate / days;
        slot.1 += sample.impressions;
    }

    let max_impressions = slots
        .iter()
        .flatten()
        .map(|(_, impressions)| *impressions)
        .max()
        .unwrap_or(0);

    slots
        .iter()
        .enumerate()
        .filter_map(|(hour, slot)| {
            slot.map(|(engagement_rate, total_impressions)| {
                let volume = if max_impressions == 0 {
                    0.0
                } else {
                    total_impressions as f64 / max_impressions as f64
                };
                TimeSlotInsight {
                    hour: hour as u32,
                    engagement_rate,
                    total_impressions,
                    score: engagement_rate * ENGAGEMENT_RATE_WEIGHT + volume * IMPRESSION_WEIGHT,
                }
            })
        })
        .collect()
}

/// Fetches analytics for a set of boards and folds them into one profile
#[derive(Debug, Clone)]
pub struct EngagementProfiler {
    lookback_days: u32,
    timeout: Duration,
}

impl Default for EngagementProfiler {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            timeout: Duration::from_secs(5),
        }
    }
}

impl EngagementProfiler {
    pub fn new(lookback_days: u32, timeout: Duration) -> Self {
        Self {
            lookback_days,
            timeout,
        }
    }

    /// Build a profile from every board's samples over the lookback window.
    ///
    /// Never fails: a board whose fetch errors or exceeds the timeout is
    /// skipped, and no samples at all yields the all-zero profile.
    #[instrument(skip(self, provider, board_ids), fields(boards = board_ids.len(), tz = %tz))]
    pub async fn profile_boards(
        &self,
        provider: &dyn AnalyticsProvider,
        board_ids: &[String],
        now: DateTime<Utc>,
        tz: Tz,
    ) -> HourlyEngagementProfile {
        let range = DateRange::lookback(now, self.lookback_days);
        let fetches = board_ids.iter().map(|board_id| async move {
            match tokio::time::timeout(self.timeout, provider.fetch(board_id, range)).await {
                Ok(Ok(samples)) => Some(samples),
                Ok(Err(e)) => {
                    warn!(board_id = %board_id, error = %e, "Analytics fetch failed");
                    None
                }
                Err(_) => {
                    warn!(
                        board_id = %board_id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Analytics fetch timed out"
                    );
                    None
                }
            }
        });

        let results = join_all(fetches).await;
        let failed = results.iter().filter(|r| r.is_none()).count();
        let samples: Vec<AnalyticsSample> = results.into_iter().flatten().flatten().collect();

        if failed > 0 {
            telemetry::record_analytics_failures(failed as u64);
        }
        if samples.is_empty() {
            warn!(failed_boards = failed, "No analytics samples available, using zero profile");
            return HourlyEngagementProfile::zero();
        }

        let profile = build_profile(&samples, tz);
        debug!(
            samples = profile.sample_count,
            best_hour = profile.best_hour(),
            "Engagement profile built"
        );
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::providers::InMemoryAnalyticsProvider;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn sample(hour: u32, impressions: u64, saves: u64, clicks: u64) -> AnalyticsSample {
        AnalyticsSample {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 20, hour, 0, 0).unwrap(),
            impressions,
            saves,
            clicks,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_weighted_score_accumulates_per_hour() {
        let samples = vec![sample(9, 100, 10, 5), sample(9, 50, 0, 0), sample(14, 1, 1, 1)];
        let profile = build_profile(&samples, Tz::UTC);
        assert_eq!(profile.scores[9], 100.0 + 20.0 + 15.0 + 50.0);
        assert_eq!(profile.scores[14], 6.0);
        assert_eq!(profile.scores[0], 0.0);
        assert_eq!(profile.sample_count, 3);
    }

    #[test]
    fn test_profile_uses_target_timezone() {
        // 09:00 UTC is 16:00 in Ho Chi Minh City (UTC+7)
        let profile = build_profile(&[sample(9, 10, 0, 0)], chrono_tz::Asia::Ho_Chi_Minh);
        assert_eq!(profile.scores[16], 10.0);
        assert_eq!(profile.scores[9], 0.0);
    }

    #[test]
    fn test_empty_samples_yield_zero_profile() {
        let profile = build_profile(&[], Tz::UTC);
        assert!(!profile.has_data());
        assert!(profile.scores.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_analyze_time_slots() {
        let samples = vec![sample(9, 100, 10, 10), sample(9, 100, 0, 0), sample(20, 50, 5, 0)];
        let insights = analyze_time_slots(&samples, Tz::UTC);
        assert_eq!(insights.len(), 2);

        let nine = &insights[0];
        assert_eq!(nine.hour, 9);
        assert_eq!(nine.total_impressions, 200);
        // days = 3 / 24 = 0.125; rate = 0.2 / 0.125
        assert!((nine.engagement_rate - 1.6).abs() < 1e-9);
        assert!((nine.score - (1.6 * 0.7 + 0.3)).abs() < 1e-9);

        let twenty = &insights[1];
        assert_eq!(twenty.hour, 20);
        assert!((twenty.score - (0.8 * 0.7 + 0.25 * 0.3)).abs() < 1e-9);
    }

    #[test]
    fn test_analyze_time_slots_zero_impressions() {
        let insights = analyze_time_slots(&[sample(3, 0, 4, 4)], Tz::UTC);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].engagement_rate, 0.0);
        assert_eq!(insights[0].score, 0.0);
    }

    struct FailingProvider;

    #[async_trait]
    impl AnalyticsProvider for FailingProvider {
        async fn fetch(
            &self,
            _board_id: &str,
            _range: DateRange,
        ) -> Result<Vec<AnalyticsSample>, ProviderError> {
            Err(ProviderError::Unavailable("upstream 503".to_string()))
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl AnalyticsProvider for SlowProvider {
        async fn fetch(
            &self,
            _board_id: &str,
            _range: DateRange,
        ) -> Result<Vec<AnalyticsSample>, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![sample(9, 1, 1, 1)])
        }
    }

    #[tokio::test]
    async fn test_failing_provider_yields_zero_profile() {
        let profiler = EngagementProfiler::default();
        let profile = profiler
            .profile_boards(&FailingProvider, &["b1".to_string()], now(), Tz::UTC)
            .await;
        assert_eq!(profile, HourlyEngagementProfile::zero());
    }

    #[tokio::test]
    async fn test_timeout_yields_zero_profile() {
        let profiler = EngagementProfiler::new(30, Duration::from_millis(20));
        let profile = profiler
            .profile_boards(&SlowProvider, &["b1".to_string()], now(), Tz::UTC)
            .await;
        assert!(!profile.has_data());
    }

    #[tokio::test]
    async fn test_profile_merges_boards() {
        let provider = InMemoryAnalyticsProvider::new()
            .with_board("b1", vec![sample(9, 10, 0, 0)])
            .with_board("b2", vec![sample(9, 5, 0, 0), sample(18, 1, 0, 0)]);
        let profiler = EngagementProfiler::default();
        let boards = vec!["b1".to_string(), "b2".to_string(), "b3".to_string()];
        let profile = profiler.profile_boards(&provider, &boards, now(), Tz::UTC).await;
        assert_eq!(profile.scores[9], 15.0);
        assert_eq!(profile.scores[18], 1.0);
        assert_eq!(profile.sample_count, 3);
    }
}
