// Ranked-hour allocation: cycle items through the best-performing permitted hours

use super::{AllocationOutcome, AllocationRequest, AllocationStrategy};
use crate::errors::OptimizerError;
use crate::models::{
    AllocationStatus, HourlyEngagementProfile, PendingItem, Schedule, ScheduleConstraints,
    StrategyKind,
};
use crate::schedule::local_instant;
use crate::telemetry;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// How the minute inside a chosen hour is picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MinuteSelection {
    /// Always `:00`
    TopOfHour,
    /// Always the given minute (clamped to 0..=59)
    Fixed { minute: u32 },
    /// Uniform in `[0, 59)` from a seeded generator; identical on every call
    Seeded { seed: u64 },
    /// Uniform in `[0, 59)` from entropy; spreads items within the hour
    #[default]
    Random,
}

enum MinutePicker {
    Constant(u32),
    Generator(StdRng),
}

impl MinutePicker {
    fn next_minute(&mut self) -> u32 {
        match self {
            MinutePicker::Constant(minute) => *minute,
            MinutePicker::Generator(rng) => rng.gen_range(0..59),
        }
    }
}

impl MinuteSelection {
    fn picker(&self) -> MinutePicker {
        match *self {
            MinuteSelection::TopOfHour => MinutePicker::Constant(0),
            MinuteSelection::Fixed { minute } => MinutePicker::Constant(minute.min(59)),
            MinuteSelection::Seeded { seed } => MinutePicker::Generator(StdRng::seed_from_u64(seed)),
            MinuteSelection::Random => MinutePicker::Generator(StdRng::from_entropy()),
        }
    }
}

/// Engagement-driven allocator. Best effort: spacing is not enforced, and
/// any internal failure degrades to [`fallback_schedule`].
#[derive(Debug, Clone, Default)]
pub struct RankedHourAllocator {
    minutes: MinuteSelection,
}

impl RankedHourAllocator {
    pub fn new(minutes: MinuteSelection) -> Self {
        Self { minutes }
    }

    /// Assign each item an hour from the profile's permitted ranking.
    ///
    /// Returns `Err` only for malformed constraints. A profile without data,
    /// or constraints that admit no whole hour, produce a `Fallback` outcome.
    #[instrument(skip_all, fields(items = items.len(), tz = %constraints.timezone))]
    pub fn allocate_by_ranked_hours(
        &self,
        items: &[PendingItem],
        constraints: &ScheduleConstraints,
        profile: &HourlyEngagementProfile,
        now: DateTime<Utc>,
    ) -> Result<AllocationOutcome, OptimizerError> {
        constraints.validate()?;

        match self.rank_and_assign(items, constraints, profile, now) {
            Ok(schedule) => Ok(AllocationOutcome {
                schedule,
                status: AllocationStatus::Optimized,
                strategy: StrategyKind::RankedHours,
            }),
            Err(e) => {
                warn!(error = %e, "Ranked-hour allocation failed, using fallback schedule");
                telemetry::record_fallback(StrategyKind::RankedHours);
                Ok(AllocationOutcome {
                    schedule: fallback_schedule(items, now),
                    status: AllocationStatus::Fallback,
                    strategy: StrategyKind::RankedHours,
                })
            }
        }
    }

    fn rank_and_assign(
        &self,
        items: &[PendingItem],
        constraints: &ScheduleConstraints,
        profile: &HourlyEngagementProfile,
        now: DateTime<Utc>,
    ) -> Result<Schedule, OptimizerError> {
        if !profile.has_data() {
            return Err(OptimizerError::AnalyticsUnavailable(
                "engagement profile has no samples".to_string(),
            ));
        }

        let hours: Vec<u32> = profile
            .ranked_hours()
            .into_iter()
            .filter(|hour| constraints.is_preferred_hour(*hour))
            .collect();
        if hours.is_empty() {
            return Err(OptimizerError::NoEligibleHours);
        }
        debug!(?hours, "Permitted hours ranked by engagement");

        let tz = constraints.timezone;
        let mut picker = self.minutes.picker();
        let mut current_date = now.with_timezone(&tz).date_naive();
        let mut scheduled_today = 0u32;
        let mut schedule = Schedule::new();

        for (i, item) in items.iter().enumerate() {
            if scheduled_today >= constraints.max_items_per_day {
                current_date = current_date.succ_opt().ok_or_else(|| {
                    OptimizerError::UnresolvableLocalTime(current_date.to_string())
                })?;
                scheduled_today = 0;
            }

            let hour = hours[i % hours.len()];
            let minute = picker.next_minute();
            let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
                OptimizerError::UnresolvableLocalTime(format!("{hour:02}:{minute:02}"))
            })?;

            let unresolvable =
                || OptimizerError::UnresolvableLocalTime(format!("{current_date} {time}"));
            let mut at = local_instant(tz, current_date, time).ok_or_else(unresolvable)?;
            if at <= now {
                let next_day = current_date.succ_opt().ok_or_else(unresolvable)?;
                at = local_instant(tz, next_day, time).ok_or_else(unresolvable)?;
            }

            schedule.insert(item.id.clone(), at);
            scheduled_today += 1;
        }

        Ok(schedule)
    }
}

impl AllocationStrategy for RankedHourAllocator {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RankedHours
    }

    fn allocate(&self, request: &AllocationRequest<'_>) -> Result<AllocationOutcome, OptimizerError> {
        self.allocate_by_ranked_hours(
            request.items,
            request.constraints,
            request.profile,
            request.start,
        )
    }
}

/// Ranked-hour allocation with production minute selection
pub fn allocate_by_ranked_hours(
    items: &[PendingItem],
    constraints: &ScheduleConstraints,
    profile: &HourlyEngagementProfile,
    now: DateTime<Utc>,
) -> Result<AllocationOutcome, OptimizerError> {
    RankedHourAllocator::default().allocate_by_ranked_hours(items, constraints, profile, now)
}

/// Item `i` at `now + (i + 1)` hours, ignoring all constraints
pub fn fallback_schedule(items: &[PendingItem], now: DateTime<Utc>) -> Schedule {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| (item.id.clone(), now + Duration::hours(i as i64 + 1)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeRange;
    use chrono::{NaiveDate, TimeZone, Timelike};
    use chrono_tz::Tz;

    fn items(n: usize) -> Vec<PendingItem> {
        (0..n)
            .map(|i| PendingItem::new(format!("pin-{i}"), ["board"]))
            .collect()
    }

    fn profile_with(scores: &[(usize, f64)]) -> HourlyEngagementProfile {
        let mut profile = HourlyEngagementProfile::zero();
        for (hour, score) in scores {
            profile.scores[*hour] = *score;
        }
        profile.sample_count = scores.len().max(1);
        profile
    }

    fn constraints(ranges: &[(&str, &str)], max_per_day: u32) -> ScheduleConstraints {
        ScheduleConstraints {
            max_items_per_day: max_per_day,
            min_interval_minutes: 30,
            preferred_time_ranges: ranges
                .iter()
                .map(|(s, e)| TimeRange::parse(s, e).unwrap())
                .collect(),
            timezone: Tz::UTC,
        }
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_items_cycle_through_ranked_permitted_hours() {
        let allocator = RankedHourAllocator::new(MinuteSelection::TopOfHour);
        let profile = profile_with(&[(20, 50.0), (10, 40.0), (3, 100.0), (14, 30.0)]);
        let constraints = constraints(&[("09:00", "21:00")], 10);
        let now = at(3, 6, 0);

        let outcome = allocator
            .allocate_by_ranked_hours(&items(5), &constraints, &profile, now)
            .unwrap();

        assert_eq!(outcome.status, AllocationStatus::Optimized);
        // Hour 3 is excluded by the window; remaining zero-score hours follow by index
        assert_eq!(outcome.schedule.get("pin-0"), Some(at(3, 20, 0)));
        assert_eq!(outcome.schedule.get("pin-1"), Some(at(3, 10, 0)));
        assert_eq!(outcome.schedule.get("pin-2"), Some(at(3, 14, 0)));
        assert_eq!(outcome.schedule.get("pin-3"), Some(at(3, 9, 0)));
        assert_eq!(outcome.schedule.get("pin-4"), Some(at(3, 11, 0)));
    }

    #[test]
    fn test_daily_cap_rolls_to_next_day() {
        let allocator = RankedHourAllocator::new(MinuteSelection::TopOfHour);
        let profile = profile_with(&[(12, 10.0), (13, 5.0)]);
        let constraints = constraints(&[("12:00", "13:00")], 2);
        let now = at(3, 6, 0);

        let outcome = allocator
            .allocate_by_ranked_hours(&items(4), &constraints, &profile, now)
            .unwrap();

        assert_eq!(outcome.schedule.get("pin-0"), Some(at(3, 12, 0)));
        assert_eq!(outcome.schedule.get("pin-1"), Some(at(3, 13, 0)));
        assert_eq!(outcome.schedule.get("pin-2"), Some(at(4, 12, 0)));
        assert_eq!(outcome.schedule.get("pin-3"), Some(at(4, 13, 0)));
    }

    #[test]
    fn test_past_times_move_one_day_forward() {
        let allocator = RankedHourAllocator::new(MinuteSelection::Fixed { minute: 15 });
        let profile = profile_with(&[(9, 10.0), (18, 5.0)]);
        let constraints = constraints(&[("09:00", "09:00"), ("18:00", "18:00")], 10);
        let now = at(3, 12, 0);

        let outcome = allocator
            .allocate_by_ranked_hours(&items(2), &constraints, &profile, now)
            .unwrap();

        assert_eq!(outcome.schedule.get("pin-0"), Some(at(4, 9, 15)));
        assert_eq!(outcome.schedule.get("pin-1"), Some(at(3, 18, 15)));
    }

    #[test]
    fn test_wraparound_range_filters_hours() {
        let allocator = RankedHourAllocator::new(MinuteSelection::TopOfHour);
        let profile = profile_with(&[(12, 100.0), (23, 10.0), (1, 5.0)]);
        let constraints = constraints(&[("22:00", "02:00")], 10);
        let now = at(3, 6, 0);

        let outcome = allocator
            .allocate_by_ranked_hours(&items(2), &constraints, &profile, now)
            .unwrap();

        assert_eq!(outcome.schedule.get("pin-0"), Some(at(3, 23, 0)));
        assert_eq!(outcome.schedule.get("pin-1"), Some(at(4, 1, 0)));
    }

    #[test]
    fn test_profile_without_data_falls_back() {
        let now = at(3, 6, 30);
        let outcome = RankedHourAllocator::new(MinuteSelection::TopOfHour)
            .allocate_by_ranked_hours(
                &items(3),
                &constraints(&[("09:00", "17:00")], 10),
                &HourlyEngagementProfile::zero(),
                now,
            )
            .unwrap();

        assert!(outcome.is_fallback());
        assert_eq!(outcome.schedule.get("pin-0"), Some(at(3, 7, 30)));
        assert_eq!(outcome.schedule.get("pin-1"), Some(at(3, 8, 30)));
        assert_eq!(outcome.schedule.get("pin-2"), Some(at(3, 9, 30)));
    }

    #[test]
    fn test_no_whole_hour_in_window_falls_back() {
        let outcome = RankedHourAllocator::new(MinuteSelection::TopOfHour)
            .allocate_by_ranked_hours(
                &items(1),
                &constraints(&[("09:10", "09:50")], 10),
                &profile_with(&[(9, 1.0)]),
                at(3, 6, 0),
            )
            .unwrap();
        assert!(outcome.is_fallback());
    }

    #[test]
    fn test_invalid_constraints_rejected() {
        let result = allocate_by_ranked_hours(
            &items(1),
            &constraints(&[("09:00", "17:00")], 0),
            &profile_with(&[(9, 1.0)]),
            at(3, 6, 0),
        );
        assert!(matches!(result, Err(OptimizerError::InvalidConstraints(_))));
    }

    #[test]
    fn test_seeded_minutes_are_reproducible_and_bounded() {
        let allocator = RankedHourAllocator::new(MinuteSelection::Seeded { seed: 7 });
        let profile = profile_with(&[(10, 1.0)]);
        let constraints = constraints(&[("00:00", "23:59")], 100);
        let now = at(3, 0, 0);

        let first = allocator
            .allocate_by_ranked_hours(&items(20), &constraints, &profile, now)
            .unwrap();
        let second = allocator
            .allocate_by_ranked_hours(&items(20), &constraints, &profile, now)
            .unwrap();

        assert_eq!(first, second);
        for (_, at) in first.schedule.iter() {
            assert!(at.minute() < 59);
            assert!(at > now);
        }
    }

    #[test]
    fn test_local_timezone_hours() {
        let allocator = RankedHourAllocator::new(MinuteSelection::TopOfHour);
        let profile = profile_with(&[(9, 1.0)]);
        let mut constraints = constraints(&[("09:00", "17:00")], 5);
        constraints.timezone = chrono_tz::Asia::Ho_Chi_Minh;
        // 2024-06-03 00:00 UTC is 07:00 local
        let outcome = allocator
            .allocate_by_ranked_hours(&items(1), &constraints, &profile, at(3, 0, 0))
            .unwrap();
        let slot = outcome.schedule.get("pin-0").unwrap();
        let local = slot.with_timezone(&constraints.timezone);
        assert_eq!(local.hour(), 9);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
    }
}
