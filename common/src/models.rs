use crate::errors::{OptimizerError, TimeParseError};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

// Helper functions for Tz serialization
fn serialize_tz<S>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(tz.name())
}

fn deserialize_tz<'de, D>(deserializer: D) -> Result<Tz, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_timezone(&s).map_err(serde::de::Error::custom)
}

// Helper functions for HH:mm serialization
fn serialize_hhmm<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&time.format("%H:%M").to_string())
}

fn deserialize_hhmm<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_time_of_day(&s).map_err(serde::de::Error::custom)
}

/// Parse an `HH:mm` clock time
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, TimeParseError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| {
        TimeParseError::InvalidTimeOfDay {
            value: value.to_string(),
        }
    })
}

/// Parse an IANA zone identifier such as `America/New_York`
pub fn parse_timezone(value: &str) -> Result<Tz, TimeParseError> {
    Tz::from_str(value.trim()).map_err(|_| TimeParseError::InvalidTimezone(value.to_string()))
}

/// Drop seconds and sub-seconds; windows are compared at minute granularity.
pub(crate) fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

// ============================================================================
// Constraints
// ============================================================================

/// A permitted local-clock publishing window. `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(serialize_with = "serialize_hhmm", deserialize_with = "deserialize_hhmm")]
    pub start: NaiveTime,
    #[serde(serialize_with = "serialize_hhmm", deserialize_with = "deserialize_hhmm")]
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Build a range from two `HH:mm` strings
    pub fn parse(start: &str, end: &str) -> Result<Self, TimeParseError> {
        Ok(Self {
            start: parse_time_of_day(start)?,
            end: parse_time_of_day(end)?,
        })
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Inclusive on both ends, evaluated on the minute-truncated clock time
    pub fn contains(&self, time: NaiveTime) -> bool {
        let time = truncate_to_minute(time);
        if self.wraps_midnight() {
            time >= self.start || time <= self.end
        } else {
            time >= self.start && time <= self.end
        }
    }

    /// Whether `HH:00` lies inside the window
    pub fn contains_hour(&self, hour: u32) -> bool {
        NaiveTime::from_hms_opt(hour, 0, 0).is_some_and(|t| self.contains(t))
    }
}

/// Hard constraints for one optimization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConstraints {
    pub max_items_per_day: u32,
    pub min_interval_minutes: u32,
    pub preferred_time_ranges: Vec<TimeRange>,
    #[serde(serialize_with = "serialize_tz", deserialize_with = "deserialize_tz")]
    pub timezone: Tz,
}

impl ScheduleConstraints {
    /// Reject malformed constraints before any allocation starts
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if self.max_items_per_day == 0 {
            return Err(OptimizerError::InvalidConstraints(
                "maxItemsPerDay must be greater than 0".to_string(),
            ));
        }
        if self.min_interval_minutes == 0 {
            return Err(OptimizerError::InvalidConstraints(
                "minIntervalMinutes must be greater than 0".to_string(),
            ));
        }
        if self.preferred_time_ranges.is_empty() {
            return Err(OptimizerError::InvalidConstraints(
                "preferredTimeRanges must contain at least one range".to_string(),
            ));
        }
        Ok(())
    }

    pub fn min_interval(&self) -> Duration {
        Duration::minutes(i64::from(self.min_interval_minutes))
    }

    /// True when the local clock time falls in any preferred range
    pub fn is_preferred_time(&self, time: NaiveTime) -> bool {
        self.preferred_time_ranges.iter().any(|r| r.contains(time))
    }

    pub fn is_preferred_hour(&self, hour: u32) -> bool {
        self.preferred_time_ranges
            .iter()
            .any(|r| r.contains_hour(hour))
    }

    /// Start of the first declared range, used when rolling over to a new day
    pub fn first_range_start(&self) -> Option<NaiveTime> {
        self.preferred_time_ranges.first().map(|r| r.start)
    }

    /// Earliest range start strictly later than `time` on the same day
    pub fn next_range_start_after(&self, time: NaiveTime) -> Option<NaiveTime> {
        let time = truncate_to_minute(time);
        self.preferred_time_ranges
            .iter()
            .map(|r| r.start)
            .filter(|start| *start > time)
            .min()
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }

    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveTime {
        instant.with_timezone(&self.timezone).time()
    }
}

impl Default for ScheduleConstraints {
    fn default() -> Self {
        Self {
            max_items_per_day: 25,
            min_interval_minutes: 15,
            preferred_time_ranges: vec![TimeRange::new(
                NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
                NaiveTime::from_hms_opt(21, 0, 0).unwrap_or(NaiveTime::MIN),
            )],
            timezone: Tz::UTC,
        }
    }
}

// ============================================================================
// Items and analytics
// ============================================================================

/// A content item awaiting a publish time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingItem {
    pub id: String,
    pub board_ids: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_engagement: Option<f64>,
}

impl PendingItem {
    pub fn new<I, S>(id: impl Into<String>, boards: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            board_ids: boards.into_iter().map(Into::into).collect(),
            estimated_engagement: None,
        }
    }

    pub fn with_engagement(mut self, estimate: f64) -> Self {
        self.estimated_engagement = Some(estimate);
        self
    }
}

/// One historical engagement observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSample {
    pub timestamp: DateTime<Utc>,
    pub impressions: u64,
    pub saves: u64,
    pub clicks: u64,
}

impl AnalyticsSample {
    /// impressions*1 + saves*2 + clicks*3
    pub fn weighted_score(&self) -> f64 {
        self.impressions as f64 + self.saves as f64 * 2.0 + self.clicks as f64 * 3.0
    }
}

/// Inclusive calendar-date window handed to the analytics provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// The `days` calendar days ending at `now`'s UTC date
    pub fn lookback(now: DateTime<Utc>, days: u32) -> Self {
        let end = now.date_naive();
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let date = instant.date_naive();
        date >= self.start && date <= self.end
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// Engagement score per local hour of day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyEngagementProfile {
    pub scores: [f64; 24],
    /// Number of samples that contributed; zero means "no preference"
    #[serde(default)]
    pub sample_count: usize,
}

impl HourlyEngagementProfile {
    pub fn zero() -> Self {
        Self {
            scores: [0.0; 24],
            sample_count: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.sample_count > 0
    }

    pub fn score(&self, hour: u32) -> f64 {
        self.scores.get(hour as usize).copied().unwrap_or(0.0)
    }

    /// Hours sorted by score descending, ties broken by the lower hour
    pub fn ranked_hours(&self) -> Vec<u32> {
        let mut hours: Vec<u32> = (0..24).collect();
        hours.sort_by(|a, b| self.score(*b).total_cmp(&self.score(*a)).then(a.cmp(b)));
        hours
    }

    pub fn best_hour(&self) -> u32 {
        self.ranked_hours().first().copied().unwrap_or(0)
    }

    /// Scores scaled into [0, 1] by the maximum bucket
    pub fn normalized(&self) -> [f64; 24] {
        let max = self.scores.iter().copied().fold(0.0_f64, f64::max);
        if max <= 0.0 {
            return [0.0; 24];
        }
        self.scores.map(|s| s / max)
    }
}

impl Default for HourlyEngagementProfile {
    fn default() -> Self {
        Self::zero()
    }
}

// ============================================================================
// Schedules
// ============================================================================

/// Item id to publish instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule {
    slots: BTreeMap<String, DateTime<Utc>>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item_id: impl Into<String>, at: DateTime<Utc>) {
        self.slots.insert(item_id.into(), at);
    }

    pub fn get(&self, item_id: &str) -> Option<DateTime<Utc>> {
        self.slots.get(item_id).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, DateTime<Utc>)> {
        self.slots.iter().map(|(id, at)| (id.as_str(), *at))
    }

    /// Timestamps ordered ascending
    pub fn sorted_times(&self) -> Vec<DateTime<Utc>> {
        let mut times: Vec<_> = self.slots.values().copied().collect();
        times.sort();
        times
    }

    /// Item count per local calendar date
    pub fn daily_counts(&self, tz: Tz) -> BTreeMap<NaiveDate, u32> {
        let mut counts = BTreeMap::new();
        for at in self.slots.values() {
            *counts.entry(at.with_timezone(&tz).date_naive()).or_insert(0) += 1;
        }
        counts
    }

    /// Pair every slot with its item's boards for quality scoring
    pub fn to_scheduled_items(&self, items: &[PendingItem]) -> Vec<ScheduledItem> {
        let boards: BTreeMap<&str, &BTreeSet<String>> = items
            .iter()
            .map(|item| (item.id.as_str(), &item.board_ids))
            .collect();
        self.iter()
            .map(|(id, at)| ScheduledItem {
                id: id.to_string(),
                scheduled_at: at,
                board_ids: boards.get(id).map(|b| (*b).clone()).unwrap_or_default(),
            })
            .collect()
    }
}

impl FromIterator<(String, DateTime<Utc>)> for Schedule {
    fn from_iter<T: IntoIterator<Item = (String, DateTime<Utc>)>>(iter: T) -> Self {
        Self {
            slots: iter.into_iter().collect(),
        }
    }
}

/// A committed slot with its board associations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledItem {
    pub id: String,
    pub scheduled_at: DateTime<Utc>,
    pub board_ids: BTreeSet<String>,
}

/// Whether an allocation honoured the analytics or fell back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    Optimized,
    /// Constraint-ignorant hourly schedule; re-validate before use
    Fallback,
}

/// Named allocation strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    RankedHours,
    SlotSearch,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::RankedHours => "ranked_hours",
            StrategyKind::SlotSearch => "slot_search",
        }
    }
}
