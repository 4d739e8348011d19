// Schedule validation: report every constraint violation as data

use crate::models::{Schedule, ScheduleConstraints};
use crate::telemetry;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{instrument, warn};

/// One broken constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleViolation {
    DailyLimitExceeded {
        date: NaiveDate,
        count: u32,
        limit: u32,
    },
    IntervalTooShort {
        date: NaiveDate,
        interval_minutes: i64,
        minimum_minutes: u32,
    },
    OutsidePreferredRanges {
        date: NaiveDate,
        local_time: String,
    },
}

impl fmt::Display for ScheduleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleViolation::DailyLimitExceeded { date, count, limit } => write!(
                f,
                "Date {date} has {count} items, exceeding limit of {limit}"
            ),
            ScheduleViolation::IntervalTooShort {
                date,
                interval_minutes,
                minimum_minutes,
            } => write!(
                f,
                "Interval between items on {date} is {interval_minutes} minutes, below minimum {minimum_minutes}"
            ),
            ScheduleViolation::OutsidePreferredRanges { date, local_time } => write!(
                f,
                "Item scheduled at {local_time} on {date} is outside preferred time ranges"
            ),
        }
    }
}

/// Full validation result; never short-circuited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub violations: Vec<ScheduleViolation>,
}

impl ValidationReport {
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

/// Check a schedule against the daily cap, spacing and preferred windows.
///
/// Dates are local to the constraints' timezone and reported ascending. Per
/// date the order is: cap, then spacing pairs, then out-of-window times.
#[instrument(skip_all, fields(slots = schedule.len(), tz = %constraints.timezone))]
pub fn validate_schedule(schedule: &Schedule, constraints: &ScheduleConstraints) -> ValidationReport {
    let tz = constraints.timezone;
    let mut by_date: BTreeMap<NaiveDate, Vec<DateTime<Utc>>> = BTreeMap::new();
    for (_, at) in schedule.iter() {
        by_date
            .entry(at.with_timezone(&tz).date_naive())
            .or_default()
            .push(at);
    }

    let mut violations = Vec::new();
    for (date, mut times) in by_date {
        let count = times.len() as u32;
        if count > constraints.max_items_per_day {
            violations.push(ScheduleViolation::DailyLimitExceeded {
                date,
                count,
                limit: constraints.max_items_per_day,
            });
        }

        times.sort();
        for pair in times.windows(2) {
            let interval = pair[1] - pair[0];
            if interval < constraints.min_interval() {
                violations.push(ScheduleViolation::IntervalTooShort {
                    date,
                    interval_minutes: interval.num_minutes(),
                    minimum_minutes: constraints.min_interval_minutes,
                });
            }
        }

        for at in &times {
            let local = at.with_timezone(&tz).time();
            if !constraints.is_preferred_time(local) {
                violations.push(ScheduleViolation::OutsidePreferredRanges {
                    date,
                    local_time: local.format("%H:%M").to_string(),
                });
            }
        }
    }

    if !violations.is_empty() {
        warn!(violations = violations.len(), "Schedule violates constraints");
        telemetry::record_violations(violations.len() as u64);
    }

    ValidationReport {
        is_valid: violations.is_empty(),
        violations,
    }
}
