// Local-time calculations shared by the allocators
//
// Every allocator works on local calendar dates and clock times in the
// constraints' timezone, then stores UTC instants. These helpers resolve local
// wall-clock values across DST transitions.

use crate::models::HourlyEngagementProfile;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Resolve a local wall-clock time to an instant.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a
/// DST gap are pushed forward by the gap, at most one hour.
pub fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => match tz.from_local_datetime(&(naive + Duration::hours(1))) {
            LocalResult::Single(dt) => Some(dt),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => None,
        },
    }
}

/// Instant for `time` on local `date` in `tz`
pub fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    resolve_local(tz, date.and_time(time)).map(|dt| dt.with_timezone(&Utc))
}

/// Like [`local_instant`], but an ambiguous time resolves to its later
/// occurrence when the earlier one falls before `floor`
pub fn local_instant_not_before(
    tz: Tz,
    date: NaiveDate,
    time: NaiveTime,
    floor: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&date.and_time(time)) {
        LocalResult::Ambiguous(earliest, latest) => {
            let earliest = earliest.with_timezone(&Utc);
            if earliest >= floor {
                Some(earliest)
            } else {
                Some(latest.with_timezone(&Utc))
            }
        }
        _ => local_instant(tz, date, time),
    }
}

/// Next occurrence of the profile's best hour (minute 0) after `now`.
///
/// Uses `now`'s local date; rolls to the following day when that time has
/// already passed.
pub fn next_optimal_time(
    profile: &HourlyEngagementProfile,
    now: DateTime<Utc>,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    let hour = profile.best_hour();
    let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
    let today = now.with_timezone(&tz).date_naive();
    let candidate = local_instant(tz, today, time)?;
    if candidate < now {
        local_instant(tz, today.succ_opt()?, time)
    } else {
        Some(candidate)
    }
}
