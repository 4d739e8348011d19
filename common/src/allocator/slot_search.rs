// Constraint-walking allocation: resolve a moving cursor to the next slot that
// satisfies the daily cap and the preferred windows

use super::{AllocationOutcome, AllocationRequest, AllocationStrategy};
use crate::errors::OptimizerError;
use crate::models::{AllocationStatus, PendingItem, Schedule, ScheduleConstraints, StrategyKind};
use crate::schedule::local_instant_not_before;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Day advances allowed while resolving a single slot
pub const DEFAULT_MAX_DAY_STEPS: u32 = 2 * 365;

/// Strict allocator: every slot it returns passes [`crate::validator::validate_schedule`]
/// (for an empty `existing` schedule).
#[derive(Debug, Clone)]
pub struct SlotSearchAllocator {
    max_day_steps: u32,
}

impl Default for SlotSearchAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DAY_STEPS)
    }
}

impl SlotSearchAllocator {
    pub fn new(max_day_steps: u32) -> Self {
        Self { max_day_steps }
    }

    /// Assign slots in engagement order, starting at `start_time`.
    ///
    /// `existing` only seeds the per-day counts; its slots are not spaced
    /// against.
    #[instrument(skip_all, fields(items = items.len(), start = %start_time, tz = %constraints.timezone))]
    pub fn allocate_by_slot_search(
        &self,
        items: &[PendingItem],
        start_time: DateTime<Utc>,
        existing: &Schedule,
        constraints: &ScheduleConstraints,
    ) -> Result<AllocationOutcome, OptimizerError> {
        constraints.validate()?;

        let mut daily_counts = existing.daily_counts(constraints.timezone);
        let mut cursor = start_time;
        let mut schedule = Schedule::new();

        for item in order_by_engagement(items) {
            cursor = self.next_available_slot(cursor, &daily_counts, constraints, &item.id)?;
            schedule.insert(item.id.clone(), cursor);
            *daily_counts.entry(constraints.local_date(cursor)).or_insert(0) += 1;
            debug!(item_id = %item.id, slot = %cursor, "Slot assigned");
            cursor += constraints.min_interval();
        }

        Ok(AllocationOutcome {
            schedule,
            status: AllocationStatus::Optimized,
            strategy: StrategyKind::SlotSearch,
        })
    }

    /// Earliest instant at or after `cursor` on a day below the cap and inside
    /// a preferred window.
    fn next_available_slot(
        &self,
        cursor: DateTime<Utc>,
        daily_counts: &BTreeMap<NaiveDate, u32>,
        constraints: &ScheduleConstraints,
        item_id: &str,
    ) -> Result<DateTime<Utc>, OptimizerError> {
        let tz = constraints.timezone;
        let first_start = constraints.first_range_start().ok_or_else(|| {
            OptimizerError::InvalidConstraints("preferredTimeRanges is empty".to_string())
        })?;
        let resolve = |date: NaiveDate, time: NaiveTime, floor: DateTime<Utc>| {
            local_instant_not_before(tz, date, time, floor)
                .ok_or_else(|| OptimizerError::UnresolvableLocalTime(format!("{date} {time}")))
        };
        let exhausted = || OptimizerError::SlotSearchExhausted {
            item_id: item_id.to_string(),
            day_steps: self.max_day_steps,
        };

        let mut slot = cursor;
        let mut day_steps = 0u32;
        // Same-day jumps only move to a later range start, so each day needs
        // at most one step per range plus the roll-over.
        let max_iterations = (self.max_day_steps as usize + 1)
            * (constraints.preferred_time_ranges.len() + 2);

        for _ in 0..max_iterations {
            let local = slot.with_timezone(&tz);
            let date = local.date_naive();
            let time = local.time();

            let booked = daily_counts.get(&date).copied().unwrap_or(0);
            let next_start = if booked >= constraints.max_items_per_day {
                None
            } else if constraints.is_preferred_time(time) {
                return Ok(slot);
            } else {
                constraints.next_range_start_after(time)
            };

            slot = match next_start {
                Some(start) => resolve(date, start, slot)?,
                None => {
                    day_steps += 1;
                    if day_steps > self.max_day_steps {
                        return Err(exhausted());
                    }
                    let next_day = date.succ_opt().ok_or_else(exhausted)?;
                    resolve(next_day, first_start, slot)?
                }
            };
        }

        Err(exhausted())
    }
}

impl AllocationStrategy for SlotSearchAllocator {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SlotSearch
    }

    fn allocate(&self, request: &AllocationRequest<'_>) -> Result<AllocationOutcome, OptimizerError> {
        self.allocate_by_slot_search(
            request.items,
            request.start,
            request.existing,
            request.constraints,
        )
    }
}

/// Slot-search allocation with the default day-step cap
pub fn allocate_by_slot_search(
    items: &[PendingItem],
    start_time: DateTime<Utc>,
    existing: &Schedule,
    constraints: &ScheduleConstraints,
) -> Result<AllocationOutcome, OptimizerError> {
    SlotSearchAllocator::default().allocate_by_slot_search(items, start_time, existing, constraints)
}

/// Order items for allocation: items with an estimate are sorted descending
/// (stable for ties) into the positions estimated items occupy; items without
/// an estimate keep their input positions.
pub fn order_by_engagement(items: &[PendingItem]) -> Vec<&PendingItem> {
    let mut estimated: Vec<(&PendingItem, f64)> = items
        .iter()
        .filter_map(|item| item.estimated_engagement.map(|e| (item, e)))
        .collect();
    estimated.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut ranked = estimated.into_iter().map(|(item, _)| item);
    items
        .iter()
        .map(|item| match item.estimated_engagement {
            Some(_) => ranked.next().unwrap_or(item),
            None => item,
        })
        .collect()
}
