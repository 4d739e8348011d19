// Slot allocation strategies
//
// Two strategies with different guarantees live behind one interface:
// - ranked-hour allocation: engagement-driven, best effort, falls back to an
//   hourly sequence when analytics are unusable
// - slot-search allocation: walks the calendar and satisfies every structural
//   constraint by construction

pub mod ranked;
pub mod slot_search;

pub use ranked::{allocate_by_ranked_hours, fallback_schedule, MinuteSelection, RankedHourAllocator};
pub use slot_search::{
    allocate_by_slot_search, order_by_engagement, SlotSearchAllocator, DEFAULT_MAX_DAY_STEPS,
};

use crate::errors::OptimizerError;
use crate::models::{
    AllocationStatus, HourlyEngagementProfile, PendingItem, Schedule, ScheduleConstraints,
    StrategyKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything an allocation strategy may read. Strategies ignore what they do
/// not use: ranked-hour allocation ignores `existing`, slot search ignores
/// `profile`.
#[derive(Debug, Clone, Copy)]
pub struct AllocationRequest<'a> {
    pub items: &'a [PendingItem],
    pub constraints: &'a ScheduleConstraints,
    /// `now` for ranked-hour allocation, the initial cursor for slot search
    pub start: DateTime<Utc>,
    pub profile: &'a HourlyEngagementProfile,
    pub existing: &'a Schedule,
}

/// Result of one allocation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationOutcome {
    pub schedule: Schedule,
    pub status: AllocationStatus,
    pub strategy: StrategyKind,
}

impl AllocationOutcome {
    pub fn is_fallback(&self) -> bool {
        self.status == AllocationStatus::Fallback
    }
}

/// A named allocation strategy
pub trait AllocationStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn allocate(&self, request: &AllocationRequest<'_>) -> Result<AllocationOutcome, OptimizerError>;
}

/// Strategy object for a configured kind
pub fn strategy_for(
    kind: StrategyKind,
    minutes: MinuteSelection,
    max_day_steps: u32,
) -> Box<dyn AllocationStrategy> {
    match kind {
        StrategyKind::RankedHours => Box::new(RankedHourAllocator::new(minutes)),
        StrategyKind::SlotSearch => Box::new(SlotSearchAllocator::new(max_day_steps)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_strategy_for_returns_matching_kind() {
        let ranked = strategy_for(StrategyKind::RankedHours, MinuteSelection::TopOfHour, 10);
        assert_eq!(ranked.kind(), StrategyKind::RankedHours);
        let search = strategy_for(StrategyKind::SlotSearch, MinuteSelection::TopOfHour, 10);
        assert_eq!(search.kind(), StrategyKind::SlotSearch);
    }

    #[test]
    fn test_strategies_share_one_request_shape() {
        let items = vec![PendingItem::new("a", ["b1"]), PendingItem::new("b", ["b1"])];
        let constraints = ScheduleConstraints::default();
        let profile = HourlyEngagementProfile::zero();
        let existing = Schedule::new();
        let request = AllocationRequest {
            items: &items,
            constraints: &constraints,
            start: Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap(),
            profile: &profile,
            existing: &existing,
        };

        for kind in [StrategyKind::RankedHours, StrategyKind::SlotSearch] {
            let outcome = strategy_for(kind, MinuteSelection::TopOfHour, DEFAULT_MAX_DAY_STEPS)
                .allocate(&request)
                .unwrap();
            assert_eq!(outcome.strategy, kind);
            assert_eq!(outcome.schedule.len(), 2);
        }
    }
}
