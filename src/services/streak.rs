//! Weekly-streak evaluation and the per-user reward state machine.
//!
//! Evaluation only happens on the last school day of the window: a week
//! counts as a streak when all five weekday statuses are complete on Friday.
//! Whether the user already holds a weekly award is a store question and is
//! answered by the caller; [`StreakDecision`] captures the combined outcome.

use chrono::NaiveDate;
use serde::Serialize;

use crate::services::aggregator::WeekdayStatus;
use crate::services::date_window;

/// Well-known id of the system weekly-streak badge. Enqueued as a sentinel;
/// never written to `earned_badges` itself — the student's selection is what
/// gets persisted.
pub const WEEKLY_STREAK_BADGE_ID: &str = "weekly_streak_1";

/// Badge ids carrying this prefix are weekly-type awards.
pub const WEEKLY_STREAK_PREFIX: &str = "weekly_streak";

/// Maximum number of badges a teacher may place in the weekly pool.
pub const WEEKLY_POOL_MAX: usize = 5;

/// Lifecycle of one user's weekly reward, consolidated from what used to be
/// scattered boolean flags. Held in process memory and re-derivable from the
/// store after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardState {
    Idle,
    Evaluating,
    AwaitingSelection,
    Persisting,
    Done,
    Error,
}

impl RewardState {
    /// Legal transitions. Anything else is a programming error and is logged
    /// by the session rather than applied.
    pub fn can_transition(self, to: RewardState) -> bool {
        use RewardState::*;
        matches!(
            (self, to),
            (Idle, Evaluating)
                | (Evaluating, Idle)
                | (Evaluating, AwaitingSelection)
                | (Evaluating, Done)
                | (AwaitingSelection, Persisting)
                | (AwaitingSelection, Done)
                | (Persisting, Done)
                | (Persisting, Error)
                | (Error, Evaluating)
                | (Done, Evaluating)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakDecision {
    /// Today is not Friday in the classroom zone; nothing is evaluated.
    NotLastWeekday,
    /// At least one weekday is incomplete or unknown.
    Incomplete,
    /// A weekly award already exists in this window; do not re-notify.
    AlreadyRewarded,
    /// Streak achieved and unrewarded: enqueue the sentinel once.
    Enqueue,
}

/// True when all five weekdays are complete and today is the window's Friday.
pub fn streak_achieved(statuses: &[WeekdayStatus; 5], today: NaiveDate) -> bool {
    date_window::is_friday(today) && statuses.iter().all(|s| s.is_completed == Some(true))
}

/// Combine the week's statuses with the store's answer about an existing
/// weekly award. `has_weekly_award` is only consulted once the streak itself
/// holds, mirroring the check-order of the evaluation flow.
pub fn decide(
    statuses: &[WeekdayStatus; 5],
    today: NaiveDate,
    has_weekly_award: bool,
) -> StreakDecision {
    if !date_window::is_friday(today) {
        return StreakDecision::NotLastWeekday;
    }
    if !statuses.iter().all(|s| s.is_completed == Some(true)) {
        return StreakDecision::Incomplete;
    }
    if has_weekly_award {
        StreakDecision::AlreadyRewarded
    } else {
        StreakDecision::Enqueue
    }
}

/// Weekly-type ids are recognized by prefix; everything else is an ordinary
/// mission badge.
pub fn is_weekly_badge_id(badge_id: &str) -> bool {
    badge_id.starts_with(WEEKLY_STREAK_PREFIX)
}

/// Whether `badge_id` is a legal weekly selection. The choice must come from
/// the teacher's configured pool; an empty pool offers only the system badge.
pub fn selection_allowed(pool_ids: &[String], badge_id: &str) -> bool {
    if pool_ids.is_empty() {
        badge_id == WEEKLY_STREAK_BADGE_ID
    } else {
        pool_ids.iter().any(|id| id == badge_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::aggregator::{aggregate, DayCounts};
    use chrono::NaiveDate;

    fn week() -> [NaiveDate; 5] {
        let monday = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        [0, 1, 2, 3, 4].map(|i| monday + chrono::Duration::days(i))
    }

    fn statuses(completed_days: &[usize]) -> [WeekdayStatus; 5] {
        let days = week();
        let snapshots: Vec<DayCounts> = days
            .iter()
            .enumerate()
            .map(|(i, &date)| DayCounts {
                date,
                total: 3,
                completed: if completed_days.contains(&i) { 3 } else { 1 },
            })
            .collect();
        aggregate(days, &snapshots, &[], days[4])
    }

    #[test]
    fn full_week_on_friday_enqueues_once() {
        let friday = week()[4];
        let s = statuses(&[0, 1, 2, 3, 4]);
        assert_eq!(decide(&s, friday, false), StreakDecision::Enqueue);
    }

    #[test]
    fn existing_award_suppresses_the_notification() {
        let friday = week()[4];
        let s = statuses(&[0, 1, 2, 3, 4]);
        assert_eq!(decide(&s, friday, true), StreakDecision::AlreadyRewarded);
    }

    #[test]
    fn nothing_happens_before_friday() {
        let thursday = week()[3];
        let s = statuses(&[0, 1, 2, 3, 4]);
        assert_eq!(decide(&s, thursday, false), StreakDecision::NotLastWeekday);
        assert!(!streak_achieved(&s, thursday));
    }

    #[test]
    fn friday_miss_means_no_streak() {
        // Monday..Thursday complete, Friday incomplete.
        let friday = week()[4];
        let s = statuses(&[0, 1, 2, 3]);
        assert_eq!(decide(&s, friday, false), StreakDecision::Incomplete);
    }

    #[test]
    fn unknown_days_do_not_count_as_complete() {
        let days = week();
        // Only two snapshots exist; the rest of the week is unknown.
        let snapshots = vec![
            DayCounts { date: days[0], total: 2, completed: 2 },
            DayCounts { date: days[1], total: 2, completed: 2 },
        ];
        let s = aggregate(days, &snapshots, &[], days[4]);
        assert_eq!(decide(&s, days[4], false), StreakDecision::Incomplete);
    }

    #[test]
    fn state_machine_admits_only_defined_transitions() {
        use RewardState::*;
        assert!(Idle.can_transition(Evaluating));
        assert!(Evaluating.can_transition(AwaitingSelection));
        assert!(AwaitingSelection.can_transition(Persisting));
        assert!(Persisting.can_transition(Done));
        assert!(Persisting.can_transition(Error));
        assert!(!Idle.can_transition(Persisting));
        assert!(!Done.can_transition(Persisting));
        assert!(!AwaitingSelection.can_transition(Evaluating));
    }

    #[test]
    fn weekly_ids_are_recognized_by_prefix() {
        assert!(is_weekly_badge_id(WEEKLY_STREAK_BADGE_ID));
        assert!(is_weekly_badge_id("weekly_streak_gold"));
        assert!(!is_weekly_badge_id("reading_champion"));
    }

    #[test]
    fn selection_must_come_from_the_configured_pool() {
        let pool = vec!["gold_star".to_string(), "reading_champion".to_string()];
        assert!(selection_allowed(&pool, "gold_star"));
        assert!(!selection_allowed(&pool, "made_up_badge"));
        // Once a pool is configured the sentinel itself is not on offer.
        assert!(!selection_allowed(&pool, WEEKLY_STREAK_BADGE_ID));
    }

    #[test]
    fn empty_pool_falls_back_to_the_system_badge() {
        assert!(selection_allowed(&[], WEEKLY_STREAK_BADGE_ID));
        assert!(!selection_allowed(&[], "gold_star"));
    }
}
