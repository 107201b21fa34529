//! Per-weekday completion aggregation.
//!
//! Merges the day's snapshot counts with raw completion-log rows into a
//! tri-state flag: `Some(true)` complete, `Some(false)` incomplete, `None`
//! when nothing is known for the date (no snapshot, no logs). A day with a
//! snapshot but zero missions also reads as `None` — there was nothing to
//! complete.

use chrono::NaiveDate;
use serde::Serialize;

/// Counts derived from one `daily_snapshots` row.
#[derive(Debug, Clone, Copy)]
pub struct DayCounts {
    pub date: NaiveDate,
    pub total: i32,
    pub completed: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WeekdayStatus {
    /// 1 = Monday .. 5 = Friday.
    pub day_index: u8,
    pub date: NaiveDate,
    pub is_completed: Option<bool>,
    pub is_today: bool,
    pub completion_ratio: f64,
    pub total_missions: i32,
    pub completed_missions: i32,
}

/// Derive the five weekday statuses for one student's week.
///
/// `snapshots` holds at most one entry per date; `log_dates` are the distinct
/// dates with at least one raw completion log, used as a fallback when the
/// snapshot for a date is missing.
pub fn aggregate(
    weekdays: [NaiveDate; 5],
    snapshots: &[DayCounts],
    log_dates: &[NaiveDate],
    today: NaiveDate,
) -> [WeekdayStatus; 5] {
    let monday = weekdays[0];
    weekdays.map(|date| {
        let snapshot = snapshots.iter().find(|s| s.date == date);
        let (is_completed, total, completed) = match snapshot {
            Some(s) if s.total > 0 => (Some(s.completed >= s.total), s.total, s.completed),
            Some(s) => (None, s.total, s.completed),
            None => {
                let has_logs = log_dates.contains(&date);
                (if has_logs { Some(true) } else { None }, 0, 0)
            }
        };

        let completion_ratio = if total > 0 {
            (completed as f64 / total as f64).min(1.0)
        } else {
            0.0
        };

        let day_index = (date - monday).num_days() as u8 + 1;

        WeekdayStatus {
            day_index,
            date,
            is_completed,
            is_today: date == today,
            completion_ratio,
            total_missions: total,
            completed_missions: completed,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn week() -> [NaiveDate; 5] {
        let monday = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        [0, 1, 2, 3, 4].map(|i| monday + chrono::Duration::days(i))
    }

    fn counts(date: NaiveDate, total: i32, completed: i32) -> DayCounts {
        DayCounts {
            date,
            total,
            completed,
        }
    }

    #[test]
    fn snapshot_counts_drive_the_tri_state() {
        let days = week();
        let snapshots = vec![
            counts(days[0], 3, 3), // complete
            counts(days[1], 3, 1), // incomplete
            counts(days[2], 0, 0), // nothing configured that day
        ];
        let out = aggregate(days, &snapshots, &[], days[4]);

        assert_eq!(out[0].is_completed, Some(true));
        assert_eq!(out[1].is_completed, Some(false));
        assert_eq!(out[2].is_completed, None);
        assert_eq!(out[3].is_completed, None); // no snapshot, no logs
    }

    #[test]
    fn log_rows_without_a_snapshot_infer_completion() {
        let days = week();
        let out = aggregate(days, &[], &[days[1]], days[4]);

        assert_eq!(out[1].is_completed, Some(true));
        assert_eq!(out[0].is_completed, None);
    }

    #[test]
    fn ratio_is_bounded_and_zero_without_missions() {
        let days = week();
        let snapshots = vec![
            counts(days[0], 0, 0),
            counts(days[1], 4, 2),
            counts(days[2], 3, 5), // over-completed rows clamp to 1
        ];
        let out = aggregate(days, &snapshots, &[], days[0]);

        assert_eq!(out[0].completion_ratio, 0.0);
        assert_eq!(out[1].completion_ratio, 0.5);
        assert_eq!(out[2].completion_ratio, 1.0);
        for s in &out {
            assert!((0.0..=1.0).contains(&s.completion_ratio));
        }
    }

    #[test]
    fn unmarking_a_mission_flips_the_day_back_to_incomplete() {
        let days = week();
        let before = aggregate(days, &[counts(days[0], 5, 5)], &[], days[0]);
        assert_eq!(before[0].is_completed, Some(true));

        // One log deleted: the snapshot's completed set shrinks to 4.
        let after = aggregate(days, &[counts(days[0], 5, 4)], &[], days[0]);
        assert_eq!(after[0].is_completed, Some(false));
        assert_eq!(after[0].completed_missions, 4);
    }

    #[test]
    fn day_index_and_today_flag() {
        let days = week();
        let out = aggregate(days, &[], &[], days[2]);
        assert_eq!(out.iter().map(|s| s.day_index).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert!(out[2].is_today);
        assert!(!out[0].is_today);
    }
}
