//! Week-window math for the classroom time zone.
//!
//! All boundaries are computed in a fixed UTC offset (Asia/Seoul, +09:00 —
//! no DST) and re-derived on every call; nothing here touches the database.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc, Weekday};

/// The Monday..Sunday window containing a reference instant, with the
/// timestamp bounds used for range queries against `earned_at` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekWindow {
    pub monday: NaiveDate,
    pub sunday: NaiveDate,
    pub monday_start: DateTime<Utc>,
    pub sunday_end: DateTime<Utc>,
}

impl WeekWindow {
    /// The five school days, Monday first.
    pub fn weekdays(&self) -> [NaiveDate; 5] {
        let mut days = [self.monday; 5];
        for (i, day) in days.iter_mut().enumerate() {
            *day = self.monday + Duration::days(i as i64);
        }
        days
    }

    pub fn friday(&self) -> NaiveDate {
        self.monday + Duration::days(4)
    }
}

/// Compute the week window containing `instant`, interpreted in `zone`.
///
/// Offsets follow the 0=Sunday..6=Saturday convention: a Sunday belongs to
/// the week that started six days earlier.
pub fn week_bounds(instant: DateTime<Utc>, zone: FixedOffset) -> WeekWindow {
    let local_date = instant.with_timezone(&zone).date_naive();
    let weekday = local_date.weekday().num_days_from_sunday() as i64;

    let to_monday = if weekday == 0 { -6 } else { 1 - weekday };
    let to_sunday = if weekday == 0 { 0 } else { 7 - weekday };

    let monday = local_date + Duration::days(to_monday);
    let sunday = local_date + Duration::days(to_sunday);

    WeekWindow {
        monday,
        sunday,
        monday_start: local_midnight(monday, zone),
        sunday_end: local_day_end(sunday, zone),
    }
}

/// Today's calendar date in `zone`.
pub fn local_today(instant: DateTime<Utc>, zone: FixedOffset) -> NaiveDate {
    instant.with_timezone(&zone).date_naive()
}

/// `yyyy-MM-dd` for the calendar day containing `instant` in `zone`, the
/// date key format the display layer works with.
pub fn format_iso_date(instant: DateTime<Utc>, zone: FixedOffset) -> String {
    local_today(instant, zone).format("%Y-%m-%d").to_string()
}

pub fn is_friday(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Fri
}

fn local_midnight(date: NaiveDate, zone: FixedOffset) -> DateTime<Utc> {
    zone.from_local_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is valid"))
        .single()
        .expect("fixed-offset local times are unambiguous")
        .with_timezone(&Utc)
}

fn local_day_end(date: NaiveDate, zone: FixedOffset) -> DateTime<Utc> {
    zone.from_local_datetime(&date.and_hms_opt(23, 59, 59).expect("day end is valid"))
        .single()
        .expect("fixed-offset local times are unambiguous")
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn seoul() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn midweek_reference_lands_on_surrounding_monday_and_sunday() {
        // 2026-08-26 is a Wednesday.
        let w = week_bounds(utc(2026, 8, 26, 3), seoul());
        assert_eq!(w.monday, NaiveDate::from_ymd_opt(2026, 8, 24).unwrap());
        assert_eq!(w.sunday, NaiveDate::from_ymd_opt(2026, 8, 30).unwrap());
    }

    #[test]
    fn sunday_belongs_to_the_week_that_started_six_days_earlier() {
        // 2026-08-30 is a Sunday.
        let w = week_bounds(utc(2026, 8, 30, 3), seoul());
        assert_eq!(w.monday, NaiveDate::from_ymd_opt(2026, 8, 24).unwrap());
        assert_eq!(w.sunday, NaiveDate::from_ymd_opt(2026, 8, 30).unwrap());
    }

    #[test]
    fn zone_offset_can_move_the_reference_date() {
        // 2026-08-23 16:00 UTC is already Monday 01:00 in Seoul.
        let w = week_bounds(utc(2026, 8, 23, 16), seoul());
        assert_eq!(w.monday, NaiveDate::from_ymd_opt(2026, 8, 24).unwrap());
    }

    #[test]
    fn window_bounds_cover_local_start_and_end_of_day() {
        let w = week_bounds(utc(2026, 8, 26, 3), seoul());
        // Monday 00:00 KST == Sunday 15:00 UTC.
        assert_eq!(w.monday_start, utc(2026, 8, 23, 15));
        // Sunday 23:59:59 KST == Sunday 14:59:59 UTC.
        assert_eq!(
            w.sunday_end,
            Utc.with_ymd_and_hms(2026, 8, 30, 14, 59, 59).unwrap()
        );
    }

    #[test]
    fn weekdays_are_monday_through_friday() {
        let w = week_bounds(utc(2026, 8, 26, 3), seoul());
        let days = w.weekdays();
        assert_eq!(days[0], w.monday);
        assert_eq!(days[4], NaiveDate::from_ymd_opt(2026, 8, 28).unwrap());
        assert_eq!(w.friday(), days[4]);
        assert!(is_friday(w.friday()));
        assert!(!is_friday(w.monday));
    }

    #[test]
    fn iso_date_format_respects_the_zone() {
        // 2026-01-04 16:00 UTC is already Jan 5 in Seoul.
        let instant = utc(2026, 1, 4, 16);
        assert_eq!(format_iso_date(instant, seoul()), "2026-01-05");
        assert_eq!(
            format_iso_date(instant, FixedOffset::east_opt(0).unwrap()),
            "2026-01-04"
        );
    }

}
