//! The single "is this record due on this date" predicate. Every due check in
//! the workspace goes through [`is_due`].

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::HabitError;
use crate::record::HabitRecord;

/// Returns whether `record` is scheduled on `date`.
///
/// A record is never due before its start date. Otherwise it is due when its
/// weekday schedule is empty or names the date's weekday, or when the date is
/// one of its specific dates. A record whose start date cannot be parsed is
/// never due.
pub fn is_due(record: &HabitRecord, date: NaiveDate) -> bool {
    let start = match record.start_date() {
        Ok(start) => start,
        Err(err) => {
            tracing::debug!(id = %record.id, %err, "treating record with unreadable start date as not due");
            return false;
        }
    };
    if date < start {
        return false;
    }
    let weekday_matches =
        record.weekday_schedule.is_empty() || record.weekday_schedule.contains(&date.weekday());
    weekday_matches || record.specific_dates.contains(&date)
}

/// [`is_due`] for an ISO date string; malformed dates are never due.
pub fn is_due_on(record: &HabitRecord, iso_date: &str) -> bool {
    match parse_iso_date(iso_date) {
        Ok(date) => is_due(record, date),
        Err(err) => {
            tracing::debug!(id = %record.id, %err, "queried date is malformed");
            false
        }
    }
}

pub fn parse_iso_date(raw: &str) -> Result<NaiveDate, HabitError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HabitError::MalformedDate(raw.to_string()))
}

pub fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// The Monday-starting week containing `date`. Days past either end of the
/// calendar are left out.
pub fn week_window(date: NaiveDate) -> Vec<NaiveDate> {
    let offset = i64::from(date.weekday().num_days_from_monday());
    (0..7)
        .filter_map(|day| date.checked_add_signed(Duration::days(day - offset)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{HabitRecord, TimeGroup};
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn monday_habit() -> HabitRecord {
        let mut record = HabitRecord::new("mon".into(), "plan week", TimeGroup::Morning);
        record.weekday_schedule = vec![Weekday::Mon];
        record.created_at = "2024-01-01T07:00:00Z".into();
        record
    }

    #[test]
    fn weekday_schedule_respects_start_date() {
        let record = monday_habit();
        assert!(is_due(&record, date(2024, 1, 8)));
        assert!(!is_due(&record, date(2024, 1, 2)));
        assert!(!is_due(&record, date(2023, 12, 25)));
        assert!(is_due(&record, date(2024, 1, 1)));
    }

    #[test]
    fn specific_date_overrides_weekday() {
        let mut record = monday_habit();
        record.specific_dates.insert(date(2024, 1, 3));
        assert!(is_due(&record, date(2024, 1, 3)));
        assert!(!is_due(&record, date(2024, 1, 4)));
    }

    #[test]
    fn empty_schedule_means_every_day() {
        let mut record = monday_habit();
        record.weekday_schedule.clear();
        for day in 1..=7 {
            assert!(is_due(&record, date(2024, 1, day)));
        }
    }

    #[test]
    fn specific_dates_before_start_are_ignored() {
        let mut record = monday_habit();
        record.weekday_schedule = vec![Weekday::Sat];
        record.specific_dates.insert(date(2023, 12, 27));
        assert!(!is_due(&record, date(2023, 12, 27)));
    }

    #[test]
    fn malformed_dates_fail_closed() {
        let mut record = monday_habit();
        assert!(!is_due_on(&record, "2024-13-01"));
        assert!(is_due_on(&record, "2024-01-08"));
        record.created_at = "not a timestamp".into();
        assert!(!is_due(&record, date(2024, 1, 8)));
    }

    #[test]
    fn week_window_starts_on_monday() {
        let window = week_window(date(2024, 1, 10));
        assert_eq!(window[0], date(2024, 1, 8));
        assert_eq!(window[6], date(2024, 1, 14));

        let sunday = week_window(date(2024, 1, 14));
        assert_eq!(sunday[0], date(2024, 1, 8));
    }

    #[test]
    fn week_window_stops_at_calendar_bounds() {
        for edge in [NaiveDate::MIN, NaiveDate::MAX] {
            let window = week_window(edge);
            assert!(window.contains(&edge));
            assert!(!window.is_empty() && window.len() <= 7);
            assert!(window.windows(2).all(|pair| pair[0] < pair[1]));
        }
        assert_eq!(week_window(date(2024, 1, 10)).len(), 7);
    }
}
