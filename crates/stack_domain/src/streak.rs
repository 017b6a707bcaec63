use chrono::{Duration, NaiveDate};

use crate::record::HabitRecord;

pub const DEFAULT_STREAK_LOOKBACK_DAYS: u32 = 365;

/// Counts consecutive completed days ending at `anchor`, walking back at
/// most `max_lookback` days and never before the record's start date.
///
/// The run must include `anchor` itself: an unset or skipped anchor day
/// gives 0 whatever came before.
pub fn consistency_streak(record: &HabitRecord, anchor: NaiveDate, max_lookback: u32) -> u32 {
    let Ok(start) = record.start_date() else {
        return 0;
    };
    let mut streak = 0;
    let mut day = anchor;
    for _ in 0..max_lookback {
        if day < start || !record.is_completed_on(day) {
            break;
        }
        streak += 1;
        day = match day.checked_sub_signed(Duration::days(1)) {
            Some(previous) => previous,
            None => break,
        };
    }
    streak
}

/// Recomputes the cached `streak` field. Returns true when it changed.
pub fn refresh_streak(record: &mut HabitRecord, anchor: NaiveDate, max_lookback: u32) -> bool {
    let streak = consistency_streak(record, anchor, max_lookback);
    if record.streak == streak {
        return false;
    }
    record.streak = streak;
    true
}
