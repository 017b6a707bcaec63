use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::record::{HabitRecord, TimeGroup};
use crate::schedule::{is_due, week_window};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub completed: u32,
    pub total: u32,
    /// Whole percent, rounded half up; 0 when nothing is due.
    pub rate: u32,
}

impl CompletionSummary {
    pub fn new(completed: u32, total: u32) -> Self {
        Self {
            completed,
            total,
            rate: completion_rate(completed, total),
        }
    }

    fn add(&mut self, due: bool, done: bool) {
        if !due {
            return;
        }
        self.total += 1;
        if done {
            self.completed += 1;
        }
        self.rate = completion_rate(self.completed, self.total);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBreakdown {
    pub date: NaiveDate,
    pub summary: CompletionSummary,
}

pub fn completion_rate(completed: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let (completed, total) = (u64::from(completed), u64::from(total));
    ((completed * 100 + total / 2) / total) as u32
}

/// Records due on `date`, in the order given.
pub fn due_on<'a, I>(records: I, date: NaiveDate) -> Vec<&'a HabitRecord>
where
    I: IntoIterator<Item = &'a HabitRecord>,
{
    records
        .into_iter()
        .filter(|record| is_due(record, date))
        .collect()
}

pub fn daily_metrics<'a, I>(records: I, date: NaiveDate) -> CompletionSummary
where
    I: IntoIterator<Item = &'a HabitRecord>,
{
    let mut summary = CompletionSummary::default();
    for record in records {
        summary.add(is_due(record, date), record.is_completed_on(date));
    }
    summary
}

/// Totals over every due (record, day) pair of the Monday-starting week
/// containing `date`.
pub fn weekly_metrics<'a, I>(records: I, date: NaiveDate) -> CompletionSummary
where
    I: IntoIterator<Item = &'a HabitRecord>,
{
    let week = week_window(date);
    let mut summary = CompletionSummary::default();
    for record in records {
        for &day in &week {
            summary.add(is_due(record, day), record.is_completed_on(day));
        }
    }
    summary
}

pub fn weekly_breakdown<'a, I>(records: I, date: NaiveDate) -> Vec<DailyBreakdown>
where
    I: IntoIterator<Item = &'a HabitRecord>,
    I::IntoIter: Clone,
{
    let records = records.into_iter();
    week_window(date)
        .into_iter()
        .map(|day| DailyBreakdown {
            date: day,
            summary: daily_metrics(records.clone(), day),
        })
        .collect()
}

pub fn group_metrics<'a, I>(records: I, date: NaiveDate) -> BTreeMap<TimeGroup, CompletionSummary>
where
    I: IntoIterator<Item = &'a HabitRecord>,
{
    let mut groups: BTreeMap<TimeGroup, CompletionSummary> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.time_group)
            .or_default()
            .add(is_due(record, date), record.is_completed_on(date));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn habit(id: &str, days: &[Weekday], done: &[NaiveDate]) -> HabitRecord {
        let mut record = HabitRecord::new(id.into(), id, TimeGroup::Morning);
        record.created_at = "2024-01-01T00:00:00Z".into();
        record.weekday_schedule = days.to_vec();
        for day in done {
            record.completions.insert(*day, true);
        }
        record
    }

    #[test]
    fn rate_rounds_half_up() {
        assert_eq!(completion_rate(2, 3), 67);
        assert_eq!(completion_rate(1, 3), 33);
        assert_eq!(completion_rate(1, 8), 13);
        assert_eq!(completion_rate(0, 0), 0);
        assert_eq!(completion_rate(4, 4), 100);
    }

    #[test]
    fn daily_counts_due_records_only() {
        let day = date(2024, 1, 10);
        let records = vec![
            habit("a", &[], &[day]),
            habit("b", &[Weekday::Wed], &[day]),
            habit("c", &[], &[]),
            habit("d", &[Weekday::Thu], &[day]),
        ];
        assert_eq!(
            daily_metrics(&records, day),
            CompletionSummary {
                completed: 2,
                total: 3,
                rate: 67
            }
        );
        let due: Vec<&str> = due_on(&records, day).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(due, ["a", "b", "c"]);
    }

    #[test]
    fn skipped_is_not_completed() {
        let day = date(2024, 1, 10);
        let mut record = habit("a", &[], &[]);
        record.completions.insert(day, false);
        assert_eq!(daily_metrics([&record], day), CompletionSummary::new(0, 1));
    }

    #[test]
    fn weekly_sums_due_days_across_the_week() {
        // Week of Mon 2024-01-08 .. Sun 2024-01-14.
        let every_day = habit("a", &[], &[date(2024, 1, 8), date(2024, 1, 9), date(2024, 1, 15)]);
        let mut mondays = habit("b", &[Weekday::Mon], &[date(2024, 1, 8)]);
        mondays.specific_dates.insert(date(2024, 1, 12));
        let records = vec![every_day, mondays];

        let summary = weekly_metrics(&records, date(2024, 1, 11));
        assert_eq!(summary.total, 9);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.rate, 33);
    }

    #[test]
    fn weekly_respects_start_date() {
        let mut late = habit("a", &[], &[]);
        late.created_at = "2024-01-12".into();
        let summary = weekly_metrics([&late], date(2024, 1, 8));
        assert_eq!(summary.total, 3);
    }

    #[test]
    fn weeks_at_the_calendar_edge_count_only_real_days() {
        let daily = habit("a", &[], &[]);
        let last = weekly_metrics([&daily], NaiveDate::MAX);
        assert_eq!(last.total as usize, week_window(NaiveDate::MAX).len());
        assert!(weekly_breakdown([&daily], NaiveDate::MAX).len() <= 7);
        assert_eq!(weekly_metrics([&daily], NaiveDate::MIN).total, 0);
    }

    #[test]
    fn breakdown_has_one_entry_per_weekday() {
        let records = vec![habit("a", &[Weekday::Tue], &[date(2024, 1, 9)])];
        let breakdown = weekly_breakdown(&records, date(2024, 1, 14));
        assert_eq!(breakdown.len(), 7);
        assert_eq!(breakdown[0].date, date(2024, 1, 8));
        assert_eq!(breakdown[0].summary.total, 0);
        assert_eq!(breakdown[1].summary, CompletionSummary::new(1, 1));
    }

    #[test]
    fn group_metrics_split_by_time_group() {
        let day = date(2024, 1, 10);
        let mut evening = habit("e", &[], &[]);
        evening.time_group = TimeGroup::Evening;
        let records = vec![habit("m", &[], &[day]), evening];
        let groups = group_metrics(&records, day);
        assert_eq!(groups[&TimeGroup::Morning], CompletionSummary::new(1, 1));
        assert_eq!(groups[&TimeGroup::Evening], CompletionSummary::new(0, 1));
    }
}
