use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HabitError;

/// Opaque record identifier. New records get a v4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(String);

impl HabitId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for HabitId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HabitId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for HabitId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Coarse time-of-day bucket. Each group owns an independent chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGroup {
    Morning,
    Afternoon,
    Evening,
    Night,
    Other,
}

impl TimeGroup {
    pub const ALL: [TimeGroup; 5] = [
        TimeGroup::Morning,
        TimeGroup::Afternoon,
        TimeGroup::Evening,
        TimeGroup::Night,
        TimeGroup::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeGroup::Morning => "morning",
            TimeGroup::Afternoon => "afternoon",
            TimeGroup::Evening => "evening",
            TimeGroup::Night => "night",
            TimeGroup::Other => "other",
        }
    }

    /// Default bucket for a clock time; `anytime` and missing times land in `Other`.
    pub fn for_time_of_day(time: Option<&TimeOfDay>) -> Self {
        let Some(TimeOfDay::At(time)) = time else {
            return TimeGroup::Other;
        };
        match time.hour() {
            5..=11 => TimeGroup::Morning,
            12..=16 => TimeGroup::Afternoon,
            17..=20 => TimeGroup::Evening,
            _ => TimeGroup::Night,
        }
    }
}

impl fmt::Display for TimeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeGroup {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        TimeGroup::ALL
            .into_iter()
            .find(|group| group.as_str() == normalized)
            .ok_or(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeOfDay {
    Anytime,
    At(NaiveTime),
}

impl TimeOfDay {
    pub const ANYTIME: &'static str = "anytime";

    pub fn parse(raw: &str) -> Result<Self, HabitError> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case(Self::ANYTIME) {
            return Ok(TimeOfDay::Anytime);
        }
        NaiveTime::parse_from_str(trimmed, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
            .map(TimeOfDay::At)
            .map_err(|_| HabitError::MalformedTime(raw.to_string()))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeOfDay::Anytime => f.write_str(Self::ANYTIME),
            TimeOfDay::At(time) => write!(f, "{}", time.format("%H:%M")),
        }
    }
}

/// Tri-state outcome stored per calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Completion {
    Done,
    Skipped,
    Unset,
}

impl Completion {
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Completion::Done,
            Some(false) => Completion::Skipped,
            None => Completion::Unset,
        }
    }

    pub fn as_flag(self) -> Option<bool> {
        match self {
            Completion::Done => Some(true),
            Completion::Skipped => Some(false),
            Completion::Unset => None,
        }
    }
}

/// One step of a habit stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitRecord {
    pub id: HabitId,
    pub identity: String,
    /// Copy of the predecessor's `action_label`; empty for a chain head.
    pub predecessor_label: String,
    pub action_label: String,
    pub time_of_day: Option<TimeOfDay>,
    pub time_group: TimeGroup,
    pub location: String,
    /// Empty means every day.
    pub weekday_schedule: Vec<Weekday>,
    pub specific_dates: BTreeSet<NaiveDate>,
    /// Creation timestamp as stored; its date part is the start date.
    pub created_at: String,
    pub completions: BTreeMap<NaiveDate, bool>,
    pub streak: u32,
    pub predecessor_id: Option<HabitId>,
    pub successor_id: Option<HabitId>,
    pub anchor_id: Option<HabitId>,
}

impl HabitRecord {
    pub fn new(id: HabitId, action_label: impl Into<String>, time_group: TimeGroup) -> Self {
        Self {
            id,
            identity: String::new(),
            predecessor_label: String::new(),
            action_label: action_label.into(),
            time_of_day: None,
            time_group,
            location: String::new(),
            weekday_schedule: Vec::new(),
            specific_dates: BTreeSet::new(),
            created_at: String::new(),
            completions: BTreeMap::new(),
            streak: 0,
            predecessor_id: None,
            successor_id: None,
            anchor_id: None,
        }
    }

    pub fn start_date(&self) -> Result<NaiveDate, HabitError> {
        parse_timestamp_date(&self.created_at)
    }

    /// Creation time in UTC, for ordering records created apart.
    pub fn created_instant(&self) -> Result<NaiveDateTime, HabitError> {
        parse_timestamp_instant(&self.created_at)
    }

    pub fn completion(&self, date: NaiveDate) -> Completion {
        Completion::from_flag(self.completions.get(&date).copied())
    }

    pub fn is_completed_on(&self, date: NaiveDate) -> bool {
        self.completions.get(&date).copied() == Some(true)
    }

    pub fn set_completion(&mut self, date: NaiveDate, outcome: Completion) {
        match outcome.as_flag() {
            Some(flag) => {
                self.completions.insert(date, flag);
            }
            None => {
                self.completions.remove(&date);
            }
        }
    }

    pub fn is_head(&self) -> bool {
        self.predecessor_id.is_none()
    }

    pub fn is_tail(&self) -> bool {
        self.successor_id.is_none()
    }

    /// "After I <predecessor>, I will <action> at <time> in <location>."
    pub fn habit_statement(&self) -> String {
        let mut statement = if self.predecessor_label.trim().is_empty() {
            format!("I will {}", self.action_label.trim())
        } else {
            format!(
                "After I {}, I will {}",
                self.predecessor_label.trim(),
                self.action_label.trim()
            )
        };
        if let Some(TimeOfDay::At(time)) = &self.time_of_day {
            statement.push_str(&format!(" at {}", time.format("%H:%M")));
        }
        if !self.location.trim().is_empty() {
            statement.push_str(&format!(" in {}", self.location.trim()));
        }
        statement.push('.');
        statement
    }

    pub(crate) fn clear_links(&mut self) {
        self.predecessor_id = None;
        self.successor_id = None;
        self.anchor_id = None;
        self.predecessor_label.clear();
    }
}

/// Caller-supplied fields for a new record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitDraft {
    pub identity: String,
    pub action_label: String,
    pub time_of_day: Option<TimeOfDay>,
    /// Falls back to the bucket of `time_of_day`.
    pub time_group: Option<TimeGroup>,
    pub location: String,
    pub weekday_schedule: Vec<Weekday>,
    pub specific_dates: BTreeSet<NaiveDate>,
}

impl HabitDraft {
    pub fn new(action_label: impl Into<String>) -> Self {
        Self {
            action_label: action_label.into(),
            ..Self::default()
        }
    }

    pub fn in_group(mut self, group: TimeGroup) -> Self {
        self.time_group = Some(group);
        self
    }

    pub fn on_weekdays(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.weekday_schedule = days.into_iter().collect();
        self
    }

    pub fn into_record(self, id: HabitId, created_at: String) -> Result<HabitRecord, HabitError> {
        let action_label = self.action_label.trim().to_string();
        if action_label.is_empty() {
            return Err(HabitError::EmptyAction);
        }
        let time_group = self
            .time_group
            .unwrap_or_else(|| TimeGroup::for_time_of_day(self.time_of_day.as_ref()));
        Ok(HabitRecord {
            identity: self.identity,
            time_of_day: self.time_of_day,
            location: self.location,
            weekday_schedule: normalize_weekdays(self.weekday_schedule),
            specific_dates: self.specific_dates,
            created_at,
            ..HabitRecord::new(id, action_label, time_group)
        })
    }
}

/// Non-structural field changes. Links, the predecessor label and the time
/// group are deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HabitPatch {
    pub identity: Option<String>,
    pub action_label: Option<String>,
    pub time_of_day: Option<Option<TimeOfDay>>,
    pub location: Option<String>,
    pub weekday_schedule: Option<Vec<Weekday>>,
    pub specific_dates: Option<BTreeSet<NaiveDate>>,
}

impl HabitPatch {
    pub fn is_empty(&self) -> bool {
        *self == HabitPatch::default()
    }

    /// Applies the patch and reports whether `action_label` changed.
    pub(crate) fn apply(self, record: &mut HabitRecord) -> Result<bool, HabitError> {
        let mut action_changed = false;
        if let Some(label) = self.action_label {
            let label = label.trim().to_string();
            if label.is_empty() {
                return Err(HabitError::EmptyAction);
            }
            action_changed = label != record.action_label;
            record.action_label = label;
        }
        if let Some(identity) = self.identity {
            record.identity = identity;
        }
        if let Some(time) = self.time_of_day {
            record.time_of_day = time;
        }
        if let Some(location) = self.location {
            record.location = location;
        }
        if let Some(days) = self.weekday_schedule {
            record.weekday_schedule = normalize_weekdays(days);
        }
        if let Some(dates) = self.specific_dates {
            record.specific_dates = dates;
        }
        Ok(action_changed)
    }
}

pub fn parse_weekday(code: &str) -> Result<Weekday, HabitError> {
    code.trim()
        .parse::<Weekday>()
        .map_err(|_| HabitError::UnknownWeekday(code.to_string()))
}

/// Three-letter code used on the wire, e.g. `Mon`.
pub fn weekday_code(day: Weekday) -> String {
    day.to_string()
}

/// Deduplicates and sorts Monday-first.
pub fn normalize_weekdays(days: Vec<Weekday>) -> Vec<Weekday> {
    let mut days = days;
    days.sort_by_key(|day| day.num_days_from_monday());
    days.dedup();
    days
}

/// Calendar date of an ISO date or timestamp, taken as written.
pub fn parse_timestamp_date(raw: &str) -> Result<NaiveDate, HabitError> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(stamp.date_naive());
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|stamp| stamp.date())
        .map_err(|_| HabitError::MalformedDate(raw.to_string()))
}

/// Instant of an ISO date or timestamp. Offsets are resolved to UTC; plain
/// dates and stamps without an offset are read as UTC.
pub fn parse_timestamp_instant(raw: &str) -> Result<NaiveDateTime, HabitError> {
    let trimmed = raw.trim();
    if let Ok(stamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(stamp.naive_utc());
    }
    if let Ok(stamp) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(stamp);
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN))
        .map_err(|_| HabitError::MalformedDate(raw.to_string()))
}
