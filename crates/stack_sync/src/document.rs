use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use stack_domain::record::{
    normalize_weekdays, parse_timestamp_date, parse_weekday, weekday_code, HabitId, HabitRecord,
    TimeGroup, TimeOfDay,
};
use stack_domain::schedule::{iso_date, parse_iso_date};

/// Flat document shape kept in the store, one per habit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitDocument {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub identity: String,
    /// Predecessor's label.
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_habit: String,
    /// This step's label.
    #[serde(default, deserialize_with = "null_as_default")]
    pub new_habit: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub time: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub schedule: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub specific_dates: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completions: BTreeMap<String, bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub streak: u32,
    #[serde(default)]
    pub prev_id: Option<String>,
    #[serde(default)]
    pub next_id: Option<String>,
    #[serde(default)]
    pub stack_after: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_group: Option<String>,
}

impl From<&HabitRecord> for HabitDocument {
    fn from(record: &HabitRecord) -> Self {
        Self {
            id: record.id.to_string(),
            identity: record.identity.clone(),
            current_habit: record.predecessor_label.clone(),
            new_habit: record.action_label.clone(),
            time: record
                .time_of_day
                .map(|time| time.to_string())
                .unwrap_or_default(),
            location: record.location.clone(),
            schedule: record
                .weekday_schedule
                .iter()
                .map(|day| weekday_code(*day))
                .collect(),
            specific_dates: record.specific_dates.iter().map(|d| iso_date(*d)).collect(),
            completions: record
                .completions
                .iter()
                .map(|(date, done)| (iso_date(*date), *done))
                .collect(),
            streak: record.streak,
            prev_id: record.predecessor_id.as_ref().map(HabitId::to_string),
            next_id: record.successor_id.as_ref().map(HabitId::to_string),
            stack_after: record.anchor_id.as_ref().map(HabitId::to_string),
            created_at: record.created_at.clone(),
            time_group: Some(record.time_group.to_string()),
        }
    }
}

/// Lenient conversion: unreadable optional fields are dropped with a
/// warning so one bad value never hides the whole record.
impl From<HabitDocument> for HabitRecord {
    fn from(doc: HabitDocument) -> Self {
        let id = HabitId::new(doc.id);

        let time_of_day = match doc.time.trim() {
            "" => None,
            raw => match TimeOfDay::parse(raw) {
                Ok(time) => Some(time),
                Err(err) => {
                    warn!(%id, %err, "dropping unreadable time of day");
                    None
                }
            },
        };

        let time_group = doc
            .time_group
            .as_deref()
            .and_then(|raw| match raw.parse::<TimeGroup>() {
                Ok(group) => Some(group),
                Err(()) => {
                    warn!(%id, group = raw, "unknown time group; deriving from time");
                    None
                }
            })
            .unwrap_or_else(|| TimeGroup::for_time_of_day(time_of_day.as_ref()));

        let weekday_schedule = doc
            .schedule
            .iter()
            .filter_map(|code| match parse_weekday(code) {
                Ok(day) => Some(day),
                Err(err) => {
                    warn!(%id, %err, "dropping schedule entry");
                    None
                }
            })
            .collect();

        let specific_dates = doc
            .specific_dates
            .iter()
            .filter_map(|raw| match parse_iso_date(raw) {
                Ok(date) => Some(date),
                Err(err) => {
                    warn!(%id, %err, "dropping specific date");
                    None
                }
            })
            .collect();

        let completions = doc
            .completions
            .iter()
            .filter_map(|(raw, done)| match parse_iso_date(raw) {
                Ok(date) => Some((date, *done)),
                Err(err) => {
                    warn!(%id, %err, "dropping completion entry");
                    None
                }
            })
            .collect();

        if let Err(err) = parse_timestamp_date(&doc.created_at) {
            warn!(%id, %err, "record has no readable start date; it will never be due");
        }

        HabitRecord {
            identity: doc.identity,
            predecessor_label: doc.current_habit,
            time_of_day,
            location: doc.location,
            weekday_schedule: normalize_weekdays(weekday_schedule),
            specific_dates,
            created_at: doc.created_at,
            completions,
            streak: doc.streak,
            predecessor_id: link(doc.prev_id),
            successor_id: link(doc.next_id),
            anchor_id: link(doc.stack_after),
            ..HabitRecord::new(id, doc.new_habit, time_group)
        }
    }
}

/// Some writers store `null` for empty fields.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Empty strings are stored by some writers in place of null.
fn link(raw: Option<String>) -> Option<HabitId> {
    raw.filter(|value| !value.trim().is_empty())
        .map(HabitId::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Weekday};

    #[test]
    fn parses_stored_json_shape() {
        let raw = r#"{
            "id": "h2",
            "identity": "healthy person",
            "currentHabit": "brush teeth",
            "newHabit": "floss",
            "time": "07:15",
            "location": "bathroom",
            "schedule": ["Mon", "Wed", "Someday"],
            "specificDates": ["2024-01-06", "06/01/2024"],
            "completions": {"2024-01-08": true, "2024-01-10": false, "bad": true},
            "streak": 1,
            "prevId": "h1",
            "nextId": null,
            "stackAfter": "h1",
            "createdAt": "2024-01-01T06:00:00.000Z"
        }"#;
        let doc: HabitDocument = serde_json::from_str(raw).unwrap();
        let record = HabitRecord::from(doc);

        assert_eq!(record.action_label, "floss");
        assert_eq!(record.predecessor_label, "brush teeth");
        assert_eq!(record.time_group, TimeGroup::Morning);
        assert_eq!(record.weekday_schedule, vec![Weekday::Mon, Weekday::Wed]);
        assert_eq!(record.specific_dates.len(), 1);
        assert_eq!(record.completions.len(), 2);
        assert_eq!(record.predecessor_id, Some("h1".into()));
        assert!(record.successor_id.is_none());
        assert_eq!(
            record.start_date(),
            Ok(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
    }

    #[test]
    fn explicit_time_group_wins_and_empty_links_are_null() {
        let raw = r#"{"id": "x", "newHabit": "meditate", "time": "anytime",
                      "timeGroup": "evening", "prevId": "", "createdAt": "2024-01-01"}"#;
        let record = HabitRecord::from(serde_json::from_str::<HabitDocument>(raw).unwrap());
        assert_eq!(record.time_group, TimeGroup::Evening);
        assert_eq!(record.time_of_day, Some(TimeOfDay::Anytime));
        assert!(record.predecessor_id.is_none());
    }

    #[test]
    fn null_fields_read_as_empty() {
        let raw = r#"{"id": "n", "identity": null, "currentHabit": null, "newHabit": "walk",
                      "time": null, "location": null, "schedule": null,
                      "specificDates": null, "completions": null, "streak": null,
                      "prevId": null, "createdAt": "2024-01-01"}"#;
        let doc: HabitDocument = serde_json::from_str(raw).unwrap();
        assert!(doc.schedule.is_empty());
        assert!(doc.completions.is_empty());
        assert_eq!(doc.streak, 0);

        let record = HabitRecord::from(doc);
        assert_eq!(record.action_label, "walk");
        assert!(record.time_of_day.is_none());
        assert_eq!(record.time_group, TimeGroup::Other);
        assert!(record.weekday_schedule.is_empty());
    }

    #[test]
    fn record_writes_wire_field_names() {
        let mut record = HabitRecord::new("a".into(), "walk", TimeGroup::Afternoon);
        record.weekday_schedule = vec![Weekday::Tue];
        record
            .completions
            .insert(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), true);
        record.successor_id = Some("b".into());

        let value = serde_json::to_value(HabitDocument::from(&record)).unwrap();
        assert_eq!(value["newHabit"], "walk");
        assert_eq!(value["schedule"][0], "Tue");
        assert_eq!(value["completions"]["2024-02-01"], true);
        assert_eq!(value["nextId"], "b");
        assert!(value["prevId"].is_null());
        assert_eq!(value["timeGroup"], "afternoon");
    }
}
