use chrono::{NaiveDate, Weekday};
use stack_domain::service::FixedClock;
use stack_domain::{Completion, HabitDraft, HabitPatch, HabitStackService, TimeGroup};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).expect("valid date")
}

fn labels(service: &HabitStackService) -> Vec<String> {
    service
        .ordered_habits()
        .into_iter()
        .map(|record| record.action_label)
        .collect()
}

#[test]
fn mixed_edits_keep_chains_consistent_and_reload_cleanly() {
    // Wednesday.
    let mut service = HabitStackService::builder()
        .with_clock(FixedClock(day(10)))
        .build();

    let wake = service
        .create_after(None, HabitDraft::new("make bed").in_group(TimeGroup::Morning))
        .expect("create head")
        .created;
    let water = service
        .create_after(
            Some(wake.id.as_str()),
            HabitDraft::new("drink water").in_group(TimeGroup::Morning),
        )
        .expect("insert after head")
        .created;
    let stretch = service
        .create_after(
            Some(water.id.as_str()),
            HabitDraft::new("stretch")
                .in_group(TimeGroup::Morning)
                .on_weekdays([Weekday::Mon, Weekday::Fri]),
        )
        .expect("insert tail")
        .created;
    let read = service
        .create_after(None, HabitDraft::new("read").in_group(TimeGroup::Night))
        .expect("create night head")
        .created;
    let floss = service
        .create_after(Some(read.id.as_str()), HabitDraft::new("floss").in_group(TimeGroup::Night))
        .expect("insert night step")
        .created;

    let touched = service
        .update_habit(
            water.id.as_str(),
            HabitPatch {
                action_label: Some("drink a glass of water".into()),
                ..HabitPatch::default()
            },
        )
        .expect("rename");
    assert_eq!(touched.len(), 2);
    assert_eq!(touched[1].id, stretch.id);
    assert_eq!(touched[1].predecessor_label, "drink a glass of water");

    let deleted = service.delete_habit(wake.id.as_str()).expect("delete head");
    assert_eq!(deleted.touched_neighbors.len(), 1);
    assert!(service.chain().integrity_issues().is_empty());
    assert_eq!(
        labels(&service),
        vec!["drink a glass of water", "stretch", "read", "floss"]
    );

    // Stretch is not due on a Wednesday, so three habits are due today.
    service
        .record_completion(water.id.as_str(), day(10), Completion::Done)
        .expect("complete water");
    service
        .record_completion(floss.id.as_str(), day(10), Completion::Done)
        .expect("complete floss");
    service
        .record_completion(read.id.as_str(), day(10), Completion::Skipped)
        .expect("skip read");
    let summary = service.daily_metrics(day(10));
    assert_eq!((summary.completed, summary.total, summary.rate), (2, 3, 67));
    assert_eq!(service.habits_due(day(12)).len(), 4);

    let mut snapshot = service.ordered_habits();
    snapshot.reverse();
    let mut reloaded = HabitStackService::builder()
        .with_clock(FixedClock(day(10)))
        .build();
    let report = reloaded.load_snapshot(snapshot);
    assert!(report.is_clean(), "unexpected repairs: {report:?}");
    assert_eq!(labels(&reloaded), labels(&service));
    assert_eq!(reloaded.find(water.id.as_str()).map(|r| r.streak), Some(1));
}

#[test]
fn outcomes_serialize_for_the_presentation_layer() {
    let mut service = HabitStackService::builder()
        .with_clock(FixedClock(day(1)))
        .build();
    let outcome = service
        .create_after(None, HabitDraft::new("meditate").in_group(TimeGroup::Evening))
        .expect("create");

    let value = serde_json::to_value(&outcome).expect("serialize outcome");
    assert_eq!(value["created"]["action_label"], "meditate");
    assert_eq!(value["created"]["time_group"], "evening");
    assert!(value["touched_neighbors"]
        .as_array()
        .is_some_and(|items| items.is_empty()));

    let summary = serde_json::to_value(service.weekly_metrics(day(1))).expect("serialize summary");
    assert_eq!(summary["total"], 7);
    assert_eq!(summary["rate"], 0);
}
