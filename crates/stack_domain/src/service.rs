use std::collections::BTreeMap;

use chrono::{Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    chain::{HabitChain, RebuildReport},
    config::StackConfig,
    error::ChainError,
    metrics::{self, CompletionSummary, DailyBreakdown},
    record::{Completion, HabitDraft, HabitId, HabitPatch, HabitRecord, TimeGroup},
    streak::{self, DEFAULT_STREAK_LOOKBACK_DAYS},
};

/// Source of "today" and of creation timestamps.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
    fn timestamp(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn timestamp(&self) -> String {
        Local::now().to_rfc3339()
    }
}

/// Pins the service to one calendar day.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }

    fn timestamp(&self) -> String {
        Utc.from_utc_datetime(&self.0.and_time(NaiveTime::MIN))
            .to_rfc3339()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateOutcome {
    pub created: HabitRecord,
    pub touched_neighbors: Vec<HabitRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub removed_id: HabitId,
    pub touched_neighbors: Vec<HabitRecord>,
}

/// The habit-stack engine handed to the presentation layer. Owns the chain;
/// every mutation returns the records a caller has to persist.
pub struct HabitStackService {
    chain: HabitChain,
    clock: Box<dyn Clock>,
    streak_lookback_days: u32,
}

pub struct HabitStackServiceBuilder {
    clock: Box<dyn Clock>,
    streak_lookback_days: u32,
}

impl HabitStackServiceBuilder {
    pub fn new() -> Self {
        Self {
            clock: Box::new(SystemClock),
            streak_lookback_days: DEFAULT_STREAK_LOOKBACK_DAYS,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_streak_lookback(mut self, days: u32) -> Self {
        self.streak_lookback_days = days;
        self
    }

    pub fn with_config(self, config: &StackConfig) -> Self {
        self.with_streak_lookback(config.streak_lookback_days)
    }

    pub fn build(self) -> HabitStackService {
        HabitStackService {
            chain: HabitChain::new(),
            clock: self.clock,
            streak_lookback_days: self.streak_lookback_days,
        }
    }
}

impl Default for HabitStackServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HabitStackService {
    pub fn builder() -> HabitStackServiceBuilder {
        HabitStackServiceBuilder::new()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn chain(&self) -> &HabitChain {
        &self.chain
    }

    /// Replaces local state with a store snapshot and refreshes every
    /// cached streak against today.
    pub fn load_snapshot(&mut self, records: Vec<HabitRecord>) -> RebuildReport {
        let report = self.chain.rebuild(records);
        let refreshed = self.refresh_streaks().len();
        info!(
            habits = self.chain.len(),
            dropped = report.dropped.len(),
            refreshed,
            "loaded habit snapshot"
        );
        report
    }

    pub fn ordered_habits(&self) -> Vec<HabitRecord> {
        self.chain.to_ordered_list()
    }

    pub fn find(&self, id: &str) -> Option<&HabitRecord> {
        self.chain.find(id)
    }

    /// Creates a record from `draft`, appended to its group when `anchor`
    /// is `None`, otherwise linked right after the anchor.
    pub fn create_after(
        &mut self,
        anchor: Option<&str>,
        mut draft: HabitDraft,
    ) -> Result<CreateOutcome, ChainError> {
        // An untagged draft joins its anchor's group.
        if draft.time_group.is_none() {
            draft.time_group = anchor
                .and_then(|id| self.chain.find(id))
                .map(|anchor| anchor.time_group);
        }
        let record = draft.into_record(self.fresh_id(), self.clock.timestamp())?;
        let outcome = match anchor {
            None => {
                self.chain.append(record.clone())?;
                CreateOutcome {
                    created: record,
                    touched_neighbors: Vec::new(),
                }
            }
            Some(anchor) => {
                let inserted = self.chain.insert_after(anchor, record)?;
                CreateOutcome {
                    touched_neighbors: inserted.neighbors(),
                    created: inserted.inserted,
                }
            }
        };
        debug!(id = %outcome.created.id, touched = outcome.touched_neighbors.len(), "created habit");
        Ok(outcome)
    }

    pub fn delete_habit(&mut self, id: &str) -> Result<DeleteOutcome, ChainError> {
        let outcome = self.chain.remove(id)?;
        Ok(DeleteOutcome {
            touched_neighbors: outcome.neighbors(),
            removed_id: outcome.removed.id,
        })
    }

    pub fn update_habit(
        &mut self,
        id: &str,
        patch: HabitPatch,
    ) -> Result<Vec<HabitRecord>, ChainError> {
        self.chain.update_touched(id, patch)
    }

    /// Stores the outcome for `date` and recomputes the cached streak
    /// before returning the record.
    pub fn record_completion(
        &mut self,
        id: &str,
        date: NaiveDate,
        outcome: Completion,
    ) -> Result<HabitRecord, ChainError> {
        let today = self.clock.today();
        let lookback = self.streak_lookback_days;
        let record = self
            .chain
            .get_mut(id)
            .ok_or_else(|| ChainError::NotFound(id.into()))?;
        record.set_completion(date, outcome);
        streak::refresh_streak(record, today, lookback);
        debug!(%id, %date, ?outcome, streak = record.streak, "recorded completion");
        Ok(record.clone())
    }

    /// Recomputes every cached streak against today, e.g. after midnight.
    /// Returns the records whose streak changed.
    pub fn refresh_streaks(&mut self) -> Vec<HabitRecord> {
        let today = self.clock.today();
        let lookback = self.streak_lookback_days;
        let mut changed: Vec<HabitRecord> = self
            .chain
            .records_mut()
            .filter_map(|record| {
                streak::refresh_streak(record, today, lookback).then(|| record.clone())
            })
            .collect();
        changed.sort_by(|a, b| a.id.cmp(&b.id));
        changed
    }

    pub fn habits_due(&self, date: NaiveDate) -> Vec<HabitRecord> {
        metrics::due_on(self.chain.ordered(), date)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn daily_metrics(&self, date: NaiveDate) -> CompletionSummary {
        metrics::daily_metrics(self.chain.ordered(), date)
    }

    pub fn weekly_metrics(&self, date: NaiveDate) -> CompletionSummary {
        metrics::weekly_metrics(self.chain.ordered(), date)
    }

    pub fn weekly_breakdown(&self, date: NaiveDate) -> Vec<DailyBreakdown> {
        metrics::weekly_breakdown(self.chain.ordered(), date)
    }

    pub fn group_metrics(&self, date: NaiveDate) -> BTreeMap<TimeGroup, CompletionSummary> {
        metrics::group_metrics(self.chain.ordered(), date)
    }

    fn fresh_id(&self) -> HabitId {
        loop {
            let id = HabitId::generate();
            if !self.chain.contains(id.as_str()) {
                return id;
            }
        }
    }
}
