use std::collections::VecDeque;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use stack_domain::chain::RebuildReport;
use stack_domain::metrics::{CompletionSummary, DailyBreakdown};
use stack_domain::service::{CreateOutcome, DeleteOutcome, HabitStackService};
use stack_domain::{ChainError, Completion, HabitDraft, HabitPatch, HabitRecord};

use crate::document::HabitDocument;
use crate::store::{HabitStore, StoreError};

/// One write waiting to reach the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PersistJob {
    Put(HabitDocument),
    Delete(String),
}

impl PersistJob {
    pub fn id(&self) -> &str {
        match self {
            PersistJob::Put(doc) => &doc.id,
            PersistJob::Delete(id) => id,
        }
    }
}

#[derive(Debug)]
pub struct PersistFailure {
    pub job: PersistJob,
    pub error: StoreError,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub persisted: usize,
    pub failures: Vec<PersistFailure>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Applied(RebuildReport),
    /// Local writes were still queued, so the snapshot predates them.
    Deferred { pending: usize },
}

/// Couples the in-memory habit service to a store.
///
/// Mutations apply locally at once and queue the changed records; `flush`
/// sends the queue. Reads never wait on the store. Snapshots arriving while
/// writes are queued are skipped: the store's echo of those writes will
/// follow. There is no retry and no versioning beyond that, so the last
/// write to reach the store wins.
pub struct StackSync<S> {
    service: HabitStackService,
    store: S,
    pending_jobs: VecDeque<PersistJob>,
}

impl<S: HabitStore> StackSync<S> {
    pub fn new(service: HabitStackService, store: S) -> Self {
        Self {
            service,
            store,
            pending_jobs: VecDeque::new(),
        }
    }

    pub fn service(&self) -> &HabitStackService {
        &self.service
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pending_jobs(&self) -> usize {
        self.pending_jobs.len()
    }

    pub fn ordered_habits(&self) -> Vec<HabitRecord> {
        self.service.ordered_habits()
    }

    pub fn find(&self, id: &str) -> Option<&HabitRecord> {
        self.service.find(id)
    }

    pub fn habits_due(&self, date: NaiveDate) -> Vec<HabitRecord> {
        self.service.habits_due(date)
    }

    pub fn daily_metrics(&self, date: NaiveDate) -> CompletionSummary {
        self.service.daily_metrics(date)
    }

    pub fn weekly_metrics(&self, date: NaiveDate) -> CompletionSummary {
        self.service.weekly_metrics(date)
    }

    pub fn weekly_breakdown(&self, date: NaiveDate) -> Vec<DailyBreakdown> {
        self.service.weekly_breakdown(date)
    }

    pub fn create_after(
        &mut self,
        anchor: Option<&str>,
        draft: HabitDraft,
    ) -> Result<CreateOutcome, ChainError> {
        let outcome = self.service.create_after(anchor, draft)?;
        self.queue_put(&outcome.created);
        for neighbor in &outcome.touched_neighbors {
            self.queue_put(neighbor);
        }
        Ok(outcome)
    }

    pub fn delete_habit(&mut self, id: &str) -> Result<DeleteOutcome, ChainError> {
        let outcome = self.service.delete_habit(id)?;
        self.queue_delete(outcome.removed_id.as_str());
        for neighbor in &outcome.touched_neighbors {
            self.queue_put(neighbor);
        }
        Ok(outcome)
    }

    pub fn update_habit(
        &mut self,
        id: &str,
        patch: HabitPatch,
    ) -> Result<Vec<HabitRecord>, ChainError> {
        let touched = self.service.update_habit(id, patch)?;
        for record in &touched {
            self.queue_put(record);
        }
        Ok(touched)
    }

    pub fn record_completion(
        &mut self,
        id: &str,
        date: NaiveDate,
        outcome: Completion,
    ) -> Result<HabitRecord, ChainError> {
        let record = self.service.record_completion(id, date, outcome)?;
        self.queue_put(&record);
        Ok(record)
    }

    pub fn refresh_streaks(&mut self) -> usize {
        let changed = self.service.refresh_streaks();
        for record in &changed {
            self.queue_put(record);
        }
        changed.len()
    }

    /// Queues the records a rebuild had to rewrite so the store converges
    /// on the repaired links.
    pub fn queue_repairs(&mut self, report: &RebuildReport) {
        for record in &report.repaired {
            self.queue_put(record);
        }
    }

    /// Sends every queued write. Failed writes are reported, not retried.
    #[instrument(skip(self))]
    pub async fn flush(&mut self) -> SyncReport {
        let mut report = SyncReport::default();
        while let Some(job) = self.pending_jobs.pop_front() {
            let result = match &job {
                PersistJob::Put(doc) => self.store.put(doc).await,
                PersistJob::Delete(id) => self.store.remove(id).await,
            };
            match result {
                Ok(()) => report.persisted += 1,
                Err(error) => {
                    warn!(id = job.id(), %error, "habit write failed");
                    report.failures.push(PersistFailure { job, error });
                }
            }
        }
        debug!(
            persisted = report.persisted,
            failed = report.failures.len(),
            "flushed habit writes"
        );
        report
    }

    /// Rebuilds local state from a pushed snapshot unless writes are queued.
    pub fn apply_snapshot(&mut self, documents: Vec<HabitDocument>) -> SnapshotOutcome {
        if !self.pending_jobs.is_empty() {
            info!(
                pending = self.pending_jobs.len(),
                "skipping store snapshot while local writes are queued"
            );
            return SnapshotOutcome::Deferred {
                pending: self.pending_jobs.len(),
            };
        }
        let records = documents.into_iter().map(HabitRecord::from).collect();
        SnapshotOutcome::Applied(self.service.load_snapshot(records))
    }

    #[instrument(skip(self))]
    pub async fn refresh_from_store(&mut self) -> Result<SnapshotOutcome, StoreError> {
        if !self.pending_jobs.is_empty() {
            return Ok(SnapshotOutcome::Deferred {
                pending: self.pending_jobs.len(),
            });
        }
        let documents = self.store.load_all().await?;
        Ok(self.apply_snapshot(documents))
    }

    /// Queues an upsert; an earlier queued write for the same id is replaced.
    fn queue_put(&mut self, record: &HabitRecord) {
        let doc = HabitDocument::from(record);
        if let Some(existing) = self
            .pending_jobs
            .iter_mut()
            .find(|job| matches!(job, PersistJob::Put(queued) if queued.id == doc.id))
        {
            *existing = PersistJob::Put(doc);
            return;
        }
        self.pending_jobs.push_back(PersistJob::Put(doc));
    }

    fn queue_delete(&mut self, id: &str) {
        self.pending_jobs.retain(|job| job.id() != id);
        self.pending_jobs.push_back(PersistJob::Delete(id.to_string()));
    }
}
