use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ChainError;
use crate::record::{HabitId, HabitPatch, HabitRecord, TimeGroup};

/// Arena of habit records keyed by id, with one doubly-linked ordering per
/// time group.
///
/// `heads` keeps, per group, the chain heads in display order. Records are
/// only reachable through a head; every structural mutation keeps the
/// links symmetric, acyclic and the predecessor labels in step with the
/// predecessor's action label.
#[derive(Debug, Clone, Default)]
pub struct HabitChain {
    records: HashMap<HabitId, HabitRecord>,
    heads: BTreeMap<TimeGroup, Vec<HabitId>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertOutcome {
    pub anchor: HabitRecord,
    pub inserted: HabitRecord,
    pub successor: Option<HabitRecord>,
}

impl InsertOutcome {
    /// Neighbors that changed besides the inserted record.
    pub fn neighbors(&self) -> Vec<HabitRecord> {
        std::iter::once(self.anchor.clone())
            .chain(self.successor.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoveOutcome {
    pub predecessor: Option<HabitRecord>,
    pub successor: Option<HabitRecord>,
    pub removed: HabitRecord,
}

impl RemoveOutcome {
    pub fn neighbors(&self) -> Vec<HabitRecord> {
        self.predecessor
            .iter()
            .chain(self.successor.iter())
            .cloned()
            .collect()
    }
}

/// What `rebuild` did with its input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Records placed into a chain.
    pub chained: usize,
    /// Records no head walk reached; they are not part of the chain.
    pub dropped: Vec<HabitRecord>,
    /// Ids seen more than once; the first occurrence wins.
    pub duplicates: Vec<HabitId>,
    /// Link fields naming an id absent from the record's group.
    pub dangling_links: usize,
    /// Chained records whose stored links or labels were rewritten.
    pub repaired: Vec<HabitRecord>,
}

impl RebuildReport {
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty()
            && self.duplicates.is_empty()
            && self.dangling_links == 0
            && self.repaired.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IntegrityIssue {
    Asymmetric { from: HabitId, to: HabitId },
    MissingLink { from: HabitId, to: HabitId },
    CrossGroup { from: HabitId, to: HabitId },
    StaleLabel { id: HabitId },
    Cycle { id: HabitId },
    Unreachable { id: HabitId },
}

impl HabitChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&HabitRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn heads(&self, group: TimeGroup) -> &[HabitId] {
        self.heads.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Adds `record` as a new single-node chain after the group's existing chains.
    pub fn append(&mut self, mut record: HabitRecord) -> Result<(), ChainError> {
        if self.records.contains_key(record.id.as_str()) {
            return Err(ChainError::DuplicateId(record.id));
        }
        record.clear_links();
        debug!(id = %record.id, group = %record.time_group, "appending habit");
        self.heads
            .entry(record.time_group)
            .or_default()
            .push(record.id.clone());
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    /// Links `record` directly after `anchor_id`, which must live in the
    /// record's time group.
    pub fn insert_after(
        &mut self,
        anchor_id: &str,
        mut record: HabitRecord,
    ) -> Result<InsertOutcome, ChainError> {
        if self.records.contains_key(record.id.as_str()) {
            return Err(ChainError::DuplicateId(record.id));
        }
        let anchor = self
            .records
            .get(anchor_id)
            .ok_or_else(|| ChainError::NotFound(anchor_id.into()))?;
        if anchor.time_group != record.time_group {
            return Err(ChainError::NotInGroup {
                id: anchor_id.into(),
                group: record.time_group,
            });
        }
        let anchor_key = anchor.id.clone();
        let prior_successor = anchor.successor_id.clone();

        record.predecessor_id = Some(anchor_key.clone());
        record.anchor_id = Some(anchor_key.clone());
        record.successor_id = prior_successor.clone();
        record.predecessor_label = anchor.action_label.clone();

        let new_id = record.id.clone();
        let new_label = record.action_label.clone();
        debug!(id = %new_id, anchor = %anchor_key, "inserting habit after anchor");

        let anchor = self
            .records
            .get_mut(anchor_id)
            .ok_or_else(|| ChainError::NotFound(anchor_id.into()))?;
        anchor.successor_id = Some(new_id.clone());
        let anchor = anchor.clone();

        let successor = prior_successor
            .and_then(|next_id| self.records.get_mut(next_id.as_str()))
            .map(|next| {
                next.predecessor_id = Some(new_id.clone());
                next.anchor_id = Some(new_id.clone());
                next.predecessor_label = new_label;
                next.clone()
            });

        self.records.insert(new_id, record.clone());
        Ok(InsertOutcome {
            anchor,
            inserted: record,
            successor,
        })
    }

    /// Unlinks `id` and joins its neighbors to each other.
    pub fn remove(&mut self, id: &str) -> Result<RemoveOutcome, ChainError> {
        let removed = self
            .records
            .remove(id)
            .ok_or_else(|| ChainError::NotFound(id.into()))?;
        let next_id = removed.successor_id.clone();

        let predecessor = removed
            .predecessor_id
            .as_ref()
            .and_then(|prev_id| self.records.get_mut(prev_id.as_str()))
            .map(|prev| {
                prev.successor_id = next_id.clone();
                prev.clone()
            });
        let prev_id = predecessor.as_ref().map(|prev| prev.id.clone());
        let prev_label = predecessor
            .as_ref()
            .map(|prev| prev.action_label.clone())
            .unwrap_or_default();

        let successor = next_id
            .as_ref()
            .and_then(|next_id| self.records.get_mut(next_id.as_str()))
            .map(|next| {
                next.predecessor_id = prev_id.clone();
                next.anchor_id = prev_id.clone();
                next.predecessor_label = prev_label;
                next.clone()
            });

        let group = removed.time_group;
        if let Some(heads) = self.heads.get_mut(&group) {
            let position = heads.iter().position(|head| head.as_str() == id);
            let promoted = successor
                .as_ref()
                .filter(|next| next.predecessor_id.is_none())
                .map(|next| next.id.clone());
            match (position, promoted) {
                (Some(pos), Some(next)) => heads[pos] = next,
                (Some(pos), None) => {
                    heads.remove(pos);
                }
                (None, Some(next)) => heads.push(next),
                (None, None) => {}
            }
            if heads.is_empty() {
                self.heads.remove(&group);
            }
        }

        debug!(%id, "removed habit from chain");
        Ok(RemoveOutcome {
            predecessor,
            successor,
            removed,
        })
    }

    pub fn update(&mut self, id: &str, patch: HabitPatch) -> bool {
        self.update_touched(id, patch).is_ok()
    }

    /// Applies a non-structural patch. Returns the updated record, plus its
    /// successor when the action label change had to be copied forward.
    pub fn update_touched(
        &mut self,
        id: &str,
        patch: HabitPatch,
    ) -> Result<Vec<HabitRecord>, ChainError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| ChainError::NotFound(id.into()))?;
        let action_changed = patch.apply(record)?;
        let mut touched = vec![record.clone()];
        if action_changed {
            let label = record.action_label.clone();
            if let Some(next) = record
                .successor_id
                .clone()
                .and_then(|next_id| self.records.get_mut(next_id.as_str()))
            {
                next.predecessor_label = label;
                touched.push(next.clone());
            }
        }
        Ok(touched)
    }

    /// Mutable access for non-link fields (completions, streak).
    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut HabitRecord> {
        self.records.get_mut(id)
    }

    pub(crate) fn records_mut(&mut self) -> impl Iterator<Item = &mut HabitRecord> {
        self.records.values_mut()
    }

    /// Replaces the whole chain with one reconstructed from an unordered
    /// collection.
    ///
    /// Heads are records with no predecessor or a predecessor absent from
    /// their group. Each head is walked forward until the successor is
    /// absent, unresolved or already visited. Records no walk reaches are
    /// dropped and listed in the report.
    pub fn rebuild(&mut self, records: Vec<HabitRecord>) -> RebuildReport {
        let mut report = RebuildReport::default();
        let mut seen: HashSet<HabitId> = HashSet::new();
        let mut by_group: BTreeMap<TimeGroup, Vec<HabitRecord>> = BTreeMap::new();
        for record in records {
            if !seen.insert(record.id.clone()) {
                warn!(id = %record.id, "duplicate habit id in snapshot; keeping first");
                report.duplicates.push(record.id);
                continue;
            }
            by_group.entry(record.time_group).or_default().push(record);
        }

        // Chains that were already heads keep their place.
        let previous_heads: HashMap<HabitId, usize> = self
            .heads
            .values()
            .flat_map(|heads| heads.iter().cloned().enumerate().map(|(pos, id)| (id, pos)))
            .collect();
        self.records.clear();
        self.heads.clear();
        for (group, members) in by_group {
            self.rebuild_group(group, members, &previous_heads, &mut report);
        }

        if !report.dropped.is_empty() {
            let dropped: Vec<&str> = report.dropped.iter().map(|r| r.id.as_str()).collect();
            warn!(
                count = dropped.len(),
                ?dropped,
                "habit records unreachable from any chain head were dropped"
            );
        }
        debug!(
            chained = report.chained,
            dangling = report.dangling_links,
            repaired = report.repaired.len(),
            "rebuilt habit chains"
        );
        report
    }

    fn rebuild_group(
        &mut self,
        group: TimeGroup,
        mut members: Vec<HabitRecord>,
        previous_heads: &HashMap<HabitId, usize>,
        report: &mut RebuildReport,
    ) {
        let index: HashMap<HabitId, usize> = members
            .iter()
            .enumerate()
            .map(|(pos, record)| (record.id.clone(), pos))
            .collect();
        let mut visited = vec![false; members.len()];
        let mut chains: Vec<Vec<usize>> = Vec::new();

        for pos in 0..members.len() {
            let is_head = match &members[pos].predecessor_id {
                None => true,
                Some(prev) if index.contains_key(prev) => false,
                Some(prev) => {
                    debug!(id = %members[pos].id, %prev, "dangling predecessor; treating as head");
                    report.dangling_links += 1;
                    true
                }
            };
            if !is_head || visited[pos] {
                continue;
            }

            let mut chain = Vec::new();
            let mut cursor = Some(pos);
            while let Some(current) = cursor {
                if visited[current] {
                    debug!(id = %members[current].id, "successor already visited; stopping walk");
                    break;
                }
                visited[current] = true;
                chain.push(current);
                cursor = match &members[current].successor_id {
                    None => None,
                    Some(next) => match index.get(next) {
                        Some(&next_pos) => Some(next_pos),
                        None => {
                            debug!(id = %members[current].id, %next, "dangling successor; ending chain");
                            report.dangling_links += 1;
                            None
                        }
                    },
                };
            }
            chains.push(chain);
        }

        for chain in &chains {
            for (step, &pos) in chain.iter().enumerate() {
                let (prev_id, prev_label) = match step.checked_sub(1).map(|p| &members[chain[p]]) {
                    Some(prev) => (Some(prev.id.clone()), prev.action_label.clone()),
                    None => (None, String::new()),
                };
                let next_id = chain.get(step + 1).map(|&next| members[next].id.clone());
                let record = &mut members[pos];
                let changed = record.predecessor_id != prev_id
                    || record.successor_id != next_id
                    || record.predecessor_label != prev_label
                    || record.anchor_id != prev_id;
                record.predecessor_id = prev_id.clone();
                record.anchor_id = prev_id;
                record.successor_id = next_id;
                record.predecessor_label = prev_label;
                if changed {
                    report.repaired.push(record.clone());
                }
            }
        }

        // Separate chains follow their previous position, then creation
        // time, then id, so the snapshot's record order never matters.
        chains.sort_by_cached_key(|chain| {
            chain.first().map(|&pos| {
                let head = &members[pos];
                (
                    previous_heads.get(&head.id).copied().unwrap_or(usize::MAX),
                    head.created_instant().unwrap_or(NaiveDateTime::MAX),
                    head.id.clone(),
                )
            })
        });

        let heads: Vec<HabitId> = chains
            .iter()
            .filter_map(|chain| chain.first().map(|&pos| members[pos].id.clone()))
            .collect();
        if !heads.is_empty() {
            self.heads.insert(group, heads);
        }

        for (pos, record) in members.into_iter().enumerate() {
            if visited[pos] {
                report.chained += 1;
                self.records.insert(record.id.clone(), record);
            } else {
                report.dropped.push(record);
            }
        }
    }

    /// One group's records, head to tail, chain by chain.
    pub fn ordered_group(&self, group: TimeGroup) -> Vec<&HabitRecord> {
        let mut ordered = Vec::new();
        for head in self.heads(group) {
            let mut cursor = self.records.get(head.as_str());
            while let Some(record) = cursor {
                if ordered.len() >= self.records.len() {
                    break;
                }
                ordered.push(record);
                cursor = record
                    .successor_id
                    .as_ref()
                    .and_then(|next| self.records.get(next.as_str()));
            }
        }
        ordered
    }

    /// Every group in `TimeGroup` order, each head to tail.
    pub fn ordered(&self) -> Vec<&HabitRecord> {
        self.heads
            .keys()
            .flat_map(|group| self.ordered_group(*group))
            .collect()
    }

    pub fn to_ordered_list(&self) -> Vec<HabitRecord> {
        self.ordered().into_iter().cloned().collect()
    }

    /// Checks every chain invariant; empty when the chain is consistent.
    pub fn integrity_issues(&self) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();
        for record in self.records.values() {
            if let Some(next_id) = &record.successor_id {
                match self.records.get(next_id.as_str()) {
                    None => issues.push(IntegrityIssue::MissingLink {
                        from: record.id.clone(),
                        to: next_id.clone(),
                    }),
                    Some(next) if next.time_group != record.time_group => {
                        issues.push(IntegrityIssue::CrossGroup {
                            from: record.id.clone(),
                            to: next_id.clone(),
                        })
                    }
                    Some(next) if next.predecessor_id.as_ref() != Some(&record.id) => {
                        issues.push(IntegrityIssue::Asymmetric {
                            from: record.id.clone(),
                            to: next_id.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }
            match &record.predecessor_id {
                Some(prev_id) => match self.records.get(prev_id.as_str()) {
                    None => issues.push(IntegrityIssue::MissingLink {
                        from: record.id.clone(),
                        to: prev_id.clone(),
                    }),
                    Some(prev) => {
                        if prev.successor_id.as_ref() != Some(&record.id) {
                            issues.push(IntegrityIssue::Asymmetric {
                                from: record.id.clone(),
                                to: prev_id.clone(),
                            });
                        }
                        if prev.action_label != record.predecessor_label {
                            issues.push(IntegrityIssue::StaleLabel {
                                id: record.id.clone(),
                            });
                        }
                    }
                },
                None if !record.predecessor_label.is_empty() => {
                    issues.push(IntegrityIssue::StaleLabel {
                        id: record.id.clone(),
                    })
                }
                None => {}
            }
        }

        let mut reached: HashSet<&str> = HashSet::new();
        for heads in self.heads.values() {
            for head in heads {
                let mut cursor = self.records.get(head.as_str());
                while let Some(record) = cursor {
                    if !reached.insert(record.id.as_str()) {
                        issues.push(IntegrityIssue::Cycle {
                            id: record.id.clone(),
                        });
                        break;
                    }
                    cursor = record
                        .successor_id
                        .as_ref()
                        .and_then(|next| self.records.get(next.as_str()));
                }
            }
        }
        for id in self.records.keys() {
            if !reached.contains(id.as_str()) {
                issues.push(IntegrityIssue::Unreachable { id: id.clone() });
            }
        }
        issues
    }
}
