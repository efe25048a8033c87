//! Record selector: filter composition plus the dispatch gate.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::StatusFields;
use crate::dispatch::outcome::OutcomeStatus;
use crate::filter::{FilterLogic, FilterSpec, evaluate};
use crate::record::Record;

/// Counts of what happened to the fetched records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionStats {
    pub fetched: usize,
    pub matched_filters: usize,
    /// Dropped: no value in the key field.
    pub missing_key: usize,
    /// Dropped: status already holds the success marker.
    pub already_sent: usize,
    /// Dropped: record id seen earlier in the same batch.
    pub duplicates: usize,
    pub selected: usize,
}

/// Records chosen for dispatch, in fetch order.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub records: Vec<Record>,
    pub stats: SelectionStats,
}

/// Applies the configured filters and the dispatch gate.
pub struct RecordSelector {
    filters: Vec<FilterSpec>,
    logic: FilterLogic,
    fields: StatusFields,
    force: bool,
}

impl RecordSelector {
    pub fn new(filters: Vec<FilterSpec>, logic: FilterLogic, fields: StatusFields) -> Self {
        Self {
            filters,
            logic,
            fields,
            force: false,
        }
    }

    /// Re-select records that already hold the success marker.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn force(&self) -> bool {
        self.force
    }

    /// Whether a record satisfies the configured filters.
    /// No filters means every record matches.
    pub fn matches_filters(&self, record: &Record) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        let mut results = self.filters.iter().map(|spec| evaluate(spec, record));
        match self.logic {
            FilterLogic::And => results.all(|matched| matched),
            FilterLogic::Or => results.any(|matched| matched),
        }
    }

    /// Whether a record can and should be dispatched to, ignoring filters.
    pub fn passes_gate(&self, record: &Record) -> GateDecision {
        let has_key = record
            .field(&self.fields.key)
            .is_some_and(|v| !v.to_text().trim().is_empty());
        if !has_key {
            return GateDecision::MissingKey;
        }
        if !self.force && record.text(&self.fields.status) == OutcomeStatus::Success.as_str() {
            return GateDecision::AlreadySent;
        }
        GateDecision::Pass
    }

    /// Select the records to dispatch. Each record id is selected at most once.
    pub fn select(&self, records: Vec<Record>) -> Selection {
        let mut stats = SelectionStats {
            fetched: records.len(),
            ..Default::default()
        };

        if !self.filters.is_empty() {
            info!(
                count = self.filters.len(),
                logic = %self.logic,
                "Applying filters"
            );
        }

        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        for record in records {
            if !self.matches_filters(&record) {
                continue;
            }
            stats.matched_filters += 1;

            match self.passes_gate(&record) {
                GateDecision::MissingKey => {
                    debug!(record_id = record.id, field = %self.fields.key, "Skipping record without key");
                    stats.missing_key += 1;
                    continue;
                }
                GateDecision::AlreadySent => {
                    debug!(record_id = record.id, "Skipping record already sent");
                    stats.already_sent += 1;
                    continue;
                }
                GateDecision::Pass => {}
            }

            if !seen.insert(record.id) {
                stats.duplicates += 1;
                continue;
            }
            selected.push(record);
        }

        stats.selected = selected.len();
        info!(
            fetched = stats.fetched,
            matched = stats.matched_filters,
            selected = stats.selected,
            force = self.force,
            "Records selected for dispatch"
        );

        Selection {
            records: selected,
            stats,
        }
    }
}

/// Outcome of the dispatch gate for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    MissingKey,
    AlreadySent,
}
