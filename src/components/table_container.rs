//! TableContainer: per-table orchestration of search, redaction and visualizations
//!
//! # Overview
//!
//! `TableContainer` owns the current [`Table`] snapshot of one consent table and
//! the search state applied on top of it. Every mutation replaces the snapshot
//! wholesale: deletions and undo go through the redaction ledger, which hands
//! back a new table, after which the active search is evaluated again over the
//! new body.
//!
//! ## Search
//!
//! Query text is debounced. `set_query` only records a deadline; the caller
//! drives time by calling `tick` with the current instant, which evaluates the
//! query once the quiet period has elapsed. Changing the type filter, deleting
//! and undoing take effect immediately but reuse the last evaluated text, so a
//! pending query keeps its deadline.
//!
//! ## Visualizations
//!
//! `visualization_requests` produces one request per configured visualization
//! for the background worker, each with a fresh token. Older requests for the
//! same visualization are cancelled and their responses are discarded by
//! `accept`, so only the newest result ever lands in `status`.
//!
//! ```rust,ignore
//! let mut container = TableContainer::new(table, &config);
//! container.set_query("amsterdam", Instant::now());
//! // ... later, from the UI loop
//! if container.tick(Instant::now()) {
//!     for request in container.visualization_requests() {
//!         worker.submit(request);
//!     }
//! }
//! ```

use crate::config::Config;
use crate::core::{RequestToken, Row, RowId, Table, Translatable};
use crate::services::redaction::{apply_deletion, undo_last};
use crate::services::search_service::{SearchOutcome, SearchQuery, SearchService};
use crate::services::worker::{PrepareRequest, PrepareResponse, VisualizationKey, VisualizationStatus};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Search parameters plus the outcome of their last evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    pub query: SearchQuery,
    /// Instant after which the pending query text is evaluated
    pub pending_until: Option<Instant>,
    /// Query text the current outcome was computed from
    pub evaluated_text: String,
    pub outcome: SearchOutcome,
}

/// A selectable value of the type-bearing column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone)]
struct Outstanding {
    token: RequestToken,
    cancel: CancellationToken,
}

pub struct TableContainer {
    table: Table,
    search: SearchState,
    debounce: Duration,
    type_column: usize,
    data_types: BTreeMap<String, Translatable>,
    outstanding: HashMap<usize, Outstanding>,
    statuses: Vec<VisualizationStatus>,
    visualizations_stale: bool,
}

impl TableContainer {
    pub fn new(table: Table, config: &Config) -> Self {
        let statuses = vec![VisualizationStatus::Loading; table.visualizations().len()];
        Self {
            table,
            search: SearchState::default(),
            debounce: config.debounce(),
            type_column: config.search.type_column,
            data_types: config.data_types.clone(),
            outstanding: HashMap::new(),
            statuses,
            visualizations_stale: true,
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn search_state(&self) -> &SearchState {
        &self.search
    }

    /// Body rows narrowed by the current search outcome
    pub fn visible_rows(&self) -> Vec<&Row> {
        self.search.outcome.apply(self.table.body())
    }

    /// Record new query text; evaluation happens in `tick` after the debounce
    pub fn set_query(&mut self, text: impl Into<String>, now: Instant) {
        self.search.query.text = text.into();
        self.search.pending_until = Some(now + self.debounce);
    }

    /// Evaluate a pending query whose debounce has elapsed
    ///
    /// Returns true when the visible rows were recomputed.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.search.pending_until {
            Some(deadline) if now >= deadline => {
                self.evaluate_search();
                true
            }
            _ => false,
        }
    }

    /// Evaluate a pending query right away, ignoring the debounce
    pub fn flush(&mut self) {
        if self.search.pending_until.is_some() {
            self.evaluate_search();
        }
    }

    /// Apply a type filter right away; pending query text stays pending
    pub fn set_type_filter(&mut self, type_filter: Option<String>) {
        self.search.query.type_filter = type_filter;
        self.recompute_outcome();
    }

    fn evaluate_search(&mut self) {
        self.search.pending_until = None;
        self.search.evaluated_text = self.search.query.text.clone();
        self.recompute_outcome();
    }

    /// Rerun the last evaluated query over the current body
    fn recompute_outcome(&mut self) {
        let query = SearchQuery {
            text: self.search.evaluated_text.clone(),
            type_filter: self.search.query.type_filter.clone(),
        };
        self.search.outcome = SearchService::search(self.table.body(), &query, self.type_column);
        self.visualizations_stale = true;
    }

    fn reset_search(&mut self) {
        debug!(table = %self.table.id, "Resetting search after deleting every visible row");
        self.search = SearchState::default();
    }

    /// Delete a batch of rows through the ledger
    ///
    /// Deleting exactly as many rows as are visible clears the search, so an
    /// emptied filter cannot keep hiding the rest of the table.
    pub fn delete(&mut self, batch: impl IntoIterator<Item = RowId>) {
        let batch: BTreeSet<RowId> = batch.into_iter().collect();
        if batch.is_empty() {
            return;
        }
        let deletes_all_visible = batch.len() == self.visible_rows().len();

        let table = self.table.clone();
        self.table = apply_deletion(table, batch);
        if deletes_all_visible {
            self.reset_search();
        }
        self.recompute_outcome();
        info!(
            table = %self.table.id,
            deleted = self.table.deleted_row_count(),
            remaining = self.table.body().len(),
            "Rows deleted"
        );
    }

    /// Delete every currently visible row
    pub fn delete_visible(&mut self) {
        let batch: Vec<RowId> = self.visible_rows().iter().map(|row| row.id.clone()).collect();
        self.delete(batch);
    }

    pub fn undo(&mut self) {
        if self.table.deleted_rows().is_empty() {
            return;
        }
        let table = self.table.clone();
        self.table = undo_last(table);
        self.recompute_outcome();
        info!(table = %self.table.id, deleted = self.table.deleted_row_count(), "Deletion undone");
    }

    pub fn can_undo(&self) -> bool {
        !self.table.deleted_rows().is_empty()
    }

    /// True when the visible rows changed since the last requests were built
    pub fn needs_visualization_refresh(&self) -> bool {
        self.visualizations_stale
    }

    /// Build one preparation request per visualization over the visible rows
    ///
    /// Supersedes every outstanding request of this table.
    pub fn visualization_requests(&mut self) -> Vec<PrepareRequest> {
        self.visualizations_stale = false;
        if self.table.visualizations().is_empty() {
            return Vec::new();
        }

        let rows: Vec<Row> = self.visible_rows().into_iter().cloned().collect();
        let snapshot = Arc::new(self.table.visible_snapshot(rows));

        let requests: Vec<PrepareRequest> = self
            .table
            .visualizations()
            .iter()
            .enumerate()
            .map(|(index, descriptor)| {
                if let Some(previous) = self.outstanding.remove(&index) {
                    trace!(token = %previous.token, index, "Superseding visualization request");
                    previous.cancel.cancel();
                }
                let token = RequestToken::new();
                let cancel = CancellationToken::new();
                self.outstanding.insert(
                    index,
                    Outstanding {
                        token,
                        cancel: cancel.clone(),
                    },
                );
                self.statuses[index] = VisualizationStatus::Loading;
                PrepareRequest {
                    token,
                    key: VisualizationKey {
                        table_id: self.table.id.clone(),
                        index,
                    },
                    table: Arc::clone(&snapshot),
                    descriptor: descriptor.clone(),
                    cancel,
                }
            })
            .collect();

        debug!(table = %self.table.id, requests = requests.len(), "Built visualization requests");
        requests
    }

    /// Store a worker response; returns false when it is stale
    pub fn accept(&mut self, response: PrepareResponse) -> bool {
        let PrepareResponse { token, key, status } = response;
        if key.table_id != self.table.id {
            return false;
        }
        match self.outstanding.get(&key.index) {
            Some(latest) if latest.token == token => {
                self.outstanding.remove(&key.index);
                self.statuses[key.index] = status;
                true
            }
            _ => {
                trace!(token = %token, index = key.index, "Discarding stale visualization response");
                false
            }
        }
    }

    pub fn status(&self, index: usize) -> Option<&VisualizationStatus> {
        self.statuses.get(index)
    }

    pub fn statuses(&self) -> &[VisualizationStatus] {
        &self.statuses
    }

    /// Distinct type values of the original rows, labeled from the data-type catalog
    pub fn type_options(&self, locale: &str) -> Vec<TypeOption> {
        let mut seen = HashSet::new();
        self.table
            .original_body()
            .iter()
            .filter_map(|row| row.cells.get(self.type_column))
            .filter(|value| seen.insert(value.as_str()))
            .map(|value| TypeOption {
                value: value.clone(),
                label: self
                    .data_types
                    .get(value)
                    .map(|label| label.text(locale).to_string())
                    .unwrap_or_else(|| value.clone()),
            })
            .collect()
    }
}
