//! Sorted, diff-capable read view over the entity set
//!
//! Rows are ordered by `recorded_at` descending (newest first), ties broken
//! by id ascending. Every bus event is turned into a [`ProjectionDiff`] so a
//! table or list can redraw only what moved.
//!
//! Diff indices follow the usual model/view convention: `removed` refers to
//! positions before the update, `added` and `changed` to positions after it.
//! A status-only change is always a single in-place `changed` entry; it never
//! reorders rows.

use crate::status::StatusManager;
use chrono::{DateTime, Utc};
use memotrack_common::events::{BusError, CatalogEvent, Subscription};
use memotrack_common::{Recording, RecordingId, TranscriptionStatus};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a presentation layer shows for one recording
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowView {
    pub id: RecordingId,
    pub title: String,
    pub recorded_at: DateTime<Utc>,
    pub duration_seconds: Option<f64>,
    pub file_exists: bool,
    pub status: TranscriptionStatus,
}

impl RowView {
    /// Duration as `m:ss`, or `-` when unknown
    pub fn duration_label(&self) -> String {
        match self.duration_seconds {
            Some(seconds) => {
                let total = seconds as u64;
                format!("{}:{:02}", total / 60, total % 60)
            }
            None => "-".to_string(),
        }
    }

    fn sort_key(&self) -> (DateTime<Utc>, RecordingId) {
        (self.recorded_at, self.id)
    }
}

impl From<&Recording> for RowView {
    fn from(rec: &Recording) -> Self {
        Self {
            id: rec.id,
            title: rec.title.clone(),
            recorded_at: rec.recorded_at,
            duration_seconds: rec.duration_seconds,
            file_exists: rec.file_exists,
            status: rec.status,
        }
    }
}

/// Minimal redraw instructions for one update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionDiff {
    /// Row positions removed, relative to the previous ordering
    pub removed: Vec<usize>,
    /// Row positions inserted, relative to the new ordering
    pub added: Vec<usize>,
    /// Rows updated in place, relative to the new ordering
    pub changed: Vec<usize>,
    /// The whole view was rebuilt; redraw everything
    pub reset: bool,
}

impl ProjectionDiff {
    pub fn is_empty(&self) -> bool {
        !self.reset && self.removed.is_empty() && self.added.is_empty() && self.changed.is_empty()
    }

    fn changed_at(index: usize) -> Self {
        Self {
            changed: vec![index],
            ..Self::default()
        }
    }
}

/// Newest first, then lowest id
fn compare_keys(a: (DateTime<Utc>, RecordingId), b: (DateTime<Utc>, RecordingId)) -> Ordering {
    b.0.cmp(&a.0).then(a.1.cmp(&b.1))
}

/// The sorted index itself
#[derive(Debug, Default)]
pub struct ViewProjection {
    rows: Vec<RowView>,
    // id → recorded_at, enough to binary-search a row's position
    keys: HashMap<RecordingId, DateTime<Utc>>,
}

impl ViewProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities(entities: &[Recording]) -> Self {
        let mut view = Self::new();
        view.reset(entities);
        view
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&RowView> {
        self.rows.get(index)
    }

    pub fn rows(&self) -> &[RowView] {
        &self.rows
    }

    /// Current position of a recording
    pub fn index_of(&self, id: RecordingId) -> Option<usize> {
        let recorded_at = *self.keys.get(&id)?;
        self.position(recorded_at, id).ok()
    }

    /// Rows whose title contains `query`, ignoring case
    pub fn search(&self, query: &str) -> Vec<usize> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return (0..self.rows.len()).collect();
        }
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.title.to_lowercase().contains(&needle))
            .map(|(index, _)| index)
            .collect()
    }

    /// Rebuild from scratch (initial load, or after missed events)
    pub fn reset(&mut self, entities: &[Recording]) -> ProjectionDiff {
        self.rows = entities.iter().map(RowView::from).collect();
        self.rows
            .sort_by(|a, b| compare_keys(a.sort_key(), b.sort_key()));
        self.rows.dedup_by_key(|row| row.id);
        self.keys = self
            .rows
            .iter()
            .map(|row| (row.id, row.recorded_at))
            .collect();

        ProjectionDiff {
            reset: true,
            ..ProjectionDiff::default()
        }
    }

    /// Fold one bus event into the view
    pub fn apply(&mut self, event: &CatalogEvent) -> ProjectionDiff {
        match event {
            CatalogEvent::StatusChanged { id, to, .. } => self.apply_status(*id, *to),
            CatalogEvent::EntityUpserted { entity } => self.apply_upsert(entity),
            CatalogEvent::EntitiesReplaced { entities, .. } => self.apply_replace(entities),
        }
    }

    fn position(&self, recorded_at: DateTime<Utc>, id: RecordingId) -> Result<usize, usize> {
        self.rows
            .binary_search_by(|row| compare_keys(row.sort_key(), (recorded_at, id)))
    }

    fn apply_status(&mut self, id: RecordingId, status: TranscriptionStatus) -> ProjectionDiff {
        match self.index_of(id) {
            Some(index) => {
                self.rows[index].status = status;
                ProjectionDiff::changed_at(index)
            }
            None => {
                debug!("Status change for {} which is not in the view", id);
                ProjectionDiff::default()
            }
        }
    }

    fn apply_upsert(&mut self, entity: &Recording) -> ProjectionDiff {
        let row = RowView::from(entity);
        let mut diff = ProjectionDiff::default();

        if let Some(index) = self.index_of(entity.id) {
            if self.rows[index].recorded_at == row.recorded_at {
                if self.rows[index] != row {
                    self.rows[index] = row;
                    diff.changed.push(index);
                }
                return diff;
            }
            // Sort key moved: remove then reinsert
            self.rows.remove(index);
            self.keys.remove(&entity.id);
            diff.removed.push(index);
        }

        diff.added.push(self.insert(row));
        diff
    }

    fn apply_replace(&mut self, entities: &[Recording]) -> ProjectionDiff {
        let incoming: HashMap<RecordingId, &Recording> =
            entities.iter().map(|rec| (rec.id, rec)).collect();
        let mut diff = ProjectionDiff::default();

        // Rows that disappear or whose sort key moved
        let mut removed_ids = HashSet::new();
        for (index, row) in self.rows.iter().enumerate() {
            match incoming.get(&row.id) {
                Some(rec) if rec.recorded_at == row.recorded_at => {}
                _ => {
                    diff.removed.push(index);
                    removed_ids.insert(row.id);
                }
            }
        }
        if !removed_ids.is_empty() {
            self.rows.retain(|row| !removed_ids.contains(&row.id));
            for id in &removed_ids {
                self.keys.remove(id);
            }
        }

        // Survivors update in place
        let mut changed_ids = Vec::new();
        for row in self.rows.iter_mut() {
            if let Some(rec) = incoming.get(&row.id) {
                let updated = RowView::from(*rec);
                if *row != updated {
                    *row = updated;
                    changed_ids.push(row.id);
                }
            }
        }

        // Everything else is new
        let mut added_ids = Vec::new();
        for rec in entities {
            if !self.keys.contains_key(&rec.id) {
                self.insert(RowView::from(rec));
                added_ids.push(rec.id);
            }
        }

        diff.added = self.indices_of(&added_ids);
        diff.changed = self.indices_of(&changed_ids);
        diff
    }

    fn insert(&mut self, row: RowView) -> usize {
        let index = match self.position(row.recorded_at, row.id) {
            Ok(index) | Err(index) => index,
        };
        self.keys.insert(row.id, row.recorded_at);
        self.rows.insert(index, row);
        index
    }

    fn indices_of(&self, ids: &[RecordingId]) -> Vec<usize> {
        let mut indices: Vec<usize> = ids.iter().filter_map(|id| self.index_of(*id)).collect();
        indices.sort_unstable();
        indices
    }
}

/// A projection kept in sync with a status manager through the bus
///
/// When the subscription overflows the view is rebuilt from a fresh
/// snapshot, so it never drifts from the manager's state.
pub struct LiveProjection {
    manager: Arc<StatusManager>,
    view: ViewProjection,
    subscription: Subscription,
    resyncs: u64,
}

impl LiveProjection {
    pub async fn attach(manager: Arc<StatusManager>) -> Self {
        let (snapshot, subscription) = manager.subscribe_with_snapshot().await;
        Self {
            manager,
            view: ViewProjection::from_entities(&snapshot),
            subscription,
            resyncs: 0,
        }
    }

    pub fn view(&self) -> &ViewProjection {
        &self.view
    }

    /// How many times missed events forced a rebuild
    pub fn resync_count(&self) -> u64 {
        self.resyncs
    }

    /// Wait for the next event and return its diff
    ///
    /// Returns `None` once the bus is closed.
    pub async fn next_diff(&mut self) -> Option<ProjectionDiff> {
        match self.subscription.recv().await {
            Ok(event) => Some(self.view.apply(&event)),
            Err(BusError::Overflow { missed }) => Some(self.resync(missed).await),
            Err(BusError::Closed) => None,
        }
    }

    /// Apply everything already buffered without waiting
    pub async fn drain(&mut self) -> Vec<ProjectionDiff> {
        let mut diffs = Vec::new();
        loop {
            match self.subscription.try_recv() {
                Ok(Some(event)) => diffs.push(self.view.apply(&event)),
                Ok(None) | Err(BusError::Closed) => break,
                Err(BusError::Overflow { missed }) => diffs.push(self.resync(missed).await),
            }
        }
        diffs
    }

    async fn resync(&mut self, missed: u64) -> ProjectionDiff {
        warn!("Projection missed {} events, rebuilding from snapshot", missed);
        self.resyncs += 1;
        let (snapshot, subscription) = self.manager.subscribe_with_snapshot().await;
        self.subscription = subscription;
        self.view.reset(&snapshot)
    }
}
