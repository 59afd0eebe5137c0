//! Status state manager
//!
//! Owns the entity set and the transcription status of every recording.
//! This is the only shared mutable state in the engine; everything goes
//! through one `tokio::sync::RwLock`, and events are published while the
//! write guard is held, so subscribers see transitions for a given id in
//! exactly the order they were committed.
//!
//! Transition table (anything else is rejected and leaves state unchanged):
//!
//! | from       | to                          |
//! |------------|-----------------------------|
//! | NEW        | QUEUED                      |
//! | QUEUED     | PROCESSING, ERROR (cancel)  |
//! | PROCESSING | DONE, ERROR                 |
//! | DONE       | QUEUED (explicit retry)     |
//! | ERROR      | QUEUED (explicit retry)     |

use crate::error::StatusError;
use memotrack_common::events::{CatalogEvent, Delivery, EventBus, Subscription};
use memotrack_common::{time, Recording, RecordingId, StatusRecord, TranscriptionStatus};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// How a transition was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Ordinary lifecycle progress
    Normal,
    /// Explicit requeue of a terminal recording
    Retry,
}

/// Whether `from → to` is legal for the given kind of request
pub fn is_allowed(from: TranscriptionStatus, to: TranscriptionStatus, kind: TransitionKind) -> bool {
    use memotrack_common::TranscriptionStatus::*;

    match (from, to) {
        (New, Queued) | (Queued, Processing) | (Queued, Error) | (Processing, Done)
        | (Processing, Error) => kind == TransitionKind::Normal,
        (Done, Queued) | (Error, Queued) => kind == TransitionKind::Retry,
        _ => false,
    }
}

/// Per-status totals over the current entity set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub new: usize,
    pub queued: usize,
    pub processing: usize,
    pub done: usize,
    pub error: usize,
    /// Recordings whose media file is missing
    pub missing_files: usize,
    pub total: usize,
}

/// What an entity-set swap changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    pub added: Vec<RecordingId>,
    pub removed: Vec<RecordingId>,
    /// Ids that appeared more than once in the new set (first one kept)
    pub duplicates: Vec<RecordingId>,
    pub total: usize,
}

#[derive(Default)]
struct Inner {
    entities: HashMap<RecordingId, Recording>,
    history: Vec<StatusRecord>,
}

/// Authoritative id → status mapping with transition enforcement
pub struct StatusManager {
    inner: RwLock<Inner>,
    bus: EventBus,
}

impl StatusManager {
    pub fn new(bus: EventBus) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            bus,
        }
    }

    /// Convenience constructor returning an `Arc` for sharing across tasks
    pub fn shared(bus: EventBus) -> Arc<Self> {
        Arc::new(Self::new(bus))
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Snapshot of the entity set plus a subscription starting right after it
    ///
    /// No event can fall between the snapshot and the first received event.
    pub async fn subscribe_with_snapshot(&self) -> (Vec<Recording>, Subscription) {
        let inner = self.inner.read().await;
        let subscription = self.bus.subscribe();
        (sorted_snapshot(&inner), subscription)
    }

    /// Apply a lifecycle transition
    ///
    /// Returns the new status. Fails with `UnknownEntity` when `id` is not in
    /// the set and `IllegalTransition` when the move is not in the table.
    pub async fn request_transition(
        &self,
        id: RecordingId,
        target: TranscriptionStatus,
        reason: Option<String>,
    ) -> Result<TranscriptionStatus, StatusError> {
        self.transition(id, None, target, reason, TransitionKind::Normal).await
    }

    /// Like [`StatusManager::request_transition`], but only from `expected`
    ///
    /// Any other current status is an `IllegalTransition`, even when the
    /// move itself is in the table.
    pub async fn request_transition_from(
        &self,
        id: RecordingId,
        expected: TranscriptionStatus,
        target: TranscriptionStatus,
        reason: Option<String>,
    ) -> Result<TranscriptionStatus, StatusError> {
        self.transition(id, Some(expected), target, reason, TransitionKind::Normal)
            .await
    }

    /// Explicitly requeue a DONE or ERROR recording
    pub async fn retry(
        &self,
        id: RecordingId,
        reason: Option<String>,
    ) -> Result<TranscriptionStatus, StatusError> {
        self.transition(id, None, TranscriptionStatus::Queued, reason, TransitionKind::Retry)
            .await
    }

    async fn transition(
        &self,
        id: RecordingId,
        expected: Option<TranscriptionStatus>,
        target: TranscriptionStatus,
        reason: Option<String>,
        kind: TransitionKind,
    ) -> Result<TranscriptionStatus, StatusError> {
        let mut inner = self.inner.write().await;

        let entity = inner
            .entities
            .get_mut(&id)
            .ok_or(StatusError::UnknownEntity(id))?;

        let from = entity.status;
        if expected.is_some_and(|status| status != from) || !is_allowed(from, target, kind) {
            debug!("Rejected transition for {}: {} -> {} ({:?})", id, from, target, kind);
            return Err(StatusError::IllegalTransition { id, from, to: target });
        }

        entity.status = target;

        let record = StatusRecord {
            id,
            from,
            to: target,
            at: time::now(),
            reason,
        };
        inner.history.push(record.clone());

        debug!("Recording {}: {} -> {}", id, from, target);
        self.publish(CatalogEvent::StatusChanged {
            id,
            from,
            to: target,
            reason: record.reason,
            at: record.at,
        });

        Ok(target)
    }

    /// Swap in a freshly loaded entity set
    ///
    /// Recordings that survive keep their current status; new ones start as
    /// NEW. The swap is atomic with respect to every other operation and is
    /// announced by exactly one `EntitiesReplaced` event.
    pub async fn replace_entities(&self, recordings: Vec<Recording>) -> ReplaceSummary {
        let mut inner = self.inner.write().await;

        let mut summary = ReplaceSummary::default();
        let mut seen = HashSet::with_capacity(recordings.len());
        let mut merged = Vec::with_capacity(recordings.len());

        for mut rec in recordings {
            if !seen.insert(rec.id) {
                warn!("Duplicate recording id {} in refreshed set, keeping first", rec.id);
                summary.duplicates.push(rec.id);
                continue;
            }
            match inner.entities.get(&rec.id) {
                Some(existing) => rec.status = existing.status,
                None => {
                    rec.status = TranscriptionStatus::New;
                    summary.added.push(rec.id);
                }
            }
            merged.push(rec);
        }

        summary.removed = inner
            .entities
            .keys()
            .filter(|id| !seen.contains(*id))
            .copied()
            .collect();
        summary.added.sort();
        summary.removed.sort();
        summary.total = merged.len();

        inner.entities = merged.iter().map(|rec| (rec.id, rec.clone())).collect();

        info!(
            "Entity set replaced: {} total, {} added, {} removed",
            summary.total,
            summary.added.len(),
            summary.removed.len()
        );

        self.publish(CatalogEvent::EntitiesReplaced {
            entities: Arc::new(merged),
            added: summary.added.clone(),
            removed: summary.removed.clone(),
        });

        summary
    }

    /// Update only `file_exists` for one recording
    ///
    /// Returns whether the value changed. A change is announced with
    /// `EntityUpserted`; status is never touched.
    pub async fn set_file_exists(&self, id: RecordingId, exists: bool) -> Result<bool, StatusError> {
        let mut inner = self.inner.write().await;
        let entity = inner
            .entities
            .get_mut(&id)
            .ok_or(StatusError::UnknownEntity(id))?;

        if entity.file_exists == exists {
            return Ok(false);
        }
        entity.file_exists = exists;
        let entity = entity.clone();

        self.publish(CatalogEvent::EntityUpserted { entity });
        Ok(true)
    }

    /// Apply a batch of file checks, skipping ids that have since left the set
    ///
    /// Returns how many recordings changed.
    pub async fn apply_file_checks(&self, checks: &[(RecordingId, bool)]) -> usize {
        let mut changed = 0;
        for &(id, exists) in checks {
            match self.set_file_exists(id, exists).await {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(_) => debug!("Recording {} left the set before its file check landed", id),
            }
        }
        changed
    }

    pub async fn get(&self, id: RecordingId) -> Option<Recording> {
        self.inner.read().await.entities.get(&id).cloned()
    }

    pub async fn status_of(&self, id: RecordingId) -> Result<TranscriptionStatus, StatusError> {
        self.inner
            .read()
            .await
            .entities
            .get(&id)
            .map(|rec| rec.status)
            .ok_or(StatusError::UnknownEntity(id))
    }

    /// All recordings, ordered by id
    pub async fn snapshot(&self) -> Vec<Recording> {
        sorted_snapshot(&*self.inner.read().await)
    }

    /// Every committed transition, oldest first
    pub async fn history(&self) -> Vec<StatusRecord> {
        self.inner.read().await.history.clone()
    }

    /// Committed transitions for one recording, oldest first
    pub async fn history_for(&self, id: RecordingId) -> Vec<StatusRecord> {
        self.inner
            .read()
            .await
            .history
            .iter()
            .filter(|record| record.id == id)
            .cloned()
            .collect()
    }

    /// Most recent reason recorded for a recording's current ERROR status
    pub async fn error_reason(&self, id: RecordingId) -> Option<String> {
        let inner = self.inner.read().await;
        if inner.entities.get(&id)?.status != TranscriptionStatus::Error {
            return None;
        }
        inner
            .history
            .iter()
            .rev()
            .find(|record| record.id == id)
            .and_then(|record| record.reason.clone())
    }

    pub async fn counts(&self) -> StatusCounts {
        let inner = self.inner.read().await;
        let mut counts = StatusCounts::default();
        for rec in inner.entities.values() {
            match rec.status {
                TranscriptionStatus::New => counts.new += 1,
                TranscriptionStatus::Queued => counts.queued += 1,
                TranscriptionStatus::Processing => counts.processing += 1,
                TranscriptionStatus::Done => counts.done += 1,
                TranscriptionStatus::Error => counts.error += 1,
            }
            if !rec.file_exists {
                counts.missing_files += 1;
            }
        }
        counts.total = inner.entities.len();
        counts
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entities.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entities.is_empty()
    }

    fn publish(&self, event: CatalogEvent) {
        if let Delivery::Overflowed(receivers) = self.bus.publish(event) {
            warn!(
                "Degraded delivery: a subscriber of {} lost events (overflow #{})",
                receivers,
                self.bus.overflow_count()
            );
        }
    }
}

fn sorted_snapshot(inner: &Inner) -> Vec<Recording> {
    let mut all: Vec<Recording> = inner.entities.values().cloned().collect();
    all.sort_by_key(|rec| rec.id);
    all
}
