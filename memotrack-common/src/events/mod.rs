//! Change notification bus
//!
//! Publishes entity-set changes and status transitions to any number of
//! observers (table views, dashboards, the CLI) without the engine knowing
//! who is listening.
//!
//! # Delivery contract
//!
//! - Producers never block. `EventBus::publish` is synchronous and returns
//!   immediately.
//! - All events travel through one broadcast channel, so every subscriber
//!   sees events in publish order. The status manager publishes while holding
//!   its write lock, which makes publish order equal commit order.
//! - The channel holds `capacity` events (rounded up to a power of two).
//!   When a subscriber falls further behind than that, its oldest unread
//!   events are evicted. The producer learns about it from
//!   [`Delivery::Overflowed`] and [`EventBus::overflow_count`]; the subscriber
//!   learns about it from [`BusError::Overflow`] on its next receive, after
//!   which it continues with the oldest event still buffered.

mod subscription;

pub use subscription::{BusError, Subscription};

use crate::models::{Recording, RecordingId, TranscriptionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Largest per-subscriber buffer the bus will allocate
pub const MAX_CAPACITY: usize = 1 << 16;
use tracing::warn;

/// Catalog change events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CatalogEvent {
    /// A refresh swapped in a new entity set
    EntitiesReplaced {
        /// The complete new set, status already merged
        entities: Arc<Vec<Recording>>,
        /// Ids present now that were absent before the swap
        added: Vec<RecordingId>,
        /// Ids present before the swap that are gone now
        removed: Vec<RecordingId>,
    },

    /// A single entity was inserted or changed outside a status transition
    /// (for example a file re-check flipped `file_exists`)
    EntityUpserted { entity: Recording },

    /// A status transition was committed
    StatusChanged {
        id: RecordingId,
        from: TranscriptionStatus,
        to: TranscriptionStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    },
}

impl CatalogEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogEvent::EntitiesReplaced { .. } => "EntitiesReplaced",
            CatalogEvent::EntityUpserted { .. } => "EntityUpserted",
            CatalogEvent::StatusChanged { .. } => "StatusChanged",
        }
    }
}

/// Outcome of a publish, as seen by the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Buffered for this many subscribers
    Delivered(usize),
    /// Nobody is subscribed; the event was dropped
    NoSubscribers,
    /// Buffered, but the buffer was full so at least one lagging subscriber
    /// lost its oldest unread event
    Overflowed(usize),
}

impl Delivery {
    pub fn is_degraded(self) -> bool {
        matches!(self, Delivery::Overflowed(_))
    }
}

/// Broadcast bus for [`CatalogEvent`]s
///
/// Cheap to clone; clones share the same channel and counters.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CatalogEvent>,
    capacity: usize,
    overflows: Arc<AtomicU64>,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    ///
    /// `capacity` is clamped to `1..=MAX_CAPACITY` and then rounded up to a
    /// power of two. Configuration validation rejects values outside that
    /// range before they get here.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_CAPACITY).next_power_of_two();
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            capacity,
            overflows: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a new subscriber
    ///
    /// Only events published after this call are received.
    pub fn subscribe(&self) -> Subscription {
        Subscription::new(self.tx.subscribe())
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: CatalogEvent) -> Delivery {
        // A full queue means this send evicts an event some receiver has not seen
        let full = self.tx.len() >= self.capacity;
        let kind = event.kind();

        match self.tx.send(event) {
            Ok(receivers) if full => {
                let total = self.overflows.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Event bus overflow publishing {} ({} overflows so far, capacity {})",
                    kind, total, self.capacity
                );
                Delivery::Overflowed(receivers)
            }
            Ok(receivers) => Delivery::Delivered(receivers),
            Err(_) => Delivery::NoSubscribers,
        }
    }

    /// Number of publishes that evicted unread events
    pub fn overflow_count(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Effective channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
