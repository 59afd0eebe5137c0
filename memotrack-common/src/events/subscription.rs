//! Subscriber side of the event bus

use super::CatalogEvent;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Subscriber-visible delivery problems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    /// The subscriber fell behind and this many events were evicted before
    /// it read them. Receiving continues with the oldest buffered event.
    #[error("Notification overflow: {missed} events missed")]
    Overflow { missed: u64 },

    /// Every publisher is gone
    #[error("Event bus closed")]
    Closed,
}

/// A registered bus subscriber
///
/// Dropping the subscription (or calling [`Subscription::unsubscribe`])
/// unregisters it.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<CatalogEvent>,
    missed_total: u64,
}

impl Subscription {
    pub(super) fn new(rx: broadcast::Receiver<CatalogEvent>) -> Self {
        Self { rx, missed_total: 0 }
    }

    /// Wait for the next event
    pub async fn recv(&mut self) -> Result<CatalogEvent, BusError> {
        match self.rx.recv().await {
            Ok(event) => Ok(event),
            Err(RecvError::Lagged(missed)) => {
                self.missed_total += missed;
                Err(BusError::Overflow { missed })
            }
            Err(RecvError::Closed) => Err(BusError::Closed),
        }
    }

    /// Take the next event if one is already buffered
    pub fn try_recv(&mut self) -> Result<Option<CatalogEvent>, BusError> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Lagged(missed)) => {
                self.missed_total += missed;
                Err(BusError::Overflow { missed })
            }
            Err(TryRecvError::Closed) => Err(BusError::Closed),
        }
    }

    /// Events this subscriber has lost to overflow so far
    pub fn missed_total(&self) -> u64 {
        self.missed_total
    }

    /// Explicitly unregister from the bus
    pub fn unsubscribe(self) {}
}
