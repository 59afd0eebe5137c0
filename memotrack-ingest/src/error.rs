//! Error types for memotrack-ingest
//!
//! Store-level catalog errors abort a refresh; row-level errors are collected
//! and reported next to the rows that did load. Status errors go straight back
//! to whoever requested the transition.

use memotrack_common::{RecordingId, TranscriptionStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Catalog store errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    /// The store could not be opened or read (missing file, lock
    /// contention, permission denied)
    #[error("Catalog unavailable at {path}: {reason}")]
    StoreUnavailable { path: PathBuf, reason: String },

    /// The expected table or columns are absent (a missing table lists
    /// every required column)
    #[error("Catalog schema mismatch in table {table}: missing columns {}", .missing.join(", "))]
    SchemaMismatch { table: String, missing: Vec<String> },

    /// One row could not be decoded; the rest of the read continues
    #[error("Catalog row {row_index} could not be decoded: {reason}")]
    RowDecode { row_index: usize, reason: String },
}

impl CatalogError {
    /// True for errors that affect a single row only
    pub fn is_row_level(&self) -> bool {
        matches!(self, CatalogError::RowDecode { .. })
    }
}

/// Status state manager errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    /// No entity with this id is known
    #[error("Unknown recording: {0}")]
    UnknownEntity(RecordingId),

    /// The transition is not in the transition table; state left unchanged
    #[error("Illegal transition for recording {id}: {from} -> {to}")]
    IllegalTransition {
        id: RecordingId,
        from: TranscriptionStatus,
        to: TranscriptionStatus,
    },
}

/// Refresh-level failures (nothing was published)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RefreshError {
    /// Store-level catalog failure
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The background refresh task panicked or was aborted
    #[error("Refresh task failed: {0}")]
    TaskFailed(String),
}
