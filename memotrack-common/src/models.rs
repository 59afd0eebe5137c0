//! Domain models shared by the ingestion engine and its observers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable recording identifier, taken from the catalog row primary key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordingId(pub i64);

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RecordingId {
    fn from(pk: i64) -> Self {
        Self(pk)
    }
}

/// Per-recording transcription lifecycle
///
/// NEW → QUEUED → PROCESSING → DONE | ERROR. Terminal states only return to
/// QUEUED through an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TranscriptionStatus {
    /// Admitted to the entity set, nothing requested yet
    #[default]
    New,
    /// Waiting for the transcription collaborator
    Queued,
    /// Transcription in progress
    Processing,
    /// Transcription finished
    Done,
    /// Transcription failed or was cancelled
    Error,
}

impl TranscriptionStatus {
    /// All states in lifecycle order
    pub const ALL: [TranscriptionStatus; 5] = [
        TranscriptionStatus::New,
        TranscriptionStatus::Queued,
        TranscriptionStatus::Processing,
        TranscriptionStatus::Done,
        TranscriptionStatus::Error,
    ];

    /// DONE and ERROR are terminal
    pub fn is_terminal(self) -> bool {
        matches!(self, TranscriptionStatus::Done | TranscriptionStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptionStatus::New => "NEW",
            TranscriptionStatus::Queued => "QUEUED",
            TranscriptionStatus::Processing => "PROCESSING",
            TranscriptionStatus::Done => "DONE",
            TranscriptionStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for TranscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Canonical, validated catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Row primary key
    pub id: RecordingId,

    /// Resolved display title
    pub title: String,

    /// Recording time in UTC (localized only for display)
    pub recorded_at: DateTime<Utc>,

    /// Duration in seconds, `None` when the source value failed validation
    pub duration_seconds: Option<f64>,

    /// Media path relative to the configured media root
    pub relative_path: String,

    /// Whether the media file was found on the last cross-reference pass
    pub file_exists: bool,

    /// Lifecycle state, written only by the status manager
    pub status: TranscriptionStatus,
}

/// One committed status transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub id: RecordingId,
    pub from: TranscriptionStatus,
    pub to: TranscriptionStatus,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}
