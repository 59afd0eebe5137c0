//! Entry points for the transcription collaborator
//!
//! The transcription engine lives outside memotrack. It reports progress
//! through these callbacks, each of which is a single status transition.
//! Errors are returned to the caller, never swallowed.

use crate::error::StatusError;
use crate::status::StatusManager;
use memotrack_common::{RecordingId, TranscriptionStatus};
use std::sync::Arc;
use tracing::info;

/// Callback surface handed to a transcription worker
#[derive(Clone)]
pub struct TranscriptionHooks {
    manager: Arc<StatusManager>,
}

impl TranscriptionHooks {
    pub fn new(manager: Arc<StatusManager>) -> Self {
        Self { manager }
    }

    /// NEW → QUEUED
    pub async fn enqueue(&self, id: RecordingId) -> Result<TranscriptionStatus, StatusError> {
        self.manager
            .request_transition(id, TranscriptionStatus::Queued, None)
            .await
    }

    /// QUEUED → PROCESSING
    pub async fn on_start(&self, id: RecordingId) -> Result<TranscriptionStatus, StatusError> {
        self.manager
            .request_transition(id, TranscriptionStatus::Processing, None)
            .await
    }

    /// PROCESSING → DONE
    pub async fn on_complete(&self, id: RecordingId) -> Result<TranscriptionStatus, StatusError> {
        self.manager
            .request_transition(id, TranscriptionStatus::Done, None)
            .await
    }

    /// PROCESSING → ERROR, keeping the reason for display
    pub async fn on_error(
        &self,
        id: RecordingId,
        reason: impl Into<String>,
    ) -> Result<TranscriptionStatus, StatusError> {
        let reason = reason.into();
        info!("Transcription of {} failed: {}", id, reason);
        self.manager
            .request_transition(id, TranscriptionStatus::Error, Some(reason))
            .await
    }

    /// QUEUED → ERROR before the worker picked the recording up
    ///
    /// A recording already PROCESSING is not cancelled; report its failure
    /// through [`TranscriptionHooks::on_error`] instead.
    pub async fn cancel(&self, id: RecordingId) -> Result<TranscriptionStatus, StatusError> {
        self.manager
            .request_transition_from(
                id,
                TranscriptionStatus::Queued,
                TranscriptionStatus::Error,
                Some("cancelled".to_string()),
            )
            .await
    }

    /// DONE/ERROR → QUEUED, the only way out of a terminal state
    pub async fn retry(&self, id: RecordingId) -> Result<TranscriptionStatus, StatusError> {
        self.manager.retry(id, Some("retry requested".to_string())).await
    }
}
