//! memotrack-ingest - Voice Memos catalog ingestion engine
//!
//! Reads the recordings catalog read-only, validates each row into a
//! [`Recording`](memotrack_common::Recording), checks the media files on
//! disk and keeps per-recording transcription status. Consumers watch the
//! event bus or a [`projection::LiveProjection`] to stay in sync.

pub mod catalog;
pub mod crossref;
pub mod error;
pub mod hooks;
pub mod normalize;
pub mod projection;
pub mod refresh;
pub mod status;

pub use catalog::{CatalogReader, RawRow, RawValue};
pub use crossref::FileCrossReferencer;
pub use error::{CatalogError, RefreshError, StatusError};
pub use hooks::TranscriptionHooks;
pub use normalize::{normalize, Normalized, ValidationFailure, ValidationWarning};
pub use projection::{LiveProjection, ProjectionDiff, RowView, ViewProjection};
pub use refresh::{RefreshHandle, RefreshOrchestrator, RefreshOutcome, RefreshReport};
pub use status::{StatusCounts, StatusManager};
