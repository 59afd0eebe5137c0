//! # memotrack Common Library
//!
//! Shared code for the memotrack ingestion engine and its front ends:
//! - Domain models (Recording, TranscriptionStatus, StatusRecord)
//! - Catalog epoch conversion
//! - Bootstrap configuration and media root resolution
//! - Change notification bus (CatalogEvent, EventBus)

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{Recording, RecordingId, StatusRecord, TranscriptionStatus};
