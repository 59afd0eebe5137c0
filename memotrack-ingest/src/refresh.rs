//! Refresh orchestrator
//!
//! Runs one catalog pass (reader, normalizer, cross-referencer) and commits
//! the result to the status manager in a single swap. Each refresh takes a
//! new generation; starting a refresh cancels whichever one is in flight, and
//! a cancelled or outdated refresh never commits.

use crate::catalog::CatalogReader;
use crate::crossref::FileCrossReferencer;
use crate::error::{CatalogError, RefreshError};
use crate::normalize::{normalize, ValidationFailure, ValidationWarning};
use crate::status::StatusManager;
use memotrack_common::config::EngineSettings;
use memotrack_common::{Recording, RecordingId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a refresh that ran to completion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub generation: u64,
    /// Entities committed to the status manager
    pub admitted: usize,
    /// Rows the store returned but that could not be decoded
    pub row_errors: Vec<CatalogError>,
    /// Rows rejected by validation
    pub rejected: Vec<ValidationFailure>,
    /// Field problems on admitted entities
    pub warnings: Vec<ValidationWarning>,
    pub added: Vec<RecordingId>,
    pub removed: Vec<RecordingId>,
    /// Admitted entities whose media file is absent
    pub missing_files: usize,
}

/// How a refresh ended
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The new entity set was committed and published
    Committed(RefreshReport),
    /// A newer refresh started first; nothing was published
    Superseded { generation: u64 },
}

impl RefreshOutcome {
    pub fn report(&self) -> Option<&RefreshReport> {
        match self {
            RefreshOutcome::Committed(report) => Some(report),
            RefreshOutcome::Superseded { .. } => None,
        }
    }
}

/// A refresh running on its own task
pub struct RefreshHandle {
    task: JoinHandle<Result<RefreshOutcome, RefreshError>>,
}

impl RefreshHandle {
    /// Wait for the refresh; a panicked or aborted task is `TaskFailed`
    pub async fn join(self) -> Result<RefreshOutcome, RefreshError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                warn!("Background refresh did not finish: {}", e);
                Err(RefreshError::TaskFailed(e.to_string()))
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the task; an abort before the commit publishes nothing
    pub fn abort(&self) {
        self.task.abort();
    }
}

struct Loaded {
    recordings: Vec<Recording>,
    row_errors: Vec<CatalogError>,
    rejected: Vec<ValidationFailure>,
    warnings: Vec<ValidationWarning>,
}

/// Drives catalog refreshes for one media root
pub struct RefreshOrchestrator {
    settings: EngineSettings,
    manager: Arc<StatusManager>,
    crossref: FileCrossReferencer,
    generation: AtomicU64,
    current: Mutex<CancellationToken>,
    commit: Mutex<()>,
}

impl RefreshOrchestrator {
    pub fn new(settings: EngineSettings, manager: Arc<StatusManager>) -> Self {
        let crossref =
            FileCrossReferencer::new(settings.media_root.clone(), settings.crossref_concurrency);
        Self {
            settings,
            manager,
            crossref,
            generation: AtomicU64::new(0),
            current: Mutex::new(CancellationToken::new()),
            commit: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn manager(&self) -> &Arc<StatusManager> {
        &self.manager
    }

    /// Generation of the most recently started refresh (0 before the first)
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Load the catalog and commit it
    ///
    /// Store-level failures return an error and publish nothing. Row-level
    /// problems are collected in the report.
    pub async fn refresh(&self) -> Result<RefreshOutcome, RefreshError> {
        let (generation, token) = {
            let mut current = self.current.lock().await;
            current.cancel();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let token = CancellationToken::new();
            *current = token.clone();
            (generation, token)
        };

        info!(
            "Refresh {} started for {}",
            generation,
            self.settings.catalog_path.display()
        );

        let loaded = tokio::select! {
            _ = token.cancelled() => {
                info!("Refresh {} superseded while loading", generation);
                return Ok(RefreshOutcome::Superseded { generation });
            }
            result = self.load() => result,
        };

        let loaded = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Refresh {} failed: {}", generation, e);
                return Err(e.into());
            }
        };

        let _commit = self.commit.lock().await;
        if token.is_cancelled() || self.generation() != generation {
            info!("Refresh {} superseded before commit", generation);
            return Ok(RefreshOutcome::Superseded { generation });
        }

        let missing_files = loaded
            .recordings
            .iter()
            .filter(|rec| !rec.file_exists)
            .count();
        let summary = self.manager.replace_entities(loaded.recordings).await;

        let report = RefreshReport {
            generation,
            admitted: summary.total,
            row_errors: loaded.row_errors,
            rejected: loaded.rejected,
            warnings: loaded.warnings,
            added: summary.added,
            removed: summary.removed,
            missing_files,
        };

        info!(
            "Refresh {} committed: {} admitted, {} rejected, {} undecodable, {} warnings, {} missing files",
            generation,
            report.admitted,
            report.rejected.len(),
            report.row_errors.len(),
            report.warnings.len(),
            report.missing_files
        );

        Ok(RefreshOutcome::Committed(report))
    }

    /// Run [`RefreshOrchestrator::refresh`] on a background task
    pub fn spawn_refresh(self: &Arc<Self>) -> RefreshHandle {
        let orchestrator = Arc::clone(self);
        RefreshHandle {
            task: tokio::spawn(async move { orchestrator.refresh().await }),
        }
    }

    /// Re-check media files for the current entity set
    ///
    /// Only `file_exists` can change. Returns how many recordings changed.
    pub async fn recheck_files(&self) -> usize {
        let current = self.manager.snapshot().await;
        let checks = self.crossref.check_all(&current).await;
        let changed = self.manager.apply_file_checks(&checks).await;
        info!(
            "Rechecked {} media files, {} changed",
            checks.len(),
            changed
        );
        changed
    }

    async fn load(&self) -> Result<Loaded, CatalogError> {
        let reader = CatalogReader::open(
            &self.settings.catalog_path,
            &self.settings.table,
            self.settings.busy_timeout,
        )
        .await?;
        let batch = reader.read_all().await;
        reader.close().await;
        let batch = batch?;

        let mut loaded = Loaded {
            recordings: Vec::with_capacity(batch.rows.len()),
            row_errors: batch.row_errors,
            rejected: Vec::new(),
            warnings: Vec::new(),
        };

        for row in &batch.rows {
            match normalize(row) {
                Ok(normalized) => {
                    for warning in &normalized.warnings {
                        warn!("{}", warning);
                    }
                    loaded.warnings.extend(normalized.warnings);
                    loaded.recordings.push(normalized.recording);
                }
                Err(failure) => {
                    warn!("{}", failure);
                    loaded.rejected.push(failure);
                }
            }
        }
        debug!(
            "Normalized {} of {} rows",
            loaded.recordings.len(),
            batch.rows.len()
        );

        self.crossref.apply(&mut loaded.recordings).await;
        Ok(loaded)
    }
}
