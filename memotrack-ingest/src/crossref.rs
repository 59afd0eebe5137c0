//! File cross-referencer
//!
//! Resolves catalog paths against the media root and reports whether the
//! backing file is present. Paths are joined as-is: symlinks and case
//! sensitivity follow the host filesystem. Only `file_exists` is ever
//! derived here; re-running a check never touches status.

use futures::stream::{self, StreamExt};
use memotrack_common::{Recording, RecordingId};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Checks media files under one root folder
#[derive(Debug, Clone)]
pub struct FileCrossReferencer {
    root: PathBuf,
    concurrency: usize,
}

impl FileCrossReferencer {
    pub fn new(root: impl Into<PathBuf>, concurrency: usize) -> Self {
        Self {
            root: root.into(),
            concurrency: concurrency.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a catalog path
    pub fn resolve(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }

    /// Whether the file behind `relative_path` exists
    ///
    /// Errors while probing (permission denied on a parent directory, for
    /// example) count as "not found".
    pub async fn check(&self, relative_path: &str) -> bool {
        path_exists(&self.resolve(relative_path)).await
    }

    /// Check every recording, at most `concurrency` checks at a time
    ///
    /// Results come back in input order.
    pub async fn check_all(&self, recordings: &[Recording]) -> Vec<(RecordingId, bool)> {
        // Owned targets; the check futures must not borrow `recordings`
        let targets: Vec<(RecordingId, PathBuf)> = recordings
            .iter()
            .map(|rec| (rec.id, self.resolve(&rec.relative_path)))
            .collect();

        let results: Vec<(RecordingId, bool)> = stream::iter(targets)
            .map(|(id, path)| async move { (id, path_exists(&path).await) })
            .buffered(self.concurrency)
            .collect()
            .await;

        let missing = results.iter().filter(|(_, exists)| !exists).count();
        debug!(
            "Cross-referenced {} recordings under {} ({} missing)",
            results.len(),
            self.root.display(),
            missing
        );

        results
    }

    /// Set `file_exists` on each recording in place
    pub async fn apply(&self, recordings: &mut [Recording]) {
        let results = self.check_all(recordings).await;
        for (rec, (_, exists)) in recordings.iter_mut().zip(results) {
            rec.file_exists = exists;
        }
    }
}

async fn path_exists(path: &Path) -> bool {
    match tokio::fs::try_exists(path).await {
        Ok(exists) => exists,
        Err(e) => {
            warn!("Could not check {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use memotrack_common::TranscriptionStatus;
    use tempfile::TempDir;

    fn recording(id: i64, path: &str) -> Recording {
        Recording {
            id: RecordingId(id),
            title: format!("memo {}", id),
            recorded_at: Utc::now(),
            duration_seconds: Some(1.0),
            relative_path: path.to_string(),
            file_exists: false,
            status: TranscriptionStatus::Processing,
        }
    }

    #[tokio::test]
    async fn test_check_present_and_absent() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("present.m4a"), b"audio").unwrap();

        let crossref = FileCrossReferencer::new(temp_dir.path(), 4);
        assert!(crossref.check("present.m4a").await);
        assert!(!crossref.check("absent.m4a").await);
    }

    #[tokio::test]
    async fn test_nested_relative_path() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("2023")).unwrap();
        std::fs::write(temp_dir.path().join("2023").join("a.m4a"), b"audio").unwrap();

        let crossref = FileCrossReferencer::new(temp_dir.path(), 1);
        assert!(crossref.check("2023/a.m4a").await);
    }

    #[tokio::test]
    async fn test_apply_only_touches_file_exists() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("b.m4a"), b"audio").unwrap();

        let mut recordings = vec![recording(1, "a.m4a"), recording(2, "b.m4a")];
        let before = recordings.clone();

        let crossref = FileCrossReferencer::new(temp_dir.path(), 2);
        crossref.apply(&mut recordings).await;

        assert!(!recordings[0].file_exists);
        assert!(recordings[1].file_exists);
        for (after, before) in recordings.iter().zip(&before) {
            assert_eq!(after.status, before.status);
            assert_eq!(after.title, before.title);
            assert_eq!(after.relative_path, before.relative_path);
        }
    }

    #[tokio::test]
    async fn test_check_all_runs_on_a_spawned_task() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("d.m4a"), b"audio").unwrap();

        let crossref = FileCrossReferencer::new(temp_dir.path(), 4);
        let recordings = vec![recording(4, "d.m4a"), recording(5, "e.m4a")];
        let results = tokio::spawn(async move { crossref.check_all(&recordings).await })
            .await
            .unwrap();

        assert_eq!(results, vec![(RecordingId(4), true), (RecordingId(5), false)]);
    }

    #[tokio::test]
    async fn test_recheck_sees_deleted_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("c.m4a");
        std::fs::write(&file, b"audio").unwrap();

        let crossref = FileCrossReferencer::new(temp_dir.path(), 2);
        let recordings = vec![recording(3, "c.m4a")];
        assert_eq!(crossref.check_all(&recordings).await, vec![(RecordingId(3), true)]);

        std::fs::remove_file(&file).unwrap();
        assert_eq!(crossref.check_all(&recordings).await, vec![(RecordingId(3), false)]);
    }
}
