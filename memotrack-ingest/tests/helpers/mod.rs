//! Catalog fixtures for integration tests
//!
//! Builds a throwaway media root holding a `CloudRecordings.db` with the
//! Voice Memos table layout. Fixtures are written through a separate
//! writable pool; the code under test only ever opens them read-only.

#![allow(dead_code)]

use anyhow::Result;
use memotrack_common::config::EngineSettings;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const CATALOG_FILE: &str = "CloudRecordings.db";

const CREATE_TABLE: &str = "CREATE TABLE ZCLOUDRECORDING (
    Z_PK INTEGER PRIMARY KEY,
    Z_ENT INTEGER,
    ZPATH VARCHAR,
    ZCUSTOMLABEL VARCHAR,
    ZENCRYPTEDTITLE VARCHAR,
    ZDATE TIMESTAMP,
    ZDURATION FLOAT
)";

/// One row to insert; `None` columns are stored as NULL
#[derive(Debug, Clone, Default)]
pub struct FixtureRow {
    pub pk: i64,
    pub path: Option<String>,
    pub custom_label: Option<String>,
    pub encrypted_title: Option<String>,
    pub date: Option<f64>,
    pub duration: Option<f64>,
}

impl FixtureRow {
    /// A complete, valid row
    pub fn valid(pk: i64, date: f64) -> Self {
        Self {
            pk,
            path: Some(format!("{}.m4a", pk)),
            custom_label: Some(format!("Memo {}", pk)),
            encrypted_title: None,
            date: Some(date),
            duration: Some(30.0),
        }
    }
}

/// Temporary media root with a writable handle on its catalog
pub struct FixtureCatalog {
    dir: TempDir,
    pool: SqlitePool,
}

impl FixtureCatalog {
    /// Media root with an empty ZCLOUDRECORDING table
    pub async fn new() -> Result<Self> {
        let catalog = Self::without_table().await?;
        sqlx::query(CREATE_TABLE).execute(&catalog.pool).await?;
        Ok(catalog)
    }

    /// Media root whose catalog has no tables at all
    pub async fn without_table() -> Result<Self> {
        let dir = TempDir::new()?;
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join(CATALOG_FILE))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { dir, pool })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.dir.path().join(CATALOG_FILE)
    }

    pub fn settings(&self) -> EngineSettings {
        EngineSettings::for_media_root(self.root())
    }

    /// Run raw SQL against the fixture
    pub async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn insert(&self, row: &FixtureRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO ZCLOUDRECORDING
                (Z_PK, Z_ENT, ZPATH, ZCUSTOMLABEL, ZENCRYPTEDTITLE, ZDATE, ZDURATION)
             VALUES (?, 1, ?, ?, ?, ?, ?)",
        )
        .bind(row.pk)
        .bind(&row.path)
        .bind(&row.custom_label)
        .bind(&row.encrypted_title)
        .bind(row.date)
        .bind(row.duration)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, pk: i64) -> Result<()> {
        sqlx::query("DELETE FROM ZCLOUDRECORDING WHERE Z_PK = ?")
            .bind(pk)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Create a media file under the root
    pub fn touch(&self, relative_path: &str) -> Result<()> {
        let path = self.dir.path().join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"m4a")?;
        Ok(())
    }

    pub fn remove_file(&self, relative_path: &str) -> Result<()> {
        std::fs::remove_file(self.dir.path().join(relative_path))?;
        Ok(())
    }
}
