//! Catalog store reader
//!
//! Opens the Voice Memos catalog (`CloudRecordings.db`) strictly read-only
//! and yields its recording rows as a lazy stream. Each call to
//! [`CatalogReader::rows`] runs a fresh query, so a read can be restarted
//! without any cursor state leaking between calls.

mod raw_row;

pub use raw_row::{RawRow, RawValue};

use crate::error::CatalogError;
use futures::{Stream, StreamExt};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Primary key column
pub const COL_PK: &str = "Z_PK";
/// Media path relative to the recordings folder
pub const COL_PATH: &str = "ZPATH";
/// Label the user typed
pub const COL_CUSTOM_LABEL: &str = "ZCUSTOMLABEL";
/// Title synced from other devices
pub const COL_ENCRYPTED_TITLE: &str = "ZENCRYPTEDTITLE";
/// Recording time in catalog-epoch seconds
pub const COL_DATE: &str = "ZDATE";
/// Duration in seconds
pub const COL_DURATION: &str = "ZDURATION";

/// Columns a catalog table must have
pub const REQUIRED_COLUMNS: [&str; 6] = [
    COL_PK,
    COL_PATH,
    COL_CUSTOM_LABEL,
    COL_ENCRYPTED_TITLE,
    COL_DATE,
    COL_DURATION,
];

/// Everything one full read produced
#[derive(Debug, Default)]
pub struct CatalogBatch {
    /// Rows that decoded
    pub rows: Vec<RawRow>,
    /// Rows that did not (always `CatalogError::RowDecode`)
    pub row_errors: Vec<CatalogError>,
}

/// Read-only connection to a catalog table
pub struct CatalogReader {
    pool: SqlitePool,
    path: PathBuf,
    table: String,
    columns: Vec<String>,
}

impl CatalogReader {
    /// Open the catalog read-only and verify the table layout
    pub async fn open(
        path: &Path,
        table: &str,
        busy_timeout: Duration,
    ) -> Result<Self, CatalogError> {
        let unavailable = |reason: String| CatalogError::StoreUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        if !path.exists() {
            return Err(unavailable("file not found".to_string()));
        }

        // read_only maps to SQLITE_OPEN_READONLY; the catalog belongs to another app
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .acquire_timeout(busy_timeout + Duration::from_secs(2))
            .connect_with(options)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?1)")
                .bind(table)
                .fetch_all(&pool)
                .await
                .map_err(|e| unavailable(e.to_string()))?;

        if columns.is_empty() {
            debug!("Table {} not found in {}", table, path.display());
        } else {
            debug!("Table {} columns: {}", table, columns.join(", "));
        }

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|required| !columns.iter().any(|c| c.eq_ignore_ascii_case(required)))
            .map(|required| required.to_string())
            .collect();

        if !missing.is_empty() {
            pool.close().await;
            return Err(CatalogError::SchemaMismatch {
                table: table.to_string(),
                missing,
            });
        }

        info!(
            "Opened catalog {} (table {}, {} columns, read-only)",
            path.display(),
            table,
            columns.len()
        );

        Ok(Self {
            pool,
            path: path.to_path_buf(),
            table: table.to_string(),
            columns,
        })
    }

    /// Columns discovered in the catalog table
    pub fn table_columns(&self) -> &[String] {
        &self.columns
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream every row of the table, ordered by primary key
    ///
    /// Undecodable rows come through as `RowDecode` items and the stream
    /// continues. A store failure mid-read yields one `StoreUnavailable`
    /// item and ends the stream.
    pub fn rows(&self) -> impl Stream<Item = Result<RawRow, CatalogError>> + Send + 'static {
        let pool = self.pool.clone();
        let path = self.path.clone();
        let sql = format!(
            "SELECT * FROM {} ORDER BY {}",
            quote_identifier(&self.table),
            COL_PK
        );

        async_stream::stream! {
            let mut rows = sqlx::query(&sql).fetch(&pool);
            let mut row_index = 0usize;

            while let Some(next) = rows.next().await {
                match next {
                    Ok(row) => match RawRow::from_sqlite(&row) {
                        Ok(raw) => yield Ok(raw),
                        Err(reason) => {
                            warn!("Skipping catalog row {}: {}", row_index, reason);
                            yield Err(CatalogError::RowDecode { row_index, reason });
                        }
                    },
                    Err(e) => {
                        yield Err(CatalogError::StoreUnavailable {
                            path: path.clone(),
                            reason: e.to_string(),
                        });
                        break;
                    }
                }
                row_index += 1;
            }

            debug!("Catalog read finished after {} rows", row_index);
        }
    }

    /// Drain [`CatalogReader::rows`] into a batch
    ///
    /// Fails only on store-level errors; row errors are collected.
    pub async fn read_all(&self) -> Result<CatalogBatch, CatalogError> {
        let mut batch = CatalogBatch::default();
        let rows = self.rows();
        futures::pin_mut!(rows);

        while let Some(item) = rows.next().await {
            match item {
                Ok(row) => batch.rows.push(row),
                Err(e) if e.is_row_level() => batch.row_errors.push(e),
                Err(e) => return Err(e),
            }
        }

        Ok(batch)
    }

    /// Release the connection pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
