//! Catalog reader integration tests against on-disk SQLite fixtures

mod helpers;

use futures::StreamExt;
use helpers::{FixtureCatalog, FixtureRow};
use memotrack_ingest::catalog::{
    CatalogReader, RawValue, COL_CUSTOM_LABEL, COL_DATE, COL_DURATION, COL_ENCRYPTED_TITLE,
    COL_PATH, COL_PK, REQUIRED_COLUMNS,
};
use memotrack_ingest::CatalogError;
use std::time::Duration;

const TABLE: &str = "ZCLOUDRECORDING";

async fn open(catalog: &FixtureCatalog) -> Result<CatalogReader, CatalogError> {
    CatalogReader::open(&catalog.catalog_path(), TABLE, Duration::from_millis(250)).await
}

#[tokio::test]
async fn test_reads_rows_in_primary_key_order() {
    let catalog = FixtureCatalog::new().await.unwrap();
    for pk in [3, 1, 2] {
        catalog.insert(&FixtureRow::valid(pk, 694_224_000.5)).await.unwrap();
    }

    let reader = open(&catalog).await.unwrap();
    let batch = reader.read_all().await.unwrap();

    assert!(batch.row_errors.is_empty());
    let pks: Vec<i64> = batch
        .rows
        .iter()
        .map(|row| row.get(COL_PK).and_then(RawValue::as_i64).unwrap())
        .collect();
    assert_eq!(pks, vec![1, 2, 3]);
    assert_eq!(
        batch.rows[0].get(COL_PATH),
        Some(&RawValue::Text("1.m4a".to_string()))
    );
}

#[tokio::test]
async fn test_null_columns_come_through_as_null() {
    let catalog = FixtureCatalog::new().await.unwrap();
    catalog
        .insert(&FixtureRow {
            pk: 7,
            ..FixtureRow::default()
        })
        .await
        .unwrap();

    let reader = open(&catalog).await.unwrap();
    let batch = reader.read_all().await.unwrap();

    assert_eq!(batch.rows.len(), 1);
    assert_eq!(batch.rows[0].get(COL_DATE), Some(&RawValue::Null));
    assert_eq!(batch.rows[0].get("zpath"), Some(&RawValue::Null));
}

#[tokio::test]
async fn test_extra_columns_are_tolerated() {
    let catalog = FixtureCatalog::new().await.unwrap();
    let reader = open(&catalog).await.unwrap();

    let columns = reader.table_columns();
    assert!(columns.iter().any(|c| c == "Z_ENT"));
    for required in REQUIRED_COLUMNS {
        assert!(columns.iter().any(|c| c == required), "{} not listed", required);
    }
}

#[tokio::test]
async fn test_missing_table_is_schema_mismatch() {
    let catalog = FixtureCatalog::without_table().await.unwrap();
    catalog.execute("CREATE TABLE ZFOLDER (Z_PK INTEGER PRIMARY KEY)").await.unwrap();

    match open(&catalog).await {
        Err(CatalogError::SchemaMismatch { table, missing }) => {
            assert_eq!(table, TABLE);
            assert_eq!(missing, REQUIRED_COLUMNS.to_vec());
        }
        other => panic!("expected SchemaMismatch, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_missing_column_is_schema_mismatch() {
    let catalog = FixtureCatalog::without_table().await.unwrap();
    catalog
        .execute("CREATE TABLE ZCLOUDRECORDING (Z_PK INTEGER PRIMARY KEY, ZPATH VARCHAR, ZDATE TIMESTAMP)")
        .await
        .unwrap();

    let err = open(&catalog).await.err().unwrap();
    assert_eq!(
        err.to_string(),
        "Catalog schema mismatch in table ZCLOUDRECORDING: missing columns ZCUSTOMLABEL, ZENCRYPTEDTITLE, ZDURATION"
    );
    match err {
        CatalogError::SchemaMismatch { missing, .. } => {
            assert_eq!(missing, vec![COL_CUSTOM_LABEL, COL_ENCRYPTED_TITLE, COL_DURATION]);
        }
        other => panic!("expected SchemaMismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_not_a_database_is_unavailable() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("CloudRecordings.db");
    std::fs::write(&path, b"this is not sqlite at all, just some bytes on disk").unwrap();

    let result = CatalogReader::open(&path, TABLE, Duration::from_millis(50)).await;
    assert!(matches!(result, Err(CatalogError::StoreUnavailable { .. })));
}

#[tokio::test]
async fn test_undecodable_row_does_not_stop_the_read() {
    let catalog = FixtureCatalog::new().await.unwrap();
    catalog.insert(&FixtureRow::valid(1, 1.0)).await.unwrap();
    // TEXT that is not valid UTF-8
    catalog
        .execute(
            "INSERT INTO ZCLOUDRECORDING (Z_PK, ZPATH, ZCUSTOMLABEL, ZDATE, ZDURATION)
             VALUES (2, '2.m4a', CAST(X'FFFE' AS TEXT), 2.0, 1.0)",
        )
        .await
        .unwrap();
    catalog.insert(&FixtureRow::valid(3, 3.0)).await.unwrap();

    let reader = open(&catalog).await.unwrap();
    let batch = reader.read_all().await.unwrap();

    assert_eq!(batch.rows.len(), 2);
    assert_eq!(batch.row_errors.len(), 1);
    match &batch.row_errors[0] {
        CatalogError::RowDecode { row_index, .. } => assert_eq!(*row_index, 1),
        other => panic!("expected RowDecode, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stream_is_restartable() {
    let catalog = FixtureCatalog::new().await.unwrap();
    for pk in 1..=5 {
        catalog.insert(&FixtureRow::valid(pk, pk as f64)).await.unwrap();
    }
    let reader = open(&catalog).await.unwrap();

    // Abandon the first read after two rows
    let partial: Vec<_> = reader.rows().take(2).collect().await;
    assert_eq!(partial.len(), 2);

    let full: Vec<_> = reader.rows().collect().await;
    assert_eq!(full.len(), 5);
    assert!(full.iter().all(Result::is_ok));
}

#[tokio::test]
async fn test_reader_never_writes() {
    let catalog = FixtureCatalog::new().await.unwrap();
    catalog.insert(&FixtureRow::valid(1, 1.0)).await.unwrap();
    let before = std::fs::read(catalog.catalog_path()).unwrap();

    let reader = open(&catalog).await.unwrap();
    reader.read_all().await.unwrap();
    reader.close().await;

    assert_eq!(std::fs::read(catalog.catalog_path()).unwrap(), before);
}
