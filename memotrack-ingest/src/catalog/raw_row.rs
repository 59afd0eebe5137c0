//! Loosely-typed catalog rows
//!
//! Rows come out of the store as column → value maps. Nothing here knows what
//! a recording is; the normalizer turns a `RawRow` into a `Recording`.

use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::collections::BTreeMap;

/// A single SQLite value in its storage class
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Integer storage only
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RawValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer or real storage
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Integer(v) => Some(*v as f64),
            RawValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Storage class name, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::Null => "NULL",
            RawValue::Integer(_) => "INTEGER",
            RawValue::Real(_) => "REAL",
            RawValue::Text(_) => "TEXT",
            RawValue::Blob(_) => "BLOB",
        }
    }
}

/// Column name → value map with case-insensitive lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    // Keys are stored upper-cased
    values: BTreeMap<String, RawValue>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl AsRef<str>, value: RawValue) {
        self.values
            .insert(column.as_ref().to_ascii_uppercase(), value);
    }

    /// Look a column up ignoring case; absent columns return `None`
    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.values.get(&column.to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Decode an SQLite row by each value's storage class
    pub(crate) fn from_sqlite(row: &SqliteRow) -> Result<Self, String> {
        let mut raw = RawRow::new();

        for (index, column) in row.columns().iter().enumerate() {
            let value_ref = row
                .try_get_raw(index)
                .map_err(|e| format!("column {}: {}", column.name(), e))?;

            let value = if value_ref.is_null() {
                RawValue::Null
            } else {
                let storage = value_ref.type_info().name().to_string();
                let decoded = match storage.as_str() {
                    "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(index).map(RawValue::Integer),
                    "REAL" => row.try_get::<f64, _>(index).map(RawValue::Real),
                    "TEXT" => row.try_get::<String, _>(index).map(RawValue::Text),
                    "BLOB" => row.try_get::<Vec<u8>, _>(index).map(RawValue::Blob),
                    // NUMERIC affinity can hold either
                    _ => row
                        .try_get::<i64, _>(index)
                        .map(RawValue::Integer)
                        .or_else(|_| row.try_get::<f64, _>(index).map(RawValue::Real)),
                };
                decoded.map_err(|e| format!("column {} ({}): {}", column.name(), storage, e))?
            };

            raw.insert(column.name(), value);
        }

        Ok(raw)
    }
}

impl<K: AsRef<str>> FromIterator<(K, RawValue)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, RawValue)>>(iter: I) -> Self {
        let mut raw = RawRow::new();
        for (column, value) in iter {
            raw.insert(column, value);
        }
        raw
    }
}
