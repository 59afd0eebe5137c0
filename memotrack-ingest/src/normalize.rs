//! Record normalizer / validator
//!
//! Turns one loosely-typed catalog row into a [`Recording`]. A row is either
//! admitted (possibly with per-field warnings) or rejected with a
//! [`ValidationFailure`] naming every offending field. Nothing here panics or
//! aborts a batch; the refresh orchestrator decides what to do with the
//! results.
//!
//! Title precedence:
//! 1. user label (`ZCUSTOMLABEL`) when non-empty after trimming
//! 2. alternate title (`ZENCRYPTEDTITLE`) when non-empty after trimming
//! 3. `"Voice Memo YYYY-MM-DD HH:MM"` built from the UTC recording time

use crate::catalog::{
    RawRow, RawValue, COL_CUSTOM_LABEL, COL_DATE, COL_DURATION, COL_ENCRYPTED_TITLE, COL_PATH,
    COL_PK,
};
use chrono::{DateTime, Utc};
use memotrack_common::time::catalog_to_utc;
use memotrack_common::{Recording, RecordingId, TranscriptionStatus};
use serde::Serialize;
use std::fmt;

/// Field names used in validation reports
pub mod field {
    pub const ID: &str = "id";
    pub const PATH: &str = "relative_path";
    pub const DATE: &str = "recorded_at";
    pub const DURATION: &str = "duration_seconds";
    pub const ENCRYPTED_TITLE: &str = "encrypted_title";
    pub const CUSTOM_LABEL: &str = "custom_label";
}

/// One problem with one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: &'static str,
    pub message: String,
}

impl FieldIssue {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A field problem that did not stop the entity from being admitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationWarning {
    pub id: RecordingId,
    pub issue: FieldIssue,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "recording {}: {}", self.id, self.issue)
    }
}

/// The row was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    /// Primary key, when it could be read
    pub id: Option<RecordingId>,
    pub issues: Vec<FieldIssue>,
}

impl ValidationFailure {
    /// Names of the offending fields
    pub fn fields(&self) -> Vec<&'static str> {
        self.issues.iter().map(|i| i.field).collect()
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "recording {} rejected: ", id)?,
            None => write!(f, "row rejected: ")?,
        }
        let issues: Vec<String> = self.issues.iter().map(ToString::to_string).collect();
        f.write_str(&issues.join("; "))
    }
}

impl std::error::Error for ValidationFailure {}

/// An admitted entity plus whatever was flagged on the way in
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub recording: Recording,
    pub warnings: Vec<ValidationWarning>,
}

/// Normalize one catalog row
///
/// The returned recording always has `file_exists = false` and status `New`;
/// the cross-referencer and the status manager own those fields.
pub fn normalize(row: &RawRow) -> Result<Normalized, ValidationFailure> {
    let mut issues = Vec::new();

    let id = match row.get(COL_PK) {
        Some(RawValue::Integer(pk)) => Some(RecordingId(*pk)),
        Some(other) => {
            issues.push(FieldIssue::new(
                field::ID,
                format!("expected INTEGER primary key, found {}", other.type_name()),
            ));
            None
        }
        None => {
            issues.push(FieldIssue::new(field::ID, "missing primary key"));
            None
        }
    };

    let relative_path = match row.get(COL_PATH) {
        Some(RawValue::Text(path)) if !path.trim().is_empty() => Some(path.clone()),
        Some(RawValue::Text(_)) => {
            issues.push(FieldIssue::new(field::PATH, "empty path"));
            None
        }
        Some(RawValue::Null) | None => {
            issues.push(FieldIssue::new(field::PATH, "missing path"));
            None
        }
        Some(other) => {
            issues.push(FieldIssue::new(
                field::PATH,
                format!("expected TEXT, found {}", other.type_name()),
            ));
            None
        }
    };

    let recorded_at = match row.get(COL_DATE) {
        Some(value) => match value.as_f64() {
            Some(seconds) => {
                let converted = catalog_to_utc(seconds);
                if converted.is_none() {
                    issues.push(FieldIssue::new(
                        field::DATE,
                        format!("timestamp {} out of range", seconds),
                    ));
                }
                converted
            }
            None if value.is_null() => {
                issues.push(FieldIssue::new(field::DATE, "missing timestamp"));
                None
            }
            None => {
                issues.push(FieldIssue::new(
                    field::DATE,
                    format!("expected numeric timestamp, found {}", value.type_name()),
                ));
                None
            }
        },
        None => {
            issues.push(FieldIssue::new(field::DATE, "missing timestamp"));
            None
        }
    };

    let (id, relative_path, recorded_at) = match (id, relative_path, recorded_at) {
        (Some(id), Some(path), Some(at)) if issues.is_empty() => (id, path, at),
        (id, _, _) => return Err(ValidationFailure { id, issues }),
    };

    let mut warnings = Vec::new();
    let mut warn = |issue: FieldIssue| warnings.push(ValidationWarning { id, issue });

    let duration_seconds = match row.get(COL_DURATION) {
        Some(value) => match value.as_f64() {
            Some(seconds) if seconds.is_finite() && seconds >= 0.0 => Some(seconds),
            Some(seconds) => {
                warn(FieldIssue::new(
                    field::DURATION,
                    format!("invalid duration {}", seconds),
                ));
                None
            }
            None if value.is_null() => {
                warn(FieldIssue::new(field::DURATION, "missing duration"));
                None
            }
            None => {
                warn(FieldIssue::new(
                    field::DURATION,
                    format!("expected numeric duration, found {}", value.type_name()),
                ));
                None
            }
        },
        None => {
            warn(FieldIssue::new(field::DURATION, "missing duration"));
            None
        }
    };

    let label = text_title(row.get(COL_CUSTOM_LABEL), field::CUSTOM_LABEL, &mut warn);
    let alternate = text_title(row.get(COL_ENCRYPTED_TITLE), field::ENCRYPTED_TITLE, &mut warn);
    let title = label
        .or(alternate)
        .unwrap_or_else(|| synthesized_title(recorded_at));

    Ok(Normalized {
        recording: Recording {
            id,
            title,
            recorded_at,
            duration_seconds,
            relative_path,
            file_exists: false,
            status: TranscriptionStatus::New,
        },
        warnings,
    })
}

/// Deterministic fallback title for a recording with no usable titles
pub fn synthesized_title(recorded_at: DateTime<Utc>) -> String {
    format!("Voice Memo {}", recorded_at.format("%Y-%m-%d %H:%M"))
}

/// Trimmed, non-empty text; non-text values are flagged and skipped
fn text_title(
    value: Option<&RawValue>,
    field: &'static str,
    warn: &mut impl FnMut(FieldIssue),
) -> Option<String> {
    match value {
        Some(RawValue::Text(text)) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(RawValue::Null) | None => None,
        Some(other) => {
            warn(FieldIssue::new(
                field,
                format!("expected TEXT, found {}", other.type_name()),
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(label: RawValue, alt: RawValue, date: RawValue, duration: RawValue) -> RawRow {
        [
            (COL_PK, RawValue::Integer(1)),
            (COL_PATH, RawValue::Text("20230101 000000-ABCD.m4a".to_string())),
            (COL_CUSTOM_LABEL, label),
            (COL_ENCRYPTED_TITLE, alt),
            (COL_DATE, date),
            (COL_DURATION, duration),
        ]
        .into_iter()
        .collect()
    }

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    #[test]
    fn test_night_call_scenario() {
        let raw: RawRow = [
            (COL_PK, RawValue::Integer(11)),
            (COL_PATH, text("a.m4a")),
            (COL_CUSTOM_LABEL, text("")),
            (COL_ENCRYPTED_TITLE, text("Night Call")),
            (COL_DATE, RawValue::Integer(694_224_000)),
            (COL_DURATION, RawValue::Real(42.5)),
        ]
        .into_iter()
        .collect();

        let normalized = normalize(&raw).unwrap();
        let rec = normalized.recording;
        assert_eq!(rec.id, RecordingId(11));
        assert_eq!(rec.title, "Night Call");
        assert_eq!(rec.recorded_at.to_rfc3339(), "2023-01-01T00:00:00+00:00");
        assert_eq!(rec.duration_seconds, Some(42.5));
        assert_eq!(rec.relative_path, "a.m4a");
        assert!(!rec.file_exists);
        assert_eq!(rec.status, TranscriptionStatus::New);
        assert!(normalized.warnings.is_empty());
    }

    #[test]
    fn test_user_label_wins_over_alternate_title() {
        let raw = row(
            text("  Standup notes "),
            text("Night Call"),
            RawValue::Real(1000.0),
            RawValue::Real(3.0),
        );
        assert_eq!(normalize(&raw).unwrap().recording.title, "Standup notes");
    }

    #[test]
    fn test_whitespace_titles_fall_back_to_timestamp() {
        let raw = row(text("   "), RawValue::Null, RawValue::Real(694_224_000.0), RawValue::Real(3.0));
        assert_eq!(
            normalize(&raw).unwrap().recording.title,
            "Voice Memo 2023-01-01 00:00"
        );
    }

    #[test]
    fn test_synthesized_title_is_stable() {
        let raw = row(RawValue::Null, RawValue::Null, RawValue::Real(700_000_123.9), RawValue::Null);
        let first = normalize(&raw).unwrap().recording.title;
        for _ in 0..10 {
            assert_eq!(normalize(&raw).unwrap().recording.title, first);
        }
        assert_eq!(first, "Voice Memo 2023-03-08 20:28");
    }

    #[test]
    fn test_negative_duration_is_a_warning() {
        let raw = row(text("x"), RawValue::Null, RawValue::Real(0.0), RawValue::Real(-4.0));
        let normalized = normalize(&raw).unwrap();
        assert_eq!(normalized.recording.duration_seconds, None);
        assert_eq!(normalized.warnings.len(), 1);
        assert_eq!(normalized.warnings[0].issue.field, field::DURATION);
    }

    #[test]
    fn test_missing_duration_is_a_warning() {
        let raw = row(text("x"), RawValue::Null, RawValue::Real(0.0), RawValue::Null);
        let normalized = normalize(&raw).unwrap();
        assert_eq!(normalized.recording.duration_seconds, None);
        assert_eq!(normalized.warnings[0].issue.field, field::DURATION);
    }

    #[test]
    fn test_blob_alternate_title_is_flagged_and_skipped() {
        let raw = row(RawValue::Null, RawValue::Blob(vec![0xde, 0xad]), RawValue::Real(0.0), RawValue::Real(1.0));
        let normalized = normalize(&raw).unwrap();
        assert_eq!(normalized.recording.title, "Voice Memo 2001-01-01 00:00");
        assert_eq!(normalized.warnings[0].issue.field, field::ENCRYPTED_TITLE);
    }

    #[test]
    fn test_missing_path_and_date_rejects_with_all_fields() {
        let raw: RawRow = [
            (COL_PK, RawValue::Integer(5)),
            (COL_PATH, RawValue::Null),
            (COL_DATE, text("yesterday")),
        ]
        .into_iter()
        .collect();

        let failure = normalize(&raw).unwrap_err();
        assert_eq!(failure.id, Some(RecordingId(5)));
        assert_eq!(failure.fields(), vec![field::PATH, field::DATE]);
    }

    #[test]
    fn test_non_integer_primary_key_rejected() {
        let mut raw = row(RawValue::Null, RawValue::Null, RawValue::Real(0.0), RawValue::Real(1.0));
        raw.insert(COL_PK, text("abc"));

        let failure = normalize(&raw).unwrap_err();
        assert_eq!(failure.id, None);
        assert_eq!(failure.fields(), vec![field::ID]);
    }

    #[test]
    fn test_recorded_at_is_source_plus_offset() {
        for seconds in [0i64, 1, 694_224_000, 750_000_000] {
            let raw = row(text("t"), RawValue::Null, RawValue::Integer(seconds), RawValue::Real(1.0));
            let rec = normalize(&raw).unwrap().recording;
            assert_eq!(rec.recorded_at.timestamp(), seconds + 978_307_200);
        }
    }
}
