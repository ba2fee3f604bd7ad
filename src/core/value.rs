use std::cmp::Ordering;
use std::fmt;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::core::{PartitionError, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DATETIME2_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Typed partition boundary value.
///
/// A boundary value is immutable and has no identity; it only knows how to
/// order itself against values of the *same* kind and how to render itself
/// as a SQL literal or as culture-invariant round-trippable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum PartitionValue {
    Int32(i32),
    Int64(i64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// High-precision date-time (sub-second fraction, DATETIME2 semantics).
    DateTime2(NaiveDateTime),
    Uuid(Uuid),
    Text(String),
}

/// Kind discriminator for [`PartitionValue`], carried by partition columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionValueKind {
    Int32,
    Int64,
    Date,
    DateTime,
    DateTime2,
    Uuid,
    Text,
}

impl PartitionValue {
    pub fn kind(&self) -> PartitionValueKind {
        match self {
            Self::Int32(_) => PartitionValueKind::Int32,
            Self::Int64(_) => PartitionValueKind::Int64,
            Self::Date(_) => PartitionValueKind::Date,
            Self::DateTime(_) => PartitionValueKind::DateTime,
            Self::DateTime2(_) => PartitionValueKind::DateTime2,
            Self::Uuid(_) => PartitionValueKind::Uuid,
            Self::Text(_) => PartitionValueKind::Text,
        }
    }

    /// Compare against a value of the same kind.
    ///
    /// Comparing across kinds is a programming error - a configuration only
    /// ever holds boundaries of its column's kind - so this panics instead of
    /// returning a domain error.
    pub fn compare(&self, other: &PartitionValue) -> Ordering {
        match (self, other) {
            (Self::Int32(a), Self::Int32(b)) => a.cmp(b),
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::DateTime(a), Self::DateTime(b)) => a.cmp(b),
            (Self::DateTime2(a), Self::DateTime2(b)) => a.cmp(b),
            (Self::Uuid(a), Self::Uuid(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => panic!(
                "cannot compare partition values of different kinds: {} and {}",
                self.kind(),
                other.kind()
            ),
        }
    }

    /// Render a SQL-safe literal: strings are quote-escaped, dates use fixed
    /// ISO formats, numbers are bare invariant digits.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Int32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::Date(v) => format!("'{}'", v.format(DATE_FORMAT)),
            Self::DateTime(v) => format!("'{}'", v.format(DATETIME_FORMAT)),
            Self::DateTime2(v) => format!("'{}'", v.format(DATETIME2_FORMAT)),
            Self::Uuid(v) => format!("'{}'", v),
            Self::Text(v) => format!("N'{}'", v.replace('\'', "''")),
        }
    }

    /// Culture-invariant text form used in persisted payloads and as the
    /// default boundary sort key. Round-trips through
    /// [`PartitionValueKind::parse_value`]. Contains no quote characters and
    /// no locale-dependent separators.
    pub fn invariant_text(&self) -> String {
        match self {
            Self::Int32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::Date(v) => v.format(DATE_FORMAT).to_string(),
            Self::DateTime(v) => v.format(DATETIME_FORMAT).to_string(),
            Self::DateTime2(v) => v.format(DATETIME2_FORMAT).to_string(),
            Self::Uuid(v) => v.to_string(),
            Self::Text(v) => v.clone(),
        }
    }
}

impl fmt::Display for PartitionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.invariant_text())
    }
}

impl PartitionValueKind {
    /// SQL type name of the kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int32 => "INT",
            Self::Int64 => "BIGINT",
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
            Self::DateTime2 => "DATETIME2",
            Self::Uuid => "UNIQUEIDENTIFIER",
            Self::Text => "NVARCHAR",
        }
    }

    /// Parse culture-invariant text back into a value of this kind.
    ///
    /// # Errors
    /// Returns a validation error when the text is not a valid rendering of
    /// this kind.
    pub fn parse_value(&self, text: &str) -> Result<PartitionValue> {
        let trimmed = text.trim();
        match self {
            Self::Int32 => trimmed
                .parse::<i32>()
                .map(PartitionValue::Int32)
                .map_err(|_| invalid(trimmed, "INT")),
            Self::Int64 => trimmed
                .parse::<i64>()
                .map(PartitionValue::Int64)
                .map_err(|_| invalid(trimmed, "BIGINT")),
            Self::Date => NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .map(PartitionValue::Date)
                .map_err(|_| invalid(trimmed, "DATE")),
            Self::DateTime => parse_datetime(trimmed)
                .map(PartitionValue::DateTime)
                .ok_or_else(|| invalid(trimmed, "DATETIME")),
            Self::DateTime2 => parse_datetime(trimmed)
                .map(PartitionValue::DateTime2)
                .ok_or_else(|| invalid(trimmed, "DATETIME2")),
            Self::Uuid => Uuid::parse_str(trimmed)
                .map(PartitionValue::Uuid)
                .map_err(|_| invalid(trimmed, "UNIQUEIDENTIFIER")),
            Self::Text => Ok(PartitionValue::Text(trimmed.to_string())),
        }
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    // Accept a bare date as midnight, matching how operators type boundaries.
    NaiveDateTime::parse_from_str(text, DATETIME2_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, DATETIME_FORMAT))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn invalid(text: &str, type_name: &str) -> PartitionError {
    PartitionError::Validation(format!("'{}' is not a valid {} boundary value", text, type_name))
}

impl fmt::Display for PartitionValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

impl From<i32> for PartitionValue {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for PartitionValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<NaiveDate> for PartitionValue {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<Uuid> for PartitionValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<&str> for PartitionValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for PartitionValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> PartitionValue {
        PartitionValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_same_kind_ordering() {
        assert_eq!(
            PartitionValue::Int32(1).compare(&PartitionValue::Int32(2)),
            Ordering::Less
        );
        assert_eq!(date(2024, 1, 1).compare(&date(2024, 1, 5)), Ordering::Less);
        assert_eq!(
            PartitionValue::Text("a".into()).compare(&PartitionValue::Text("a".into())),
            Ordering::Equal
        );
    }

    #[test]
    #[should_panic(expected = "different kinds")]
    fn test_cross_kind_comparison_panics() {
        let _ = PartitionValue::Int32(1).compare(&PartitionValue::Int64(1));
    }

    #[test]
    fn test_sql_literals() {
        assert_eq!(PartitionValue::Int64(42).to_sql_literal(), "42");
        assert_eq!(date(2024, 1, 1).to_sql_literal(), "'2024-01-01'");
        assert_eq!(
            PartitionValue::Text("O'Brien".into()).to_sql_literal(),
            "N'O''Brien'"
        );
    }

    #[test]
    fn test_datetime_literal_is_iso() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(13, 45, 0)
            .unwrap();
        assert_eq!(
            PartitionValue::DateTime(dt).to_sql_literal(),
            "'2024-03-15T13:45:00'"
        );
    }

    #[test]
    fn test_invariant_text_round_trip() {
        let cases = vec![
            PartitionValue::Int32(-7),
            PartitionValue::Int64(9_000_000_000),
            date(2031, 12, 31),
            PartitionValue::Uuid(Uuid::new_v4()),
            PartitionValue::Text("archive".into()),
        ];
        for value in cases {
            let parsed = value.kind().parse_value(&value.invariant_text()).unwrap();
            assert_eq!(parsed, value);
        }
    }

    #[test]
    fn test_invariant_text_has_no_quotes() {
        let dt = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        for value in [
            PartitionValue::DateTime2(dt),
            PartitionValue::Int32(1000000),
            PartitionValue::Uuid(Uuid::nil()),
        ] {
            let text = value.invariant_text();
            assert!(!text.contains('\''), "unexpected quote in {}", text);
            assert!(!text.contains(','), "unexpected separator in {}", text);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(PartitionValueKind::Int32.parse_value("abc").is_err());
        assert!(PartitionValueKind::Date.parse_value("01/02/2024").is_err());
        assert!(PartitionValueKind::Uuid.parse_value("not-a-uuid").is_err());
    }

    #[test]
    fn test_datetime_parse_accepts_bare_date() {
        let parsed = PartitionValueKind::DateTime.parse_value("2024-01-01").unwrap();
        assert_eq!(parsed.invariant_text(), "2024-01-01T00:00:00");
    }
}
