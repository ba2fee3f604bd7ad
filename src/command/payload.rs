use serde::{Deserialize, Serialize};

use crate::core::{PartitionValue, PartitionValueKind, Result};

/// Serialized operation arguments persisted with a command.
///
/// Values travel as culture-invariant text (no locale separators, no quote
/// characters) so a payload written on one machine replays anywhere; see
/// `PartitionValue::invariant_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum CommandPayload {
    Split {
        boundary_value: String,
        value_kind: PartitionValueKind,
        filegroup: Option<String>,
        backup_confirmed: bool,
    },
    Merge {
        boundary_key: String,
    },
    Switch {
        source_boundary_key: String,
        target_schema: String,
        target_table: String,
        target_database: Option<String>,
        create_staging_table: bool,
    },
}

impl CommandPayload {
    pub fn split(value: &PartitionValue, filegroup: Option<String>, backup_confirmed: bool) -> Self {
        Self::Split {
            boundary_value: value.invariant_text(),
            value_kind: value.kind(),
            filegroup,
            backup_confirmed,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Recovers the typed boundary value of a split payload.
    pub fn split_value(&self) -> Option<Result<PartitionValue>> {
        match self {
            Self::Split {
                boundary_value,
                value_kind,
                ..
            } => Some(value_kind.parse_value(boundary_value)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_split_payload_round_trip() {
        let value = PartitionValue::Date(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        let payload = CommandPayload::split(&value, Some("FG_ARCHIVE".into()), true);
        let json = payload.to_json().unwrap();
        assert!(!json.contains('\''));
        let restored = CommandPayload::from_json(&json).unwrap();
        assert_eq!(restored, payload);
        assert_eq!(restored.split_value().unwrap().unwrap(), value);
    }

    #[test]
    fn test_payload_is_culture_invariant() {
        let dt = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(13, 30, 0)
            .unwrap();
        let payload = CommandPayload::split(&PartitionValue::DateTime(dt), None, true);
        let json = payload.to_json().unwrap();
        assert!(json.contains("2024-06-01T13:30:00"));
        assert!(!json.contains('\''));
    }
}
