// ============================================================================
// Append-only audit trail
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditResult {
    Success,
    Failure,
}

impl fmt::Display for AuditResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
        }
    }
}

/// One audit entry. Created, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionAuditLog {
    pub id: Uuid,
    pub user_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub occurred_at_utc: DateTime<Utc>,
    pub summary: String,
    pub payload_json: Option<String>,
    pub result: AuditResult,
    pub script: Option<String>,
}

impl PartitionAuditLog {
    pub fn new(
        user_id: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        summary: impl Into<String>,
        result: AuditResult,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            occurred_at_utc: Utc::now(),
            summary: summary.into(),
            payload_json: None,
            result,
            script: None,
        }
    }

    pub fn with_payload(mut self, payload_json: impl Into<String>) -> Self {
        self.payload_json = Some(payload_json.into());
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_attaches_payload_and_script() {
        let entry = PartitionAuditLog::new(
            "alice",
            "AddBoundary",
            "PartitionConfiguration",
            "cfg-1",
            "added boundary 2024-01-05",
            AuditResult::Success,
        )
        .with_payload("{\"filegroup\":\"FG_ARCHIVE\"}")
        .with_script("ALTER PARTITION ...");

        assert_eq!(entry.action, "AddBoundary");
        assert!(entry.payload_json.is_some());
        assert!(entry.script.is_some());
        assert_eq!(entry.result, AuditResult::Success);
    }
}
