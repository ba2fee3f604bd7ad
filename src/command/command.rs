// ============================================================================
// PartitionCommand aggregate
// ============================================================================
//
// One reviewed DDL change request. Commands are created in PendingApproval,
// advanced by the approval action and the queue worker, and never deleted:
// terminal commands stay queryable as part of the audit trail.
//
// State transitions:
// ```text
// PendingApproval ──approve──> Approved ──pickup──> Queued ──> Executing ──> Succeeded
//       │                         │                                │
//       └──reject──> Rejected     └───────────(direct)──> Executing└──────> Failed
// ```
// Queueing is advisory: a command may enter Executing straight from Approved.
// Every illegal transition is an error, never silently ignored.
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::core::{PartitionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandType {
    Split,
    Merge,
    Switch,
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Split => write!(f, "SPLIT"),
            Self::Merge => write!(f, "MERGE"),
            Self::Switch => write!(f, "SWITCH"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStatus {
    PendingApproval,
    Approved,
    Queued,
    Executing,
    Succeeded,
    Failed,
    Rejected,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Rejected)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Approved => "APPROVED",
            Self::Queued => "QUEUED",
            Self::Executing => "EXECUTING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Rejected => "REJECTED",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionCommand {
    id: Uuid,
    data_source_id: Uuid,
    schema: String,
    table: String,
    command_type: CommandType,
    status: CommandStatus,
    script: String,
    script_hash: Uuid,
    risk_notes: Vec<String>,
    /// Serialized operation arguments, culture-invariant (see command::payload).
    payload: String,
    preview_json: Option<String>,
    execution_log: Option<String>,
    requested_by: String,
    requested_at_utc: DateTime<Utc>,
    decided_by: Option<String>,
    decided_at_utc: Option<DateTime<Utc>>,
    queued_by: Option<String>,
    queued_at_utc: Option<DateTime<Utc>>,
    executed_by: Option<String>,
    executed_at_utc: Option<DateTime<Utc>>,
    completed_at_utc: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
}

impl PartitionCommand {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        data_source_id: Uuid,
        schema: impl Into<String>,
        table: impl Into<String>,
        command_type: CommandType,
        script: String,
        script_hash: Uuid,
        payload: String,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            data_source_id,
            schema: schema.into(),
            table: table.into(),
            command_type,
            status: CommandStatus::PendingApproval,
            script,
            script_hash,
            risk_notes: Vec::new(),
            payload,
            preview_json: None,
            execution_log: None,
            requested_by: requested_by.into(),
            requested_at_utc: Utc::now(),
            decided_by: None,
            decided_at_utc: None,
            queued_by: None,
            queued_at_utc: None,
            executed_by: None,
            executed_at_utc: None,
            completed_at_utc: None,
            failure_reason: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn data_source_id(&self) -> Uuid {
        self.data_source_id
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn script_hash(&self) -> Uuid {
        self.script_hash
    }

    pub fn risk_notes(&self) -> &[String] {
        &self.risk_notes
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn preview_json(&self) -> Option<&str> {
        self.preview_json.as_deref()
    }

    pub fn execution_log(&self) -> Option<&str> {
        self.execution_log.as_deref()
    }

    pub fn requested_by(&self) -> &str {
        &self.requested_by
    }

    pub fn requested_at_utc(&self) -> DateTime<Utc> {
        self.requested_at_utc
    }

    pub fn decided_by(&self) -> Option<&str> {
        self.decided_by.as_deref()
    }

    pub fn queued_by(&self) -> Option<&str> {
        self.queued_by.as_deref()
    }

    pub fn executed_at_utc(&self) -> Option<DateTime<Utc>> {
        self.executed_at_utc
    }

    pub fn completed_at_utc(&self) -> Option<DateTime<Utc>> {
        self.completed_at_utc
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn add_risk_note(&mut self, note: impl Into<String>) {
        self.risk_notes.push(note.into());
    }

    pub fn set_preview_json(&mut self, json: String) {
        self.preview_json = Some(json);
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// # Errors
    /// Fails unless the command is pending approval.
    pub fn approve(&mut self, approver: impl Into<String>) -> Result<()> {
        self.expect_status(&[CommandStatus::PendingApproval], "approve")?;
        self.status = CommandStatus::Approved;
        self.decided_by = Some(approver.into());
        self.decided_at_utc = Some(Utc::now());
        Ok(())
    }

    /// Terminal. Requires a non-empty reason.
    ///
    /// # Errors
    /// Fails unless pending approval, or when the reason is empty.
    pub fn reject(&mut self, approver: impl Into<String>, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(PartitionError::Validation(
                "a rejection reason is required".into(),
            ));
        }
        self.expect_status(&[CommandStatus::PendingApproval], "reject")?;
        self.status = CommandStatus::Rejected;
        self.decided_by = Some(approver.into());
        self.decided_at_utc = Some(Utc::now());
        self.failure_reason = Some(reason);
        self.completed_at_utc = Some(Utc::now());
        Ok(())
    }

    /// # Errors
    /// Fails unless the command is approved.
    pub fn mark_queued(&mut self, operator: impl Into<String>) -> Result<()> {
        self.expect_status(&[CommandStatus::Approved], "queue")?;
        self.status = CommandStatus::Queued;
        self.queued_by = Some(operator.into());
        self.queued_at_utc = Some(Utc::now());
        Ok(())
    }

    /// Entered from Queued or directly from Approved (queueing is advisory).
    ///
    /// # Errors
    /// Fails from any other state.
    pub fn mark_executing(&mut self, worker: impl Into<String>) -> Result<()> {
        self.expect_status(
            &[CommandStatus::Approved, CommandStatus::Queued],
            "start executing",
        )?;
        self.status = CommandStatus::Executing;
        self.executed_by = Some(worker.into());
        self.executed_at_utc = Some(Utc::now());
        Ok(())
    }

    /// # Errors
    /// Fails unless the command is executing.
    pub fn mark_succeeded(&mut self, execution_log: Option<String>) -> Result<()> {
        self.expect_status(&[CommandStatus::Executing], "complete")?;
        self.status = CommandStatus::Succeeded;
        self.execution_log = execution_log;
        self.completed_at_utc = Some(Utc::now());
        self.failure_reason = None;
        Ok(())
    }

    /// # Errors
    /// Fails unless the command is executing, or when the reason is empty.
    pub fn mark_failed(
        &mut self,
        reason: impl Into<String>,
        execution_log: Option<String>,
    ) -> Result<()> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(PartitionError::Validation(
                "a failure reason is required".into(),
            ));
        }
        self.expect_status(&[CommandStatus::Executing], "fail")?;
        self.status = CommandStatus::Failed;
        self.failure_reason = Some(reason);
        self.execution_log = execution_log;
        self.completed_at_utc = Some(Utc::now());
        Ok(())
    }

    fn expect_status(&self, allowed: &[CommandStatus], action: &str) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(PartitionError::InvalidTransition(format!(
                "cannot {} command {} while it is {}",
                action, self.id, self.status
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> PartitionCommand {
        PartitionCommand::new(
            Uuid::new_v4(),
            "dbo",
            "orders",
            CommandType::Split,
            "ALTER PARTITION ...".into(),
            Uuid::new_v4(),
            "{}".into(),
            "requester",
        )
    }

    #[test]
    fn test_happy_path() {
        let mut cmd = command();
        cmd.approve("reviewer").unwrap();
        cmd.mark_queued("worker-1").unwrap();
        cmd.mark_executing("worker-1").unwrap();
        cmd.mark_succeeded(Some("1 partition split".into())).unwrap();
        assert_eq!(cmd.status(), CommandStatus::Succeeded);
        assert_eq!(cmd.queued_by(), Some("worker-1"));
        assert!(cmd.completed_at_utc().is_some());
        assert_eq!(cmd.decided_by(), Some("reviewer"));
    }

    #[test]
    fn test_executing_directly_from_approved() {
        let mut cmd = command();
        cmd.approve("reviewer").unwrap();
        assert!(cmd.mark_executing("worker-1").is_ok());
    }

    #[test]
    fn test_approve_wrong_state_fails() {
        let mut cmd = command();
        cmd.approve("reviewer").unwrap();
        assert!(cmd.approve("reviewer").is_err());
    }

    #[test]
    fn test_reject_requires_reason() {
        let mut cmd = command();
        assert!(cmd.reject("reviewer", "  ").is_err());
        cmd.reject("reviewer", "wrong window").unwrap();
        assert_eq!(cmd.status(), CommandStatus::Rejected);
        assert!(cmd.status().is_terminal());
        // Terminal: nothing else is allowed.
        assert!(cmd.approve("reviewer").is_err());
        assert!(cmd.mark_executing("w").is_err());
    }

    #[test]
    fn test_fail_requires_reason_and_state() {
        let mut cmd = command();
        assert!(cmd.mark_failed("boom", None).is_err());
        cmd.approve("r").unwrap();
        cmd.mark_executing("w").unwrap();
        assert!(cmd.mark_failed("", None).is_err());
        cmd.mark_failed("lock timeout", Some("log".into())).unwrap();
        assert_eq!(cmd.failure_reason(), Some("lock timeout"));
    }

    #[test]
    fn test_cannot_execute_pending_command() {
        let mut cmd = command();
        assert!(cmd.mark_executing("w").is_err());
        assert!(cmd.mark_queued("w").is_err());
    }
}
