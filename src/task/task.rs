// ============================================================================
// BackgroundTask aggregate
// ============================================================================
//
// Tracks one long-running execution, whatever operation backs it. Workers
// advance the task through:
//
// ```text
// PendingValidation ──> Validating ──> Queued ──> Running ──> Succeeded
//         │                              ^                └──> Failed
//         └──────────────(skip)──────────┘
// Cancel: only from PendingValidation / Validating / Queued.
// ```
//
// Every mutating call refreshes the heartbeat and the touched-by operator;
// heartbeat staleness is the only liveness signal a stalled worker leaves.
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::core::{PartitionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    PendingValidation,
    Validating,
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::PendingValidation => "PENDING_VALIDATION",
            Self::Validating => "VALIDATING",
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{}", text)
    }
}

/// One line of the task's execution trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLogEntry {
    pub at_utc: DateTime<Utc>,
    pub phase: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundTask {
    id: Uuid,
    /// Some executions (non-partitioned data movement) have no configuration.
    configuration_id: Option<Uuid>,
    data_source_id: Uuid,
    status: TaskStatus,
    phase: String,
    /// Always within [0, 1].
    progress: f64,
    queued_at_utc: Option<DateTime<Utc>>,
    started_at_utc: Option<DateTime<Utc>>,
    completed_at_utc: Option<DateTime<Utc>>,
    last_heartbeat_utc: DateTime<Utc>,
    failure_reason: Option<String>,
    summary_json: Option<String>,
    /// Point-in-time configuration JSON for failure forensics.
    configuration_snapshot: Option<String>,
    last_checkpoint: Option<String>,
    requested_by: String,
    touched_by: String,
    backup_reference: Option<String>,
    notes: Option<String>,
    priority: i32,
    is_deleted: bool,
    created_at_utc: DateTime<Utc>,
    log: Vec<TaskLogEntry>,
}

impl BackgroundTask {
    pub fn new(
        configuration_id: Option<Uuid>,
        data_source_id: Uuid,
        phase: impl Into<String>,
        requested_by: impl Into<String>,
        priority: i32,
    ) -> Self {
        let requested_by = requested_by.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            configuration_id,
            data_source_id,
            status: TaskStatus::PendingValidation,
            phase: phase.into(),
            progress: 0.0,
            queued_at_utc: None,
            started_at_utc: None,
            completed_at_utc: None,
            last_heartbeat_utc: now,
            failure_reason: None,
            summary_json: None,
            configuration_snapshot: None,
            last_checkpoint: None,
            touched_by: requested_by.clone(),
            requested_by,
            backup_reference: None,
            notes: None,
            priority,
            is_deleted: false,
            created_at_utc: now,
            log: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn configuration_id(&self) -> Option<Uuid> {
        self.configuration_id
    }

    pub fn data_source_id(&self) -> Uuid {
        self.data_source_id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn queued_at_utc(&self) -> Option<DateTime<Utc>> {
        self.queued_at_utc
    }

    pub fn started_at_utc(&self) -> Option<DateTime<Utc>> {
        self.started_at_utc
    }

    pub fn completed_at_utc(&self) -> Option<DateTime<Utc>> {
        self.completed_at_utc
    }

    pub fn last_heartbeat_utc(&self) -> DateTime<Utc> {
        self.last_heartbeat_utc
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn summary_json(&self) -> Option<&str> {
        self.summary_json.as_deref()
    }

    pub fn configuration_snapshot(&self) -> Option<&str> {
        self.configuration_snapshot.as_deref()
    }

    pub fn last_checkpoint(&self) -> Option<&str> {
        self.last_checkpoint.as_deref()
    }

    pub fn requested_by(&self) -> &str {
        &self.requested_by
    }

    pub fn touched_by(&self) -> &str {
        &self.touched_by
    }

    pub fn backup_reference(&self) -> Option<&str> {
        self.backup_reference.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn created_at_utc(&self) -> DateTime<Utc> {
        self.created_at_utc
    }

    pub fn log(&self) -> &[TaskLogEntry] {
        &self.log
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// # Errors
    /// Fails unless the task is pending validation.
    pub fn mark_validating(&mut self, by: &str) -> Result<()> {
        self.expect_status(&[TaskStatus::PendingValidation], "只有待校验的任务才能开始校验")?;
        self.status = TaskStatus::Validating;
        self.append_log("validating", "validation started");
        self.refresh(by);
        Ok(())
    }

    /// Validation is optional: Queued is reachable straight from
    /// PendingValidation.
    ///
    /// # Errors
    /// Fails from any state other than PendingValidation / Validating.
    pub fn mark_queued(&mut self, by: &str) -> Result<()> {
        self.expect_status(
            &[TaskStatus::PendingValidation, TaskStatus::Validating],
            "只有待校验或校验中的任务才能进入队列",
        )?;
        self.status = TaskStatus::Queued;
        self.queued_at_utc = Some(Utc::now());
        self.append_log("queued", "accepted for background execution");
        self.refresh(by);
        Ok(())
    }

    /// # Errors
    /// Fails unless the task is queued.
    pub fn mark_running(&mut self, by: &str) -> Result<()> {
        self.expect_status(&[TaskStatus::Queued], "只有排队中的任务才能进入执行")?;
        self.status = TaskStatus::Running;
        self.started_at_utc = Some(Utc::now());
        self.append_log("running", "execution started");
        self.refresh(by);
        Ok(())
    }

    /// Progress updates are only meaningful while the task is doing work.
    ///
    /// # Errors
    /// Fails outside Validating / Running. Values are clamped to [0, 1].
    pub fn update_progress(&mut self, progress: f64, by: &str) -> Result<()> {
        self.expect_status(
            &[TaskStatus::Validating, TaskStatus::Running],
            "只有校验中或执行中的任务才能更新进度",
        )?;
        self.progress = progress.clamp(0.0, 1.0);
        self.refresh(by);
        Ok(())
    }

    /// # Errors
    /// Fails once the task is completed.
    pub fn update_phase(&mut self, phase: impl Into<String>, by: &str) -> Result<()> {
        self.ensure_not_completed("更新阶段")?;
        self.phase = phase.into();
        let phase = self.phase.clone();
        self.append_log(&phase, "phase changed");
        self.refresh(by);
        Ok(())
    }

    /// # Errors
    /// Fails once the task is completed.
    pub fn save_configuration_snapshot(&mut self, snapshot_json: String, by: &str) -> Result<()> {
        self.ensure_not_completed("保存配置快照")?;
        self.configuration_snapshot = Some(snapshot_json);
        self.refresh(by);
        Ok(())
    }

    /// # Errors
    /// Fails once the task is completed.
    pub fn update_checkpoint(&mut self, checkpoint: impl Into<String>, by: &str) -> Result<()> {
        self.ensure_not_completed("更新检查点")?;
        self.last_checkpoint = Some(checkpoint.into());
        self.refresh(by);
        Ok(())
    }

    /// # Errors
    /// Fails once the task is completed.
    pub fn update_heartbeat(&mut self, by: &str) -> Result<()> {
        self.ensure_not_completed("更新心跳")?;
        self.refresh(by);
        Ok(())
    }

    pub fn set_backup_reference(&mut self, reference: impl Into<String>, by: &str) -> Result<()> {
        self.ensure_not_completed("记录备份引用")?;
        self.backup_reference = Some(reference.into());
        self.refresh(by);
        Ok(())
    }

    pub fn set_notes(&mut self, notes: impl Into<String>, by: &str) -> Result<()> {
        self.ensure_not_completed("更新备注")?;
        self.notes = Some(notes.into());
        self.refresh(by);
        Ok(())
    }

    /// Success forces progress to 1 and clears any earlier failure reason.
    ///
    /// # Errors
    /// Fails unless the task is running.
    pub fn mark_succeeded(&mut self, summary_json: Option<String>, by: &str) -> Result<()> {
        self.expect_status(&[TaskStatus::Running], "只有执行中的任务才能标记成功")?;
        self.status = TaskStatus::Succeeded;
        self.progress = 1.0;
        self.failure_reason = None;
        self.summary_json = summary_json;
        self.completed_at_utc = Some(Utc::now());
        self.append_log("succeeded", "execution finished");
        self.refresh(by);
        Ok(())
    }

    /// # Errors
    /// Fails unless the task is running, or when the reason is empty.
    pub fn mark_failed(&mut self, reason: impl Into<String>, by: &str) -> Result<()> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(PartitionError::Validation("失败原因不能为空".into()));
        }
        self.expect_status(&[TaskStatus::Running], "只有执行中的任务才能标记失败")?;
        self.status = TaskStatus::Failed;
        self.failure_reason = Some(reason.clone());
        self.completed_at_utc = Some(Utc::now());
        self.append_log("failed", &reason);
        self.refresh(by);
        Ok(())
    }

    /// Cooperative cancellation. A running task must reach a terminal state
    /// on its own.
    ///
    /// # Errors
    /// Fails from Running or any completed state.
    pub fn cancel(&mut self, by: &str) -> Result<()> {
        self.expect_status(
            &[
                TaskStatus::PendingValidation,
                TaskStatus::Validating,
                TaskStatus::Queued,
            ],
            "任务已开始执行或已结束,无法取消",
        )?;
        self.status = TaskStatus::Cancelled;
        self.completed_at_utc = Some(Utc::now());
        self.append_log("cancelled", "cancelled by operator");
        self.refresh(by);
        Ok(())
    }

    pub fn soft_delete(&mut self, by: &str) {
        self.is_deleted = true;
        self.refresh(by);
    }

    fn expect_status(&self, allowed: &[TaskStatus], message: &str) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(PartitionError::InvalidTransition(format!(
                "{} (任务 {} 当前状态: {})",
                message, self.id, self.status
            )))
        }
    }

    fn ensure_not_completed(&self, action: &str) -> Result<()> {
        if self.is_completed() {
            return Err(PartitionError::InvalidTransition(format!(
                "任务 {} 已结束,无法{}",
                self.id, action
            )));
        }
        Ok(())
    }

    fn refresh(&mut self, by: &str) {
        self.last_heartbeat_utc = Utc::now();
        self.touched_by = by.to_string();
    }

    fn append_log(&mut self, phase: &str, message: &str) {
        self.log.push(TaskLogEntry {
            at_utc: Utc::now(),
            phase: phase.to_string(),
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> BackgroundTask {
        BackgroundTask::new(Some(Uuid::new_v4()), Uuid::new_v4(), "created", "tester", 0)
    }

    #[test]
    fn test_full_lifecycle() {
        let mut t = task();
        t.mark_validating("w").unwrap();
        t.mark_queued("w").unwrap();
        t.mark_running("w").unwrap();
        t.update_progress(0.4, "w").unwrap();
        t.mark_succeeded(Some("{\"rows\":0}".into()), "w").unwrap();

        assert_eq!(t.status(), TaskStatus::Succeeded);
        assert_eq!(t.progress(), 1.0);
        assert!(t.completed_at_utc().is_some());
        assert!(t.failure_reason().is_none());
        assert!(t.is_completed());
    }

    #[test]
    fn test_queued_directly_from_pending() {
        let mut t = task();
        assert!(t.mark_queued("w").is_ok());
    }

    #[test]
    fn test_running_requires_queued() {
        let mut t = task();
        let err = t.mark_running("w").unwrap_err();
        assert!(err.to_string().contains("只有排队中的任务才能进入执行"));
    }

    #[test]
    fn test_cancel_window() {
        for setup in 0..3 {
            let mut t = task();
            if setup >= 1 {
                t.mark_validating("w").unwrap();
            }
            if setup >= 2 {
                t.mark_queued("w").unwrap();
            }
            assert!(t.cancel("w").is_ok(), "cancel failed at stage {}", setup);
            assert_eq!(t.status(), TaskStatus::Cancelled);
        }
    }

    #[test]
    fn test_cancel_refused_after_start() {
        let mut t = task();
        t.mark_queued("w").unwrap();
        t.mark_running("w").unwrap();
        assert!(t.cancel("w").is_err());

        t.mark_failed("disk full", "w").unwrap();
        assert!(t.cancel("w").is_err());
    }

    #[test]
    fn test_progress_clamped_and_gated() {
        let mut t = task();
        assert!(t.update_progress(0.5, "w").is_err());
        t.mark_validating("w").unwrap();
        t.update_progress(7.5, "w").unwrap();
        assert_eq!(t.progress(), 1.0);
        t.update_progress(-3.0, "w").unwrap();
        assert_eq!(t.progress(), 0.0);
    }

    #[test]
    fn test_mutators_refresh_heartbeat_and_operator() {
        let mut t = task();
        let before = t.last_heartbeat_utc();
        t.mark_queued("worker-7").unwrap();
        assert!(t.last_heartbeat_utc() >= before);
        assert_eq!(t.touched_by(), "worker-7");
    }

    #[test]
    fn test_failed_requires_reason() {
        let mut t = task();
        t.mark_queued("w").unwrap();
        t.mark_running("w").unwrap();
        assert!(t.mark_failed("", "w").is_err());
        t.mark_failed("timeout", "w").unwrap();
        assert_eq!(t.failure_reason(), Some("timeout"));
    }

    #[test]
    fn test_no_updates_after_completion() {
        let mut t = task();
        t.cancel("w").unwrap();
        assert!(t.update_phase("late", "w").is_err());
        assert!(t.update_heartbeat("w").is_err());
        assert!(t.update_checkpoint("cp", "w").is_err());
    }

    #[test]
    fn test_log_trail_records_transitions() {
        let mut t = task();
        t.mark_validating("w").unwrap();
        t.mark_queued("w").unwrap();
        let phases: Vec<&str> = t.log().iter().map(|e| e.phase.as_str()).collect();
        assert_eq!(phases, vec!["validating", "queued"]);
    }
}
