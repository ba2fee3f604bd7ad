// ============================================================================
// Background task service
// ============================================================================

use chrono::Duration;
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::{PartitionError, Result};
use crate::repository::{ConfigurationRepository, TaskRepository};
use crate::task::task::BackgroundTask;

pub struct StartTaskRequest {
    pub configuration_id: Option<Uuid>,
    pub data_source_id: Uuid,
    pub phase: String,
    pub requested_by: String,
    pub priority: i32,
}

pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    configs: Arc<dyn ConfigurationRepository>,
}

impl TaskService {
    pub fn new(tasks: Arc<dyn TaskRepository>, configs: Arc<dyn ConfigurationRepository>) -> Self {
        Self { tasks, configs }
    }

    /// Accepts an operation for background processing.
    ///
    /// At most one active task per data source is a policy enforced here, at
    /// the point tasks are started - the aggregate knows nothing about it.
    ///
    /// # Errors
    /// Fails when the data source already has a non-terminal task.
    pub async fn start(&self, request: StartTaskRequest) -> Result<BackgroundTask> {
        if let Some(active) = self
            .tasks
            .find_active_for_data_source(request.data_source_id)
            .await?
        {
            return Err(PartitionError::Validation(format!(
                "该数据源已有正在进行的任务 ({}),请等待其结束后再发起新任务",
                active.id()
            )));
        }

        let mut task = BackgroundTask::new(
            request.configuration_id,
            request.data_source_id,
            request.phase,
            request.requested_by.clone(),
            request.priority,
        );

        // Freeze the configuration as it looked when the work was accepted,
        // and stamp the task id back onto it for the operator view.
        if let Some(config_id) = request.configuration_id {
            if let Some(mut config) = self.configs.find_by_id(config_id).await? {
                task.save_configuration_snapshot(config.snapshot_json()?, &request.requested_by)?;
                config.record_execution_task(task.id());
                self.configs.update(config).await?;
            }
        }

        self.tasks.insert(task.clone()).await?;
        info!("started background task {} on data source {}", task.id(), task.data_source_id());
        Ok(task)
    }

    pub async fn get(&self, id: Uuid) -> Result<BackgroundTask> {
        self.tasks
            .find_by_id(id)
            .await?
            .ok_or_else(|| PartitionError::TaskNotFound(id.to_string()))
    }

    pub async fn list_recent(&self, limit: usize) -> Result<Vec<BackgroundTask>> {
        self.tasks.list_recent(limit).await
    }

    pub async fn list_stale(&self, threshold: Duration) -> Result<Vec<BackgroundTask>> {
        self.tasks.list_stale(threshold).await
    }

    pub async fn mark_validating(&self, id: Uuid, by: &str) -> Result<BackgroundTask> {
        self.mutate(id, |task| task.mark_validating(by)).await
    }

    pub async fn mark_queued(&self, id: Uuid, by: &str) -> Result<BackgroundTask> {
        self.mutate(id, |task| task.mark_queued(by)).await
    }

    pub async fn mark_running(&self, id: Uuid, by: &str) -> Result<BackgroundTask> {
        self.mutate(id, |task| task.mark_running(by)).await
    }

    pub async fn update_progress(&self, id: Uuid, progress: f64, by: &str) -> Result<BackgroundTask> {
        self.mutate(id, |task| task.update_progress(progress, by)).await
    }

    pub async fn update_phase(&self, id: Uuid, phase: &str, by: &str) -> Result<BackgroundTask> {
        self.mutate(id, |task| task.update_phase(phase, by)).await
    }

    pub async fn update_checkpoint(&self, id: Uuid, checkpoint: &str, by: &str) -> Result<BackgroundTask> {
        self.mutate(id, |task| task.update_checkpoint(checkpoint, by)).await
    }

    pub async fn heartbeat(&self, id: Uuid, by: &str) -> Result<BackgroundTask> {
        self.mutate(id, |task| task.update_heartbeat(by)).await
    }

    pub async fn set_backup_reference(&self, id: Uuid, reference: &str, by: &str) -> Result<BackgroundTask> {
        self.mutate(id, |task| task.set_backup_reference(reference, by)).await
    }

    pub async fn set_notes(&self, id: Uuid, notes: &str, by: &str) -> Result<BackgroundTask> {
        self.mutate(id, |task| task.set_notes(notes, by)).await
    }

    pub async fn mark_succeeded(
        &self,
        id: Uuid,
        summary_json: Option<String>,
        by: &str,
    ) -> Result<BackgroundTask> {
        self.mutate(id, |task| task.mark_succeeded(summary_json, by)).await
    }

    pub async fn mark_failed(&self, id: Uuid, reason: &str, by: &str) -> Result<BackgroundTask> {
        self.mutate(id, |task| task.mark_failed(reason, by)).await
    }

    pub async fn cancel(&self, id: Uuid, by: &str) -> Result<BackgroundTask> {
        self.mutate(id, |task| task.cancel(by)).await
    }

    async fn mutate<F>(&self, id: Uuid, apply: F) -> Result<BackgroundTask>
    where
        F: FnOnce(&mut BackgroundTask) -> Result<()>,
    {
        let mut task = self.get(id).await?;
        apply(&mut task)?;
        self.tasks.update(task.clone()).await?;
        Ok(task)
    }
}
