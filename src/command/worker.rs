// ============================================================================
// Command queue worker
// ============================================================================
//
// Drains the id queue: reloads each command, gates on permissions, runs the
// DDL, applies the resulting metadata change to the configuration, and records
// the outcome plus one audit entry. Failures mark the command Failed with a
// reason; there is no automatic retry.
// ============================================================================

use log::{error, info, warn};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditResult, PartitionAuditLog};
use crate::command::payload::CommandPayload;
use crate::command::queue::CommandQueueReceiver;
use crate::command::{CommandStatus, CommandType, PartitionCommand};
use crate::core::{PartitionBoundary, PartitionError, Result};
use crate::permission::PermissionGate;
use crate::repository::{AuditRepository, CommandRepository, ConfigurationRepository, DdlExecutor};

pub struct CommandWorker {
    receiver: CommandQueueReceiver,
    commands: Arc<dyn CommandRepository>,
    configs: Arc<dyn ConfigurationRepository>,
    audit: Arc<dyn AuditRepository>,
    executor: Arc<dyn DdlExecutor>,
    permission_gate: PermissionGate,
    worker_name: String,
}

impl CommandWorker {
    pub fn new(
        receiver: CommandQueueReceiver,
        commands: Arc<dyn CommandRepository>,
        configs: Arc<dyn ConfigurationRepository>,
        audit: Arc<dyn AuditRepository>,
        executor: Arc<dyn DdlExecutor>,
        permission_gate: PermissionGate,
        worker_name: impl Into<String>,
    ) -> Self {
        Self {
            receiver,
            commands,
            configs,
            audit,
            executor,
            permission_gate,
            worker_name: worker_name.into(),
        }
    }

    /// Runs until the queue is closed. Per-command failures are recorded on
    /// the command itself; only infrastructure errors are logged here.
    pub async fn run(mut self) {
        info!("command worker {} started", self.worker_name);
        while let Some(command_id) = self.receiver.recv().await {
            if let Err(err) = self.process(command_id).await {
                if err.is_expected() {
                    warn!("worker {}: command {} refused: {}", self.worker_name, command_id, err);
                } else {
                    error!("worker {}: command {} processing error: {}", self.worker_name, command_id, err);
                }
            }
        }
        info!("command worker {} stopped", self.worker_name);
    }

    /// Executes one queued command end to end.
    pub async fn process(&self, command_id: Uuid) -> Result<()> {
        let mut command = match self.commands.find_by_id(command_id).await? {
            Some(command) => command,
            None => {
                warn!("queued command {} no longer exists", command_id);
                return Ok(());
            }
        };

        // Approval leaves the command Approved; pickup is where Queued is
        // recorded.
        if command.status() == CommandStatus::Approved {
            command.mark_queued(&self.worker_name)?;
        }
        if let Err(err) = command.mark_executing(&self.worker_name) {
            // Rejected-after-enqueue or double delivery; not an error.
            warn!("skipping command {}: {}", command_id, err);
            return Ok(());
        }
        self.commands.update(command.clone()).await?;

        if let Err(err) = self
            .permission_gate
            .ensure_can_execute(command.data_source_id(), command.schema(), command.table())
            .await
        {
            return self.finish_failed(command, err.display_message(), None).await;
        }

        match self
            .executor
            .execute_script(command.data_source_id(), None, command.script())
            .await
        {
            Ok(execution_log) => {
                if let Err(err) = self.apply_metadata_change(&command).await {
                    // DDL ran but our metadata did not follow; surface loudly.
                    return self
                        .finish_failed(
                            command,
                            format!("DDL executed but metadata update failed: {}", err),
                            Some(execution_log),
                        )
                        .await;
                }
                command.mark_succeeded(Some(execution_log))?;
                self.commands.update(command.clone()).await?;
                self.record_outcome(&command, AuditResult::Success).await?;
                info!("command {} succeeded", command_id);
                Ok(())
            }
            Err(err) => {
                self.finish_failed(command, err.display_message(), None).await
            }
        }
    }

    async fn finish_failed(
        &self,
        mut command: PartitionCommand,
        reason: String,
        execution_log: Option<String>,
    ) -> Result<()> {
        warn!("command {} failed: {}", command.id(), reason);
        command.mark_failed(reason, execution_log)?;
        self.commands.update(command.clone()).await?;
        self.record_outcome(&command, AuditResult::Failure).await
    }

    /// Mirrors the executed DDL into the stored configuration so metadata and
    /// the live table stay in step.
    async fn apply_metadata_change(&self, command: &PartitionCommand) -> Result<()> {
        let mut config = self
            .configs
            .find_by_table(command.data_source_id(), command.schema(), command.table())
            .await?
            .ok_or_else(|| {
                PartitionError::ConfigurationNotFound(format!(
                    "{}.{}",
                    command.schema(),
                    command.table()
                ))
            })?;

        match CommandPayload::from_json(command.payload())? {
            CommandPayload::Split {
                boundary_value,
                value_kind,
                filegroup,
                ..
            } => {
                let value = value_kind.parse_value(&boundary_value)?;
                let boundary = PartitionBoundary::from_value(value);
                let key = boundary.sort_key().to_string();
                config.try_add_boundary(boundary)?;
                if let Some(fg) = filegroup {
                    config.try_assign_filegroup(&key, fg)?;
                }
            }
            CommandPayload::Merge { boundary_key } => {
                config.try_remove_boundary(&boundary_key)?;
            }
            CommandPayload::Switch { .. } => {
                // A switch moves data, not boundaries.
            }
        }
        config.mark_committed(&self.worker_name);
        self.configs.update(config).await
    }

    async fn record_outcome(&self, command: &PartitionCommand, result: AuditResult) -> Result<()> {
        let action = match command.command_type() {
            CommandType::Split => "ExecuteSplit",
            CommandType::Merge => "ExecuteMerge",
            CommandType::Switch => "ExecuteSwitch",
        };
        let payload = json!({
            "command_payload": command.payload(),
            "failure_reason": command.failure_reason(),
        });
        let entry = PartitionAuditLog::new(
            &self.worker_name,
            action,
            "PartitionCommand",
            command.id().to_string(),
            format!(
                "{} on {}.{} -> {}",
                command.command_type(),
                command.schema(),
                command.table(),
                command.status()
            ),
            result,
        )
        .with_payload(payload.to_string())
        .with_script(command.script());
        self.audit.append(entry).await
    }
}
