// ============================================================================
// Command application service
// ============================================================================
//
// The only writer of PartitionCommand. Each operation validates against the
// table's configuration, produces the DDL script, and persists a command in
// PendingApproval; approval enqueues the command id for the worker. Switch
// requests additionally run the readiness inspection and are refused outright
// while it reports blocking issues.
// ============================================================================

use log::info;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditResult, PartitionAuditLog};
use crate::command::payload::CommandPayload;
use crate::command::queue::CommandQueue;
use crate::command::{CommandType, PartitionCommand};
use crate::config::{PartitionConfiguration, PartitionStorageSettings};
use crate::core::{PartitionBoundary, PartitionError, PartitionValue, Result};
use crate::inspect::{SwitchContext, SwitchInspector};
use crate::repository::{AuditRepository, CommandRepository, ConfigurationRepository, TableMetadataReader};
use crate::script::ScriptGenerator;

/// Resolution of the merge-approval open question: merges follow the normal
/// approval path unless this shortcut is switched on deliberately.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandPolicy {
    pub auto_approve_merge: bool,
}

pub struct SplitRequest {
    pub data_source_id: Uuid,
    pub schema: String,
    pub table: String,
    pub boundary_value: PartitionValue,
    pub filegroup: Option<String>,
    pub backup_confirmed: bool,
    pub requested_by: String,
}

pub struct MergeRequest {
    pub data_source_id: Uuid,
    pub schema: String,
    pub table: String,
    pub boundary_key: String,
    pub requested_by: String,
}

pub struct SwitchRequest {
    pub data_source_id: Uuid,
    pub schema: String,
    pub table: String,
    pub context: SwitchContext,
    pub requested_by: String,
}

/// What the operator reviews before approving: validated script plus notes.
#[derive(Debug, Clone, Serialize)]
pub struct CommandPreview {
    pub command_type: CommandType,
    pub script: String,
    pub script_hash: Uuid,
    pub risk_notes: Vec<String>,
    pub payload_json: String,
}

pub struct CommandService {
    configs: Arc<dyn ConfigurationRepository>,
    commands: Arc<dyn CommandRepository>,
    audit: Arc<dyn AuditRepository>,
    generator: Arc<dyn ScriptGenerator>,
    metadata: Arc<dyn TableMetadataReader>,
    inspector: SwitchInspector,
    queue: CommandQueue,
    policy: CommandPolicy,
}

impl CommandService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        configs: Arc<dyn ConfigurationRepository>,
        commands: Arc<dyn CommandRepository>,
        audit: Arc<dyn AuditRepository>,
        generator: Arc<dyn ScriptGenerator>,
        metadata: Arc<dyn TableMetadataReader>,
        queue: CommandQueue,
        policy: CommandPolicy,
    ) -> Self {
        Self {
            configs,
            commands,
            audit,
            generator,
            inspector: SwitchInspector::new(metadata.clone()),
            metadata,
            queue,
            policy,
        }
    }

    // ------------------------------------------------------------------
    // Split
    // ------------------------------------------------------------------

    pub async fn preview_split(&self, request: &SplitRequest) -> Result<CommandPreview> {
        let config = self.load_config(request.data_source_id, &request.schema, &request.table).await?;
        let (boundary, filegroup) = self.validate_split(&config, request)?;
        let script = self.generator.split_script(&config, &boundary, &filegroup).await?;
        let payload = CommandPayload::split(
            boundary.value(),
            request.filegroup.clone(),
            request.backup_confirmed,
        );
        Ok(CommandPreview {
            command_type: CommandType::Split,
            script: script.text,
            script_hash: script.hash,
            risk_notes: self.split_risk_notes(&config, &filegroup),
            payload_json: payload.to_json()?,
        })
    }

    /// Validates, generates the script, and persists a PendingApproval
    /// command. Nothing is written when validation fails.
    pub async fn execute_split(&self, request: SplitRequest) -> Result<Uuid> {
        // Checked before anything else so a refused request leaves no trace.
        if !request.backup_confirmed {
            return Err(PartitionError::Validation(
                "执行拆分前需要确认已有备份或快照。".into(),
            ));
        }
        let preview = self.preview_split(&request).await?;
        self.persist_command(
            &request.data_source_id,
            &request.schema,
            &request.table,
            &request.requested_by,
            preview,
        )
        .await
    }

    fn validate_split(
        &self,
        config: &PartitionConfiguration,
        request: &SplitRequest,
    ) -> Result<(PartitionBoundary, String)> {
        if !request.backup_confirmed {
            return Err(PartitionError::Validation(
                "执行拆分前需要确认已有备份或快照。".into(),
            ));
        }
        let boundary = PartitionBoundary::from_value(request.boundary_value.clone());

        // Dry-run against a copy; the real metadata only changes when the
        // worker has executed the DDL.
        let mut scratch = config.clone();
        scratch.try_add_boundary(boundary.clone())?;

        let filegroup = request
            .filegroup
            .clone()
            .unwrap_or_else(|| config.filegroup_strategy().primary_filegroup().to_string());
        Ok((boundary, filegroup))
    }

    fn split_risk_notes(&self, config: &PartitionConfiguration, filegroup: &str) -> Vec<String> {
        let mut notes = Vec::new();
        if let PartitionStorageSettings::DedicatedFilegroupSingleFile { .. } = config.storage_settings() {
            notes.push("new partition uses a dedicated filegroup; the data file must exist before execution".to_string());
        }
        if !config.filegroup_strategy().knows(filegroup) {
            notes.push(format!("filegroup {} is not yet registered on this configuration", filegroup));
        }
        self.append_safety_notes(config, &mut notes);
        notes
    }

    // ------------------------------------------------------------------
    // Merge
    // ------------------------------------------------------------------

    pub async fn preview_merge(&self, request: &MergeRequest) -> Result<CommandPreview> {
        let config = self.load_config(request.data_source_id, &request.schema, &request.table).await?;
        let boundary = self.validate_merge(&config, &request.boundary_key)?;
        let script = self.generator.merge_script(&config, &boundary).await?;

        let mut risk_notes = Vec::new();
        let rows = self
            .metadata
            .partition_row_count(
                request.data_source_id,
                config.schema(),
                config.table(),
                &request.boundary_key,
            )
            .await?;
        if rows > 0 {
            risk_notes.push(format!(
                "partition {} holds {} rows; merging moves them into the neighbouring partition",
                request.boundary_key, rows
            ));
        }
        self.append_safety_notes(&config, &mut risk_notes);

        let payload = CommandPayload::Merge {
            boundary_key: request.boundary_key.clone(),
        };
        Ok(CommandPreview {
            command_type: CommandType::Merge,
            script: script.text,
            script_hash: script.hash,
            risk_notes,
            payload_json: payload.to_json()?,
        })
    }

    pub async fn execute_merge(&self, request: MergeRequest) -> Result<Uuid> {
        let preview = self.preview_merge(&request).await?;
        let command_id = self
            .persist_command(
                &request.data_source_id,
                &request.schema,
                &request.table,
                &request.requested_by,
                preview,
            )
            .await?;

        if self.policy.auto_approve_merge {
            self.approve(command_id, &request.requested_by).await?;
        }
        Ok(command_id)
    }

    fn validate_merge(
        &self,
        config: &PartitionConfiguration,
        boundary_key: &str,
    ) -> Result<PartitionBoundary> {
        if !config.has_boundary(boundary_key) {
            return Err(PartitionError::Validation("未找到指定的分区边界。".into()));
        }
        // Dry-run the removal so last-boundary protection applies here too.
        let mut scratch = config.clone();
        let removed = scratch.try_remove_boundary(boundary_key)?;
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Switch
    // ------------------------------------------------------------------

    pub async fn preview_switch(&self, request: &SwitchRequest) -> Result<CommandPreview> {
        let config = self.load_config(request.data_source_id, &request.schema, &request.table).await?;
        self.validate_switch_context(&request.context)?;
        let script = self.generator.switch_script(&config, &request.context).await?;
        let payload = CommandPayload::Switch {
            source_boundary_key: request.context.source_boundary_key.clone(),
            target_schema: request.context.target_schema.clone(),
            target_table: request.context.target_table.clone(),
            target_database: request.context.target_database.clone(),
            create_staging_table: request.context.create_staging_table,
        };
        Ok(CommandPreview {
            command_type: CommandType::Switch,
            script: script.text,
            script_hash: script.hash,
            risk_notes: Vec::new(),
            payload_json: payload.to_json()?,
        })
    }

    /// Runs the readiness inspection first; any blocking issue refuses the
    /// request before a command exists.
    pub async fn execute_switch(&self, request: SwitchRequest) -> Result<Uuid> {
        let config = self.load_config(request.data_source_id, &request.schema, &request.table).await?;
        self.validate_switch_context(&request.context)?;

        let inspection = self
            .inspector
            .inspect(request.data_source_id, &config, &request.context)
            .await?;
        if !inspection.can_switch {
            return Err(PartitionError::SwitchBlocked(inspection.blocking_summary()));
        }

        let mut preview = self.preview_switch(&request).await?;
        for warning in &inspection.warnings {
            preview.risk_notes.push(warning.message.clone());
        }

        let command_id = self
            .persist_command(
                &request.data_source_id,
                &request.schema,
                &request.table,
                &request.requested_by,
                preview,
            )
            .await?;

        // Keep the inspection alongside the command for the reviewer.
        if let Some(mut command) = self.commands.find_by_id(command_id).await? {
            command.set_preview_json(serde_json::to_string(&inspection)?);
            self.commands.update(command).await?;
        }
        Ok(command_id)
    }

    fn validate_switch_context(&self, context: &SwitchContext) -> Result<()> {
        if context.target_schema.trim().is_empty() || context.target_table.trim().is_empty() {
            return Err(PartitionError::Validation(
                "switch target schema and table are required".into(),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Approval
    // ------------------------------------------------------------------

    /// Flips the command to Approved and enqueues exactly one id. The command
    /// stays Approved until the worker picks the id up and records Queued.
    pub async fn approve(&self, command_id: Uuid, approver: &str) -> Result<()> {
        let mut command = self.load_command(command_id).await?;
        command.approve(approver)?;
        self.commands.update(command.clone()).await?;
        self.queue.enqueue(command_id);
        info!("command {} approved by {} and enqueued", command_id, approver);

        self.audit
            .append(PartitionAuditLog::new(
                approver,
                "ApproveCommand",
                "PartitionCommand",
                command_id.to_string(),
                format!("approved {} command on {}.{}", command.command_type(), command.schema(), command.table()),
                AuditResult::Success,
            ))
            .await
    }

    /// Terminal refusal; requires a non-empty reason.
    pub async fn reject(&self, command_id: Uuid, approver: &str, reason: &str) -> Result<()> {
        let mut command = self.load_command(command_id).await?;
        command.reject(approver, reason)?;
        self.commands.update(command.clone()).await?;

        self.audit
            .append(PartitionAuditLog::new(
                approver,
                "RejectCommand",
                "PartitionCommand",
                command_id.to_string(),
                format!("rejected: {}", reason),
                AuditResult::Success,
            ))
            .await
    }

    pub async fn get(&self, command_id: Uuid) -> Result<PartitionCommand> {
        self.load_command(command_id).await
    }

    pub async fn list_pending(&self) -> Result<Vec<PartitionCommand>> {
        self.commands.list_pending_approval().await
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn persist_command(
        &self,
        data_source_id: &Uuid,
        schema: &str,
        table: &str,
        requested_by: &str,
        preview: CommandPreview,
    ) -> Result<Uuid> {
        let mut command = PartitionCommand::new(
            *data_source_id,
            schema,
            table,
            preview.command_type,
            preview.script,
            preview.script_hash,
            preview.payload_json,
            requested_by,
        );
        for note in preview.risk_notes {
            command.add_risk_note(note);
        }
        let id = command.id();
        self.commands.insert(command).await?;
        info!("persisted {} command {} for {}.{}", preview.command_type, id, schema, table);
        Ok(id)
    }

    fn append_safety_notes(&self, config: &PartitionConfiguration, notes: &mut Vec<String>) {
        if let Some(rule) = config.safety_rule() {
            if let Some(hint) = &rule.execution_window_hint {
                notes.push(format!("preferred execution window: {}", hint));
            }
            notes.extend(rule.additional_warnings.iter().cloned());
        }
    }

    async fn load_config(
        &self,
        data_source_id: Uuid,
        schema: &str,
        table: &str,
    ) -> Result<PartitionConfiguration> {
        self.configs
            .find_by_table(data_source_id, schema, table)
            .await?
            .ok_or_else(|| PartitionError::ConfigurationNotFound(format!("{}.{}", schema, table)))
    }

    async fn load_command(&self, command_id: Uuid) -> Result<PartitionCommand> {
        self.commands
            .find_by_id(command_id)
            .await?
            .ok_or_else(|| PartitionError::CommandNotFound(command_id.to_string()))
    }
}
