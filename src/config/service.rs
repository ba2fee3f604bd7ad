// ============================================================================
// Configuration application service
// ============================================================================
//
// The only writer of PartitionConfiguration. Direct boundary/filegroup/safety
// operations mutate the metadata immediately (no DDL involved) and leave one
// audit entry each; split/merge/switch against the live table go through the
// command service instead.
// ============================================================================

use log::info;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditResult, PartitionAuditLog};
use crate::config::{
    PartitionConfiguration, PartitionFilegroupStrategy, PartitionRetentionPolicy,
    PartitionSafetyRule, PartitionStorageSettings, TargetTableDescriptor,
};
use crate::core::{PartitionBoundary, PartitionColumn, PartitionError, PartitionValue, Result};
use crate::repository::{AuditRepository, ConfigurationRepository};

const RESOURCE_TYPE: &str = "PartitionConfiguration";

pub struct CreateConfigurationRequest {
    pub data_source_id: Uuid,
    pub schema: String,
    pub table: String,
    pub function_name: String,
    pub scheme_name: String,
    pub column: PartitionColumn,
    pub filegroup_strategy: PartitionFilegroupStrategy,
    pub storage_settings: PartitionStorageSettings,
    pub is_range_right: bool,
    pub initial_boundaries: Vec<PartitionValue>,
    pub requested_by: String,
}

pub struct ConfigurationService {
    configs: Arc<dyn ConfigurationRepository>,
    audit: Arc<dyn AuditRepository>,
}

impl ConfigurationService {
    pub fn new(configs: Arc<dyn ConfigurationRepository>, audit: Arc<dyn AuditRepository>) -> Self {
        Self { configs, audit }
    }

    /// # Errors
    /// Fails when a live configuration already covers the table, or on any
    /// aggregate-level validation error.
    pub async fn create(&self, request: CreateConfigurationRequest) -> Result<PartitionConfiguration> {
        if self
            .configs
            .exists_for_table(request.data_source_id, &request.schema, &request.table)
            .await?
        {
            return Err(PartitionError::Invariant(format!(
                "a partition configuration for {}.{} already exists on this data source",
                request.schema, request.table
            )));
        }

        let config = PartitionConfiguration::new(
            request.data_source_id,
            request.schema,
            request.table,
            request.function_name,
            request.scheme_name,
            request.column,
            request.filegroup_strategy,
            request.storage_settings,
            request.is_range_right,
            request.initial_boundaries,
            request.requested_by.clone(),
        )?;

        self.configs.insert(config.clone()).await?;
        self.record(
            &request.requested_by,
            "CreateConfiguration",
            &config,
            format!("created partition configuration for {}", config.qualified_table()),
            None,
        )
        .await?;
        info!("created configuration {} for {}", config.id(), config.qualified_table());
        Ok(config)
    }

    pub async fn get(&self, id: Uuid) -> Result<PartitionConfiguration> {
        self.configs
            .find_by_id(id)
            .await?
            .ok_or_else(|| PartitionError::ConfigurationNotFound(id.to_string()))
    }

    pub async fn get_by_table(
        &self,
        data_source_id: Uuid,
        schema: &str,
        table: &str,
    ) -> Result<PartitionConfiguration> {
        self.configs
            .find_by_table(data_source_id, schema, table)
            .await?
            .ok_or_else(|| {
                PartitionError::ConfigurationNotFound(format!("{}.{}", schema, table))
            })
    }

    pub async fn list(&self) -> Result<Vec<PartitionConfiguration>> {
        self.configs.list().await
    }

    /// Adds a boundary to the metadata, optionally mapping it to a filegroup.
    pub async fn add_boundary(
        &self,
        id: Uuid,
        value: PartitionValue,
        filegroup: Option<String>,
        by: &str,
    ) -> Result<PartitionConfiguration> {
        let mut config = self.get(id).await?;
        let boundary = PartitionBoundary::from_value(value);
        let boundary_key = boundary.sort_key().to_string();

        config.try_add_boundary(boundary)?;
        if let Some(fg) = &filegroup {
            config.try_assign_filegroup(&boundary_key, fg.clone())?;
        }
        config.set_updated_by(by);
        self.configs.update(config.clone()).await?;

        let payload = json!({
            "boundary_key": boundary_key,
            "filegroup": filegroup,
        });
        self.record(
            by,
            "AddBoundary",
            &config,
            format!("added boundary {} to {}", boundary_key, config.qualified_table()),
            Some(payload.to_string()),
        )
        .await?;
        Ok(config)
    }

    pub async fn remove_boundary(
        &self,
        id: Uuid,
        boundary_key: &str,
        by: &str,
    ) -> Result<PartitionConfiguration> {
        let mut config = self.get(id).await?;
        config.try_remove_boundary(boundary_key)?;
        config.set_updated_by(by);
        self.configs.update(config.clone()).await?;

        self.record(
            by,
            "RemoveBoundary",
            &config,
            format!("removed boundary {} from {}", boundary_key, config.qualified_table()),
            Some(json!({ "boundary_key": boundary_key }).to_string()),
        )
        .await?;
        Ok(config)
    }

    /// Bulk overwrite of the boundary set; re-validates the whole sequence.
    pub async fn replace_boundaries(
        &self,
        id: Uuid,
        values: Vec<PartitionValue>,
        by: &str,
    ) -> Result<PartitionConfiguration> {
        let mut config = self.get(id).await?;
        config.replace_boundaries(values)?;
        config.set_updated_by(by);
        self.configs.update(config.clone()).await?;

        let keys: Vec<&str> = config.boundaries().iter().map(|b| b.sort_key()).collect();
        self.record(
            by,
            "ReplaceBoundaries",
            &config,
            format!("replaced boundary set of {} ({} boundaries)", config.qualified_table(), keys.len()),
            Some(json!({ "boundary_keys": keys }).to_string()),
        )
        .await?;
        Ok(config)
    }

    pub async fn assign_filegroup(
        &self,
        id: Uuid,
        boundary_key: &str,
        filegroup: &str,
        by: &str,
    ) -> Result<PartitionConfiguration> {
        let mut config = self.get(id).await?;
        config.try_assign_filegroup(boundary_key, filegroup)?;
        config.set_updated_by(by);
        self.configs.update(config.clone()).await?;

        self.record(
            by,
            "AssignFilegroup",
            &config,
            format!("mapped boundary {} to filegroup {}", boundary_key, filegroup),
            Some(json!({ "boundary_key": boundary_key, "filegroup": filegroup }).to_string()),
        )
        .await?;
        Ok(config)
    }

    pub async fn update_safety_rule(
        &self,
        id: Uuid,
        rule: Option<PartitionSafetyRule>,
        by: &str,
    ) -> Result<PartitionConfiguration> {
        let mut config = self.get(id).await?;
        let action = match rule {
            Some(rule) => {
                config.update_safety_rule(rule);
                "UpdateSafetyRule"
            }
            None => {
                config.clear_safety_rule();
                "ClearSafetyRule"
            }
        };
        config.set_updated_by(by);
        self.configs.update(config.clone()).await?;

        self.record(
            by,
            action,
            &config,
            format!("{} on {}", action, config.qualified_table()),
            None,
        )
        .await?;
        Ok(config)
    }

    /// Changes the storage settings. The aggregate refuses this once the
    /// scheme is committed.
    pub async fn update_storage_settings(
        &self,
        id: Uuid,
        settings: PartitionStorageSettings,
        by: &str,
    ) -> Result<PartitionConfiguration> {
        let mut config = self.get(id).await?;
        config.update_storage_settings(settings)?;
        config.set_updated_by(by);
        self.configs.update(config.clone()).await?;

        self.record(
            by,
            "UpdateStorageSettings",
            &config,
            format!("updated storage settings of {}", config.qualified_table()),
            Some(serde_json::to_string(config.storage_settings())?),
        )
        .await?;
        Ok(config)
    }

    /// Changes (or clears) the switch / backup target table.
    pub async fn update_target_table(
        &self,
        id: Uuid,
        target: Option<TargetTableDescriptor>,
        by: &str,
    ) -> Result<PartitionConfiguration> {
        let mut config = self.get(id).await?;
        config.update_target_table(target)?;
        config.set_updated_by(by);
        self.configs.update(config.clone()).await?;

        self.record(
            by,
            "UpdateTargetTable",
            &config,
            format!("updated switch target of {}", config.qualified_table()),
            Some(serde_json::to_string(&config.target_table())?),
        )
        .await?;
        Ok(config)
    }

    /// Changes the partition column. The aggregate refuses a kind change
    /// while boundaries exist, and any change once committed.
    pub async fn update_column(
        &self,
        id: Uuid,
        column: PartitionColumn,
        by: &str,
    ) -> Result<PartitionConfiguration> {
        let mut config = self.get(id).await?;
        let payload = serde_json::to_string(&column)?;
        config.update_column(column)?;
        config.set_updated_by(by);
        self.configs.update(config.clone()).await?;

        self.record(
            by,
            "UpdateColumn",
            &config,
            format!("updated partition column of {}", config.qualified_table()),
            Some(payload),
        )
        .await?;
        Ok(config)
    }

    pub async fn set_retention_policy(
        &self,
        id: Uuid,
        policy: Option<PartitionRetentionPolicy>,
        by: &str,
    ) -> Result<PartitionConfiguration> {
        let mut config = self.get(id).await?;
        config.set_retention_policy(policy);
        config.set_updated_by(by);
        self.configs.update(config.clone()).await?;

        self.record(
            by,
            "SetRetentionPolicy",
            &config,
            format!("set retention policy of {}", config.qualified_table()),
            Some(json!({ "keep_partitions": policy.map(|p| p.keep_partitions) }).to_string()),
        )
        .await?;
        Ok(config)
    }

    pub async fn soft_delete(&self, id: Uuid, by: &str) -> Result<()> {
        let mut config = self.get(id).await?;
        config.soft_delete(by);
        self.configs.update(config.clone()).await?;
        self.record(
            by,
            "DeleteConfiguration",
            &config,
            format!("soft-deleted configuration for {}", config.qualified_table()),
            None,
        )
        .await?;
        Ok(())
    }

    async fn record(
        &self,
        user: &str,
        action: &str,
        config: &PartitionConfiguration,
        summary: String,
        payload_json: Option<String>,
    ) -> Result<()> {
        let mut entry = PartitionAuditLog::new(
            user,
            action,
            RESOURCE_TYPE,
            config.id().to_string(),
            summary,
            AuditResult::Success,
        );
        if let Some(payload) = payload_json {
            entry = entry.with_payload(payload);
        }
        self.audit.append(entry).await
    }
}
