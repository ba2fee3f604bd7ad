// ============================================================================
// In-memory repository implementations
// ============================================================================
//
// Default wiring for tests and embedded use; production deployments replace
// these with relational adapters implementing the same traits.
// ============================================================================

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::PartitionAuditLog;
use crate::command::PartitionCommand;
use crate::config::PartitionConfiguration;
use crate::core::{PartitionError, Result};
use crate::permission::RequiredGrant;
use crate::repository::{
    AuditRepository, CommandRepository, ConfigurationRepository, DdlExecutor, PermissionReader,
    TableFacts, TableMetadataReader, TaskRepository,
};
use crate::task::BackgroundTask;

#[derive(Default)]
pub struct InMemoryConfigurationRepository {
    rows: Arc<RwLock<HashMap<Uuid, PartitionConfiguration>>>,
}

impl InMemoryConfigurationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigurationRepository for InMemoryConfigurationRepository {
    async fn insert(&self, config: PartitionConfiguration) -> Result<()> {
        let mut rows = self.rows.write().await;
        // Key business identity is unique while not soft-deleted.
        let duplicate = rows.values().any(|existing| {
            !existing.is_deleted()
                && existing.data_source_id() == config.data_source_id()
                && existing.schema() == config.schema()
                && existing.table() == config.table()
        });
        if duplicate {
            return Err(PartitionError::Invariant(format!(
                "a configuration for {} already exists on this data source",
                config.qualified_table()
            )));
        }
        rows.insert(config.id(), config);
        Ok(())
    }

    async fn update(&self, config: PartitionConfiguration) -> Result<()> {
        let mut rows = self.rows.write().await;
        if !rows.contains_key(&config.id()) {
            return Err(PartitionError::ConfigurationNotFound(config.id().to_string()));
        }
        rows.insert(config.id(), config);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PartitionConfiguration>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_by_table(
        &self,
        data_source_id: Uuid,
        schema: &str,
        table: &str,
    ) -> Result<Option<PartitionConfiguration>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|c| {
                !c.is_deleted()
                    && c.data_source_id() == data_source_id
                    && c.schema() == schema
                    && c.table() == table
            })
            .cloned())
    }

    async fn exists_for_table(
        &self,
        data_source_id: Uuid,
        schema: &str,
        table: &str,
    ) -> Result<bool> {
        Ok(self
            .find_by_table(data_source_id, schema, table)
            .await?
            .is_some())
    }

    async fn list(&self) -> Result<Vec<PartitionConfiguration>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|c| !c.is_deleted())
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryCommandRepository {
    rows: Arc<RwLock<HashMap<Uuid, PartitionCommand>>>,
}

impl InMemoryCommandRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommandRepository for InMemoryCommandRepository {
    async fn insert(&self, command: PartitionCommand) -> Result<()> {
        self.rows.write().await.insert(command.id(), command);
        Ok(())
    }

    async fn update(&self, command: PartitionCommand) -> Result<()> {
        let mut rows = self.rows.write().await;
        if !rows.contains_key(&command.id()) {
            return Err(PartitionError::CommandNotFound(command.id().to_string()));
        }
        rows.insert(command.id(), command);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PartitionCommand>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn list_pending_approval(&self) -> Result<Vec<PartitionCommand>> {
        let mut pending: Vec<PartitionCommand> = self
            .rows
            .read()
            .await
            .values()
            .filter(|c| c.status() == crate::command::CommandStatus::PendingApproval)
            .cloned()
            .collect();
        pending.sort_by_key(|c| c.requested_at_utc());
        Ok(pending)
    }

    async fn list_for_table(
        &self,
        data_source_id: Uuid,
        schema: &str,
        table: &str,
    ) -> Result<Vec<PartitionCommand>> {
        let mut rows: Vec<PartitionCommand> = self
            .rows
            .read()
            .await
            .values()
            .filter(|c| {
                c.data_source_id() == data_source_id && c.schema() == schema && c.table() == table
            })
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.requested_at_utc());
        Ok(rows)
    }
}

#[derive(Default)]
pub struct InMemoryTaskRepository {
    rows: Arc<RwLock<HashMap<Uuid, BackgroundTask>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn insert(&self, task: BackgroundTask) -> Result<()> {
        self.rows.write().await.insert(task.id(), task);
        Ok(())
    }

    async fn update(&self, task: BackgroundTask) -> Result<()> {
        let mut rows = self.rows.write().await;
        if !rows.contains_key(&task.id()) {
            return Err(PartitionError::TaskNotFound(task.id().to_string()));
        }
        rows.insert(task.id(), task);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<BackgroundTask>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<BackgroundTask>> {
        let mut rows: Vec<BackgroundTask> = self
            .rows
            .read()
            .await
            .values()
            .filter(|t| !t.is_deleted())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at_utc().cmp(&a.created_at_utc()));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn list_stale(&self, threshold: Duration) -> Result<Vec<BackgroundTask>> {
        let cutoff = Utc::now() - threshold;
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|t| !t.is_deleted() && !t.is_completed() && t.last_heartbeat_utc() < cutoff)
            .cloned()
            .collect())
    }

    async fn find_active_for_data_source(
        &self,
        data_source_id: Uuid,
    ) -> Result<Option<BackgroundTask>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|t| {
                !t.is_deleted() && !t.is_completed() && t.data_source_id() == data_source_id
            })
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryAuditRepository {
    rows: Arc<RwLock<Vec<PartitionAuditLog>>>,
}

impl InMemoryAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn append(&self, entry: PartitionAuditLog) -> Result<()> {
        self.rows.write().await.push(entry);
        Ok(())
    }

    async fn list_for_resource(&self, resource_id: &str) -> Result<Vec<PartitionAuditLog>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|e| e.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<PartitionAuditLog>> {
        let rows = self.rows.read().await;
        Ok(rows.iter().rev().take(limit).cloned().collect())
    }
}

/// Permission reader returning a fixed grant set.
pub struct StaticPermissionReader {
    grants: Vec<RequiredGrant>,
}

impl StaticPermissionReader {
    pub fn with_all_grants() -> Self {
        Self {
            grants: RequiredGrant::ALL.to_vec(),
        }
    }

    pub fn with_grants(grants: Vec<RequiredGrant>) -> Self {
        Self { grants }
    }
}

#[async_trait]
impl PermissionReader for StaticPermissionReader {
    async fn granted_permissions(
        &self,
        _data_source_id: Uuid,
        _schema: &str,
        _table: &str,
    ) -> Result<Vec<RequiredGrant>> {
        Ok(self.grants.clone())
    }
}

/// Metadata reader answering from a pre-seeded fact table.
#[derive(Default)]
pub struct StaticMetadataReader {
    tables: RwLock<HashMap<String, TableFacts>>,
    partition_rows: RwLock<HashMap<String, u64>>,
}

impl StaticMetadataReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn table_key(schema: &str, table: &str) -> String {
        format!("{}.{}", schema, table)
    }

    pub async fn seed_table(&self, schema: &str, table: &str, facts: TableFacts) {
        self.tables
            .write()
            .await
            .insert(Self::table_key(schema, table), facts);
    }

    pub async fn seed_partition_rows(&self, schema: &str, table: &str, boundary_key: &str, rows: u64) {
        let key = format!("{}.{}#{}", schema, table, boundary_key);
        self.partition_rows.write().await.insert(key, rows);
    }
}

#[async_trait]
impl TableMetadataReader for StaticMetadataReader {
    async fn table_facts(
        &self,
        _data_source_id: Uuid,
        _database: Option<&str>,
        schema: &str,
        table: &str,
    ) -> Result<TableFacts> {
        Ok(self
            .tables
            .read()
            .await
            .get(&Self::table_key(schema, table))
            .cloned()
            .unwrap_or_default())
    }

    async fn partition_row_count(
        &self,
        _data_source_id: Uuid,
        schema: &str,
        table: &str,
        boundary_key: &str,
    ) -> Result<u64> {
        let key = format!("{}.{}#{}", schema, table, boundary_key);
        Ok(self
            .partition_rows
            .read()
            .await
            .get(&key)
            .copied()
            .unwrap_or(0))
    }
}

/// DDL executor that records scripts instead of touching a database; can be
/// told to fail to exercise error paths.
#[derive(Default)]
pub struct RecordingDdlExecutor {
    executed: Arc<RwLock<Vec<String>>>,
    fail_with: Arc<RwLock<Option<String>>>,
}

impl RecordingDdlExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn executed_scripts(&self) -> Vec<String> {
        self.executed.read().await.clone()
    }

    pub async fn fail_next_with(&self, reason: impl Into<String>) {
        *self.fail_with.write().await = Some(reason.into());
    }
}

#[async_trait]
impl DdlExecutor for RecordingDdlExecutor {
    async fn execute_script(
        &self,
        _data_source_id: Uuid,
        _database: Option<&str>,
        script: &str,
    ) -> Result<String> {
        if let Some(reason) = self.fail_with.write().await.take() {
            return Err(PartitionError::ExecutionError(reason));
        }
        self.executed.write().await.push(script.to_string());
        Ok(format!("executed {} statement(s)", script.matches(';').count().max(1)))
    }
}
