// ============================================================================
// Collaborator interfaces
// ============================================================================
//
// The engine talks to persistence and to the target database only through
// these traits. Relational adapters implement them in production; the
// in-memory implementations in `repository::memory` back the default wiring
// and the tests.
// ============================================================================

mod memory;

pub use memory::{
    InMemoryAuditRepository, InMemoryCommandRepository, InMemoryConfigurationRepository,
    InMemoryTaskRepository, RecordingDdlExecutor, StaticMetadataReader, StaticPermissionReader,
};

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use crate::audit::PartitionAuditLog;
use crate::command::PartitionCommand;
use crate::config::PartitionConfiguration;
use crate::core::Result;
use crate::permission::RequiredGrant;
use crate::task::BackgroundTask;

#[async_trait]
pub trait ConfigurationRepository: Send + Sync {
    async fn insert(&self, config: PartitionConfiguration) -> Result<()>;
    async fn update(&self, config: PartitionConfiguration) -> Result<()>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PartitionConfiguration>>;
    /// Key business identity lookup; ignores soft-deleted rows.
    async fn find_by_table(
        &self,
        data_source_id: Uuid,
        schema: &str,
        table: &str,
    ) -> Result<Option<PartitionConfiguration>>;
    async fn exists_for_table(
        &self,
        data_source_id: Uuid,
        schema: &str,
        table: &str,
    ) -> Result<bool>;
    async fn list(&self) -> Result<Vec<PartitionConfiguration>>;
}

#[async_trait]
pub trait CommandRepository: Send + Sync {
    async fn insert(&self, command: PartitionCommand) -> Result<()>;
    async fn update(&self, command: PartitionCommand) -> Result<()>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PartitionCommand>>;
    async fn list_pending_approval(&self) -> Result<Vec<PartitionCommand>>;
    async fn list_for_table(
        &self,
        data_source_id: Uuid,
        schema: &str,
        table: &str,
    ) -> Result<Vec<PartitionCommand>>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn insert(&self, task: BackgroundTask) -> Result<()>;
    async fn update(&self, task: BackgroundTask) -> Result<()>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<BackgroundTask>>;
    /// Newest first, soft-deleted rows excluded.
    async fn list_recent(&self, limit: usize) -> Result<Vec<BackgroundTask>>;
    /// Not-completed tasks whose heartbeat is older than `threshold`.
    async fn list_stale(&self, threshold: Duration) -> Result<Vec<BackgroundTask>>;
    /// Any non-terminal task on the data source, for the start policy.
    async fn find_active_for_data_source(
        &self,
        data_source_id: Uuid,
    ) -> Result<Option<BackgroundTask>>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, entry: PartitionAuditLog) -> Result<()>;
    async fn list_for_resource(&self, resource_id: &str) -> Result<Vec<PartitionAuditLog>>;
    async fn list_recent(&self, limit: usize) -> Result<Vec<PartitionAuditLog>>;
}

/// Reads effective grants from the target database catalog.
#[async_trait]
pub trait PermissionReader: Send + Sync {
    async fn granted_permissions(
        &self,
        data_source_id: Uuid,
        schema: &str,
        table: &str,
    ) -> Result<Vec<RequiredGrant>>;
}

/// Live structure of one table on the target database.
#[derive(Debug, Clone, Default)]
pub struct TableFacts {
    pub exists: bool,
    pub row_count: u64,
    pub columns: Vec<ColumnFacts>,
    pub has_clustered_index: bool,
    pub is_partitioned: bool,
    pub partition_scheme: Option<String>,
    /// Foreign keys crossing the switch boundary, by constraint name.
    pub foreign_keys: Vec<String>,
    pub nonclustered_indexes: Vec<String>,
    pub check_constraints: Vec<String>,
    pub stale_statistics: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFacts {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
}

/// Reads table structure and partition occupancy from the database catalog.
#[async_trait]
pub trait TableMetadataReader: Send + Sync {
    async fn table_facts(
        &self,
        data_source_id: Uuid,
        database: Option<&str>,
        schema: &str,
        table: &str,
    ) -> Result<TableFacts>;

    async fn partition_row_count(
        &self,
        data_source_id: Uuid,
        schema: &str,
        table: &str,
        boundary_key: &str,
    ) -> Result<u64>;
}

/// Runs generated DDL against the target database.
#[async_trait]
pub trait DdlExecutor: Send + Sync {
    /// Returns the execution log on success.
    async fn execute_script(
        &self,
        data_source_id: Uuid,
        database: Option<&str>,
        script: &str,
    ) -> Result<String>;
}
