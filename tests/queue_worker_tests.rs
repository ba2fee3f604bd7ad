/// Queue worker tests
///
/// End-to-end execution of approved commands: DDL runs, configuration
/// metadata follows, outcomes land on the command and the audit trail.
/// Run with: cargo test --test queue_worker_tests

use std::sync::Arc;

use chrono::NaiveDate;
use partman::command::{CommandPolicy, CommandQueue, CommandService, CommandWorker};
use partman::permission::{PermissionGate, RequiredGrant};
use partman::repository::{
    AuditRepository, ConfigurationRepository, InMemoryAuditRepository, InMemoryCommandRepository,
    InMemoryConfigurationRepository, RecordingDdlExecutor, StaticMetadataReader,
    StaticPermissionReader,
};
use partman::script::TsqlScriptGenerator;
use partman::{
    CommandStatus, ConfigurationService, CreateConfigurationRequest, MergeRequest,
    PartitionColumn, PartitionFilegroupStrategy, PartitionStorageSettings, PartitionValue,
    PartitionValueKind, SplitRequest,
};
use uuid::Uuid;

struct Harness {
    data_source_id: Uuid,
    configs: Arc<InMemoryConfigurationRepository>,
    audit: Arc<InMemoryAuditRepository>,
    executor: Arc<RecordingDdlExecutor>,
    service: CommandService,
    worker: CommandWorker,
}

fn date(y: i32, m: u32, d: u32) -> PartitionValue {
    PartitionValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

async fn harness_with_grants(grants: Vec<RequiredGrant>) -> Harness {
    let data_source_id = Uuid::new_v4();
    let configs = Arc::new(InMemoryConfigurationRepository::new());
    let commands = Arc::new(InMemoryCommandRepository::new());
    let audit = Arc::new(InMemoryAuditRepository::new());
    let executor = Arc::new(RecordingDdlExecutor::new());
    let (queue, receiver) = CommandQueue::new();

    let config_service = ConfigurationService::new(configs.clone(), audit.clone());
    config_service
        .create(CreateConfigurationRequest {
            data_source_id,
            schema: "dbo".into(),
            table: "orders".into(),
            function_name: "pf_orders".into(),
            scheme_name: "ps_orders".into(),
            column: PartitionColumn::new("order_date", PartitionValueKind::Date, false).unwrap(),
            filegroup_strategy: PartitionFilegroupStrategy::new("PRIMARY").unwrap(),
            storage_settings: PartitionStorageSettings::UsePrimaryFilegroup,
            is_range_right: true,
            initial_boundaries: vec![date(2024, 1, 1), date(2024, 2, 1)],
            requested_by: "alice".into(),
        })
        .await
        .unwrap();

    let service = CommandService::new(
        configs.clone(),
        commands.clone(),
        audit.clone(),
        Arc::new(TsqlScriptGenerator),
        Arc::new(StaticMetadataReader::new()),
        queue,
        CommandPolicy::default(),
    );
    let worker = CommandWorker::new(
        receiver,
        commands,
        configs.clone(),
        audit.clone(),
        executor.clone(),
        PermissionGate::new(Arc::new(StaticPermissionReader::with_grants(grants))),
        "worker-1",
    );

    Harness {
        data_source_id,
        configs,
        audit,
        executor,
        service,
        worker,
    }
}

async fn harness() -> Harness {
    harness_with_grants(RequiredGrant::ALL.to_vec()).await
}

fn split_request(h: &Harness, value: PartitionValue) -> SplitRequest {
    SplitRequest {
        data_source_id: h.data_source_id,
        schema: "dbo".into(),
        table: "orders".into(),
        boundary_value: value,
        filegroup: Some("FG_ARCHIVE".into()),
        backup_confirmed: true,
        requested_by: "alice".into(),
    }
}

#[tokio::test]
async fn test_split_executes_and_commits_metadata() {
    let h = harness().await;

    let id = h
        .service
        .execute_split(split_request(&h, date(2024, 3, 1)))
        .await
        .unwrap();
    h.service.approve(id, "reviewer").await.unwrap();
    h.worker.process(id).await.unwrap();

    let command = h.service.get(id).await.unwrap();
    assert_eq!(command.status(), CommandStatus::Succeeded);
    assert!(command.execution_log().is_some());
    // Pickup, not approval, stamped the Queued transition.
    assert_eq!(command.queued_by(), Some("worker-1"));

    // The DDL really ran, once.
    let scripts = h.executor.executed_scripts().await;
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains("SPLIT RANGE ('2024-03-01')"));

    // Metadata followed the executed DDL.
    let config = h
        .configs
        .find_by_table(h.data_source_id, "dbo", "orders")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(config.boundaries().len(), 3);
    assert!(config.has_boundary("2024-03-01"));
    assert_eq!(config.resolve_filegroup("2024-03-01"), "FG_ARCHIVE");
    assert!(config.is_committed());

    let entries = h.audit.list_for_resource(&id.to_string()).await.unwrap();
    assert!(entries.iter().any(|e| e.action == "ExecuteSplit" && e.script.is_some()));
}

#[tokio::test]
async fn test_merge_executes_and_removes_boundary() {
    let h = harness().await;

    let id = h
        .service
        .execute_merge(MergeRequest {
            data_source_id: h.data_source_id,
            schema: "dbo".into(),
            table: "orders".into(),
            boundary_key: "2024-02-01".into(),
            requested_by: "alice".into(),
        })
        .await
        .unwrap();
    h.service.approve(id, "reviewer").await.unwrap();
    h.worker.process(id).await.unwrap();

    let command = h.service.get(id).await.unwrap();
    assert_eq!(command.status(), CommandStatus::Succeeded);

    let config = h
        .configs
        .find_by_table(h.data_source_id, "dbo", "orders")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(config.boundaries().len(), 1);
    assert!(!config.has_boundary("2024-02-01"));
}

#[tokio::test]
async fn test_ddl_failure_marks_command_failed() {
    let h = harness().await;
    h.executor.fail_next_with("lock request time out").await;

    let id = h
        .service
        .execute_split(split_request(&h, date(2024, 3, 1)))
        .await
        .unwrap();
    h.service.approve(id, "reviewer").await.unwrap();
    h.worker.process(id).await.unwrap();

    let command = h.service.get(id).await.unwrap();
    assert_eq!(command.status(), CommandStatus::Failed);
    assert!(command.failure_reason().unwrap().contains("lock request time out"));

    // Metadata untouched on failure.
    let config = h
        .configs
        .find_by_table(h.data_source_id, "dbo", "orders")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(config.boundaries().len(), 2);
    assert!(!config.is_committed());

    let entries = h.audit.list_for_resource(&id.to_string()).await.unwrap();
    assert!(entries.iter().any(|e| e.action == "ExecuteSplit"));
}

#[tokio::test]
async fn test_missing_grants_block_execution() {
    let h = harness_with_grants(vec![RequiredGrant::ViewDefinition]).await;

    let id = h
        .service
        .execute_split(split_request(&h, date(2024, 3, 1)))
        .await
        .unwrap();
    h.service.approve(id, "reviewer").await.unwrap();
    h.worker.process(id).await.unwrap();

    let command = h.service.get(id).await.unwrap();
    assert_eq!(command.status(), CommandStatus::Failed);
    assert!(command.failure_reason().unwrap().contains("Permission denied"));
    // Nothing was executed against the database.
    assert!(h.executor.executed_scripts().await.is_empty());
}

#[tokio::test]
async fn test_unknown_command_id_is_skipped() {
    let h = harness().await;
    // A stale id in the queue is dropped without error.
    h.worker.process(Uuid::new_v4()).await.unwrap();
    assert!(h.executor.executed_scripts().await.is_empty());
}
