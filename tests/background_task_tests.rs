/// Background task tests
///
/// Start policy, the full execution lifecycle, and stale-heartbeat sweeps.
/// Run with: cargo test --test background_task_tests

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use partman::repository::{
    ConfigurationRepository, InMemoryAuditRepository, InMemoryConfigurationRepository,
    InMemoryTaskRepository,
};
use partman::task::{HeartbeatSweep, StartTaskRequest, TaskService, TaskStatus};
use partman::{
    ConfigurationService, CreateConfigurationRequest, PartitionColumn, PartitionFilegroupStrategy,
    PartitionStorageSettings, PartitionValue, PartitionValueKind,
};
use uuid::Uuid;

fn service() -> (TaskService, Arc<InMemoryTaskRepository>) {
    let tasks = Arc::new(InMemoryTaskRepository::new());
    let configs = Arc::new(InMemoryConfigurationRepository::new());
    (TaskService::new(tasks.clone(), configs), tasks)
}

fn request(data_source_id: Uuid) -> StartTaskRequest {
    StartTaskRequest {
        configuration_id: None,
        data_source_id,
        phase: "准备中".into(),
        requested_by: "alice".into(),
        priority: 0,
    }
}

#[tokio::test]
async fn test_full_lifecycle() {
    let (service, _) = service();
    let task = service.start(request(Uuid::new_v4())).await.unwrap();
    assert_eq!(task.status(), TaskStatus::PendingValidation);

    let id = task.id();
    service.mark_validating(id, "worker-1").await.unwrap();
    service.mark_queued(id, "worker-1").await.unwrap();
    service.mark_running(id, "worker-1").await.unwrap();
    service.update_progress(id, 0.4, "worker-1").await.unwrap();
    service.update_checkpoint(id, "boundary 2024-03-01 applied", "worker-1").await.unwrap();
    let done = service
        .mark_succeeded(id, Some("{\"rows_moved\":0}".into()), "worker-1")
        .await
        .unwrap();

    assert_eq!(done.status(), TaskStatus::Succeeded);
    assert_eq!(done.progress(), 1.0);
    assert!(done.completed_at_utc().is_some());
    assert!(done.failure_reason().is_none());
    assert_eq!(done.touched_by(), "worker-1");
    assert_eq!(done.last_checkpoint(), Some("boundary 2024-03-01 applied"));
    // Every status transition left a log line.
    assert!(done.log().len() >= 4);
}

#[tokio::test]
async fn test_one_active_task_per_data_source() {
    let (service, _) = service();
    let data_source_id = Uuid::new_v4();
    let first = service.start(request(data_source_id)).await.unwrap();

    let err = service.start(request(data_source_id)).await.unwrap_err();
    assert!(err.to_string().contains(&first.id().to_string()));
    assert!(err.to_string().contains("该数据源已有正在进行的任务"));

    // A different data source is unaffected.
    assert!(service.start(request(Uuid::new_v4())).await.is_ok());

    // Once the first completes, its data source is free again.
    service.mark_running(first.id(), "w").await.unwrap_err(); // not queued yet
    service.cancel(first.id(), "alice").await.unwrap();
    assert!(service.start(request(data_source_id)).await.is_ok());
}

#[tokio::test]
async fn test_run_requires_queued_status() {
    let (service, _) = service();
    let task = service.start(request(Uuid::new_v4())).await.unwrap();
    let err = service.mark_running(task.id(), "w").await.unwrap_err();
    assert!(err.to_string().contains("只有排队中的任务才能进入执行"));
}

#[tokio::test]
async fn test_start_freezes_configuration_snapshot() {
    let tasks = Arc::new(InMemoryTaskRepository::new());
    let configs = Arc::new(InMemoryConfigurationRepository::new());
    let audit = Arc::new(InMemoryAuditRepository::new());
    let config_service = ConfigurationService::new(configs.clone(), audit);
    let data_source_id = Uuid::new_v4();
    let config = config_service
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
            initial_boundaries: vec![PartitionValue::Date(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            )],
            requested_by: "alice".into(),
        })
        .await
        .unwrap();

    let service = TaskService::new(tasks, configs.clone());
    let task = service
        .start(StartTaskRequest {
            configuration_id: Some(config.id()),
            data_source_id,
            phase: "准备中".into(),
            requested_by: "alice".into(),
            priority: 0,
        })
        .await
        .unwrap();

    let snapshot = task.configuration_snapshot().unwrap();
    assert!(snapshot.contains("pf_orders"));

    // The configuration points back at the task that worked on it.
    let stamped = configs.find_by_id(config.id()).await.unwrap().unwrap();
    assert_eq!(stamped.last_execution_task_id(), Some(task.id()));

    // Later metadata changes do not rewrite the frozen snapshot.
    config_service
        .add_boundary(
            config.id(),
            PartitionValue::Date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()),
            None,
            "alice",
        )
        .await
        .unwrap();
    let reloaded = service.get(task.id()).await.unwrap();
    assert!(!reloaded.configuration_snapshot().unwrap().contains("2024-02-01"));
}

#[tokio::test]
async fn test_backup_reference_and_notes() {
    let (service, _) = service();
    let task = service.start(request(Uuid::new_v4())).await.unwrap();
    let id = task.id();

    service
        .set_backup_reference(id, "backup://orders/2024-03-01", "alice")
        .await
        .unwrap();
    let annotated = service.set_notes(id, "月末窗口执行", "alice").await.unwrap();
    assert_eq!(annotated.backup_reference(), Some("backup://orders/2024-03-01"));
    assert_eq!(annotated.notes(), Some("月末窗口执行"));

    // Completed tasks are immutable.
    service.cancel(id, "alice").await.unwrap();
    assert!(service.set_notes(id, "too late", "alice").await.is_err());
}

#[tokio::test]
async fn test_failed_requires_reason() {
    let (service, _) = service();
    let task = service.start(request(Uuid::new_v4())).await.unwrap();
    let id = task.id();
    service.mark_queued(id, "w").await.unwrap();
    service.mark_running(id, "w").await.unwrap();

    assert!(service.mark_failed(id, "  ", "w").await.is_err());
    let failed = service.mark_failed(id, "磁盘空间不足", "w").await.unwrap();
    assert_eq!(failed.status(), TaskStatus::Failed);
    assert_eq!(failed.failure_reason(), Some("磁盘空间不足"));
}

#[tokio::test]
async fn test_sweep_reports_stale_running_tasks_only() {
    let (service, tasks) = service();

    let running = service.start(request(Uuid::new_v4())).await.unwrap();
    service.mark_queued(running.id(), "w").await.unwrap();
    service.mark_running(running.id(), "w").await.unwrap();

    let finished = service.start(request(Uuid::new_v4())).await.unwrap();
    service.cancel(finished.id(), "alice").await.unwrap();

    // Zero threshold: every heartbeat already counts as stale.
    let sweep = HeartbeatSweep::new(tasks, Duration::zero(), std::time::Duration::from_secs(60));
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let stale = sweep.sweep_once().await.unwrap();

    let ids: Vec<Uuid> = stale.iter().map(|t| t.id()).collect();
    assert!(ids.contains(&running.id()));
    // Completed tasks are never reported.
    assert!(!ids.contains(&finished.id()));

    // The sweep observed, it did not touch: the task is still running.
    let reloaded = service.get(running.id()).await.unwrap();
    assert_eq!(reloaded.status(), TaskStatus::Running);
}

#[tokio::test]
async fn test_fresh_heartbeat_is_not_stale() {
    let (service, tasks) = service();
    let task = service.start(request(Uuid::new_v4())).await.unwrap();
    service.mark_queued(task.id(), "w").await.unwrap();
    service.mark_running(task.id(), "w").await.unwrap();
    service.heartbeat(task.id(), "w").await.unwrap();

    let sweep = HeartbeatSweep::new(tasks, Duration::hours(1), std::time::Duration::from_secs(60));
    assert!(sweep.sweep_once().await.unwrap().is_empty());
}
