// ============================================================================
// PartitionEngine facade
// ============================================================================
//
// Assembles repositories, services, queue and worker into the single entry
// point an API layer consumes. Construction returns the engine together with
// the worker so the caller decides where the worker runs (usually
// `tokio::spawn(worker.run())`).
// ============================================================================

use std::sync::Arc;

use crate::command::{
    CommandPolicy, CommandQueue, CommandService, CommandWorker,
};
use crate::config::ConfigurationService;
use crate::inspect::{AutoFixExecutor, SwitchInspector};
use crate::permission::PermissionGate;
use crate::repository::{
    AuditRepository, CommandRepository, ConfigurationRepository, DdlExecutor,
    InMemoryAuditRepository, InMemoryCommandRepository, InMemoryConfigurationRepository,
    InMemoryTaskRepository, PermissionReader, RecordingDdlExecutor, StaticMetadataReader,
    StaticPermissionReader, TableMetadataReader, TaskRepository,
};
use crate::script::{ScriptGenerator, TsqlScriptGenerator};
use crate::task::TaskService;

/// Everything the engine talks to. Swap individual members for relational /
/// live-catalog adapters in production.
pub struct EngineDependencies {
    pub configurations: Arc<dyn ConfigurationRepository>,
    pub commands: Arc<dyn CommandRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub audit: Arc<dyn AuditRepository>,
    pub script_generator: Arc<dyn ScriptGenerator>,
    pub metadata: Arc<dyn TableMetadataReader>,
    pub permissions: Arc<dyn PermissionReader>,
    pub ddl_executor: Arc<dyn DdlExecutor>,
}

impl EngineDependencies {
    /// In-memory wiring: in-memory repositories, the plain T-SQL generator,
    /// an all-grants permission reader, and a recording DDL executor.
    pub fn in_memory() -> Self {
        Self {
            configurations: Arc::new(InMemoryConfigurationRepository::new()),
            commands: Arc::new(InMemoryCommandRepository::new()),
            tasks: Arc::new(InMemoryTaskRepository::new()),
            audit: Arc::new(InMemoryAuditRepository::new()),
            script_generator: Arc::new(TsqlScriptGenerator),
            metadata: Arc::new(StaticMetadataReader::new()),
            permissions: Arc::new(StaticPermissionReader::with_all_grants()),
            ddl_executor: Arc::new(RecordingDdlExecutor::new()),
        }
    }
}

pub struct PartitionEngine {
    configurations: ConfigurationService,
    commands: CommandService,
    tasks: TaskService,
    inspector: SwitchInspector,
    autofix: AutoFixExecutor,
    queue: CommandQueue,
}

impl PartitionEngine {
    pub fn new(
        deps: EngineDependencies,
        policy: CommandPolicy,
        worker_name: impl Into<String>,
    ) -> (Self, CommandWorker) {
        let (queue, receiver) = CommandQueue::new();

        let configurations =
            ConfigurationService::new(deps.configurations.clone(), deps.audit.clone());
        let commands = CommandService::new(
            deps.configurations.clone(),
            deps.commands.clone(),
            deps.audit.clone(),
            deps.script_generator.clone(),
            deps.metadata.clone(),
            queue.clone(),
            policy,
        );
        let tasks = TaskService::new(deps.tasks.clone(), deps.configurations.clone());
        let inspector = SwitchInspector::new(deps.metadata.clone());
        let autofix = AutoFixExecutor::new(deps.ddl_executor.clone());

        let worker = CommandWorker::new(
            receiver,
            deps.commands,
            deps.configurations,
            deps.audit,
            deps.ddl_executor,
            PermissionGate::new(deps.permissions),
            worker_name,
        );

        (
            Self {
                configurations,
                commands,
                tasks,
                inspector,
                autofix,
                queue,
            },
            worker,
        )
    }

    pub fn configurations(&self) -> &ConfigurationService {
        &self.configurations
    }

    pub fn commands(&self) -> &CommandService {
        &self.commands
    }

    pub fn tasks(&self) -> &TaskService {
        &self.tasks
    }

    pub fn inspector(&self) -> &SwitchInspector {
        &self.inspector
    }

    pub fn autofix(&self) -> &AutoFixExecutor {
        &self.autofix
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }
}
