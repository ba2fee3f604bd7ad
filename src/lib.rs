// ============================================================================
// partman - partition lifecycle engine
// ============================================================================
//
// Records a table's partition scheme, turns operator intent (split / merge /
// switch) into reviewed, auditable DDL commands, and executes them in the
// background with permission gates, heartbeat-based failure detection and an
// append-only audit trail.
// ============================================================================

pub mod audit;
pub mod command;
pub mod config;
pub mod core;
pub mod facade;
pub mod inspect;
pub mod permission;
pub mod repository;
pub mod script;
pub mod task;

// Re-export main types for convenience
pub use crate::core::{
    PartitionBoundary, PartitionColumn, PartitionError, PartitionValue, PartitionValueKind, Result,
};
pub use config::{
    ConfigurationService, CreateConfigurationRequest, PartitionConfiguration,
    PartitionFilegroupStrategy, PartitionSafetyRule, PartitionStorageSettings,
};
pub use command::{
    CommandPolicy, CommandQueue, CommandService, CommandStatus, CommandType, CommandWorker,
    MergeRequest, PartitionCommand, SplitRequest, SwitchRequest,
};
pub use inspect::{AutoFixExecutor, SwitchContext, SwitchInspection, SwitchInspector};
pub use task::{BackgroundTask, HeartbeatSweep, StartTaskRequest, TaskService, TaskStatus};
pub use facade::{EngineDependencies, PartitionEngine};
