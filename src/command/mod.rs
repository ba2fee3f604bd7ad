// ============================================================================
// Partition commands: aggregate, payloads, application service, queue, worker
// ============================================================================

#[allow(clippy::module_inception)]
mod command;
mod payload;
mod queue;
mod service;
mod worker;

pub use command::{CommandStatus, CommandType, PartitionCommand};
pub use payload::CommandPayload;
pub use queue::{CommandQueue, CommandQueueReceiver};
pub use service::{
    CommandPolicy, CommandPreview, CommandService, MergeRequest, SplitRequest, SwitchRequest,
};
pub use worker::CommandWorker;
