// ============================================================================
// Background task tracking: aggregate, service, stale-heartbeat sweep
// ============================================================================

mod service;
mod sweep;
#[allow(clippy::module_inception)]
mod task;

pub use service::{StartTaskRequest, TaskService};
pub use sweep::HeartbeatSweep;
pub use task::{BackgroundTask, TaskLogEntry, TaskStatus};
