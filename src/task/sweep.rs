// ============================================================================
// Stale-heartbeat sweep
// ============================================================================
//
// Heartbeat staleness is the only signal a crashed or hung worker leaves
// behind. The sweep periodically lists not-completed tasks whose heartbeat is
// older than the threshold and surfaces them for operator intervention. It
// deliberately never mutates the tasks: whether a stale task is resumed,
// failed or resubmitted is an operator decision.
// ============================================================================

use chrono::Duration;
use log::warn;
use std::sync::Arc;
use tokio::time::{interval, Duration as TokioDuration};

use crate::core::Result;
use crate::repository::TaskRepository;
use crate::task::task::BackgroundTask;

pub struct HeartbeatSweep {
    tasks: Arc<dyn TaskRepository>,
    stale_after: Duration,
    poll_every: TokioDuration,
}

impl HeartbeatSweep {
    pub fn new(tasks: Arc<dyn TaskRepository>, stale_after: Duration, poll_every: TokioDuration) -> Self {
        Self {
            tasks,
            stale_after,
            poll_every,
        }
    }

    /// One sweep pass; returns the stale tasks it found.
    pub async fn sweep_once(&self) -> Result<Vec<BackgroundTask>> {
        let stale = self.tasks.list_stale(self.stale_after).await?;
        for task in &stale {
            warn!(
                "task {} appears abandoned: status {}, last heartbeat {}, touched by {}",
                task.id(),
                task.status(),
                task.last_heartbeat_utc(),
                task.touched_by()
            );
        }
        Ok(stale)
    }

    /// Runs forever; spawn it alongside the queue worker.
    pub async fn run(self) {
        let mut ticker = interval(self.poll_every);
        loop {
            ticker.tick().await;
            if let Err(err) = self.sweep_once().await {
                warn!("heartbeat sweep failed: {}", err);
            }
        }
    }
}
