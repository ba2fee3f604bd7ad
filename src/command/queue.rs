use log::warn;
use tokio::sync::mpsc;
use uuid::Uuid;

/// FIFO queue of approved command ids.
///
/// Carries identifiers only; the worker reloads the command from its
/// repository so it never executes a stale payload.
#[derive(Clone)]
pub struct CommandQueue {
    sender: mpsc::UnboundedSender<Uuid>,
}

pub struct CommandQueueReceiver {
    receiver: mpsc::UnboundedReceiver<Uuid>,
}

impl CommandQueue {
    pub fn new() -> (Self, CommandQueueReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, CommandQueueReceiver { receiver })
    }

    /// Fire-and-forget from the approval path. A closed queue (worker gone
    /// during shutdown) is logged, not surfaced: the command stays Approved
    /// and can be re-enqueued.
    pub fn enqueue(&self, command_id: Uuid) {
        if self.sender.send(command_id).is_err() {
            warn!("command queue closed; command {} not enqueued", command_id);
        }
    }
}

impl CommandQueueReceiver {
    /// Waits for the next command id; `None` once all senders are dropped.
    pub async fn recv(&mut self) -> Option<Uuid> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        tokio_test::block_on(async {
            let (queue, mut receiver) = CommandQueue::new();
            let a = Uuid::new_v4();
            let b = Uuid::new_v4();
            queue.enqueue(a);
            queue.enqueue(b);
            assert_eq!(receiver.recv().await, Some(a));
            assert_eq!(receiver.recv().await, Some(b));
        });
    }

    #[tokio::test]
    async fn test_enqueue_after_receiver_drop_does_not_panic() {
        let (queue, receiver) = CommandQueue::new();
        drop(receiver);
        queue.enqueue(Uuid::new_v4());
    }
}
