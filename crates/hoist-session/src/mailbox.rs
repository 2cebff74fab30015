//! Per-call reply mailboxes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use hoist_wire::Message;
use tokio::sync::Notify;

/// The inbound queue of one in-flight logical call.
///
/// Created right before the request is sent, registered under the call's
/// correlation id, and unregistered when the call finishes. The reader pump
/// appends; the owning call drains. Never shared between calls.
///
/// The `Notify` is the call's binary "has data" signal: `push` stores a
/// permit, the drain loop consumes it, empties the queue, and waits again.
/// `deactivate` clears the active flag and signals, so a waiter blocked on
/// a connection that died wakes up instead of hanging forever.
#[derive(Debug)]
pub struct ReplyMailbox {
    id: u64,
    queue: Mutex<VecDeque<Message>>,
    signal: Notify,
    active: AtomicBool,
}

impl ReplyMailbox {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            queue: Mutex::new(VecDeque::new()),
            signal: Notify::new(),
            active: AtomicBool::new(true),
        }
    }

    /// The correlation id this mailbox is registered under.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Append an inbound message and wake the owning call.
    pub fn push(&self, msg: Message) {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(msg);
        self.signal.notify_one();
    }

    /// Take every currently queued message, in arrival order.
    pub fn drain(&self) -> Vec<Message> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect()
    }

    /// Wait until the mailbox is signaled (new data or deactivation).
    pub async fn wait(&self) {
        self.signal.notified().await;
    }

    /// Whether the connection behind this mailbox is still delivering.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Mark the mailbox dead and wake any waiter. Called on disconnect so
    /// no call deadlocks on a queue that will never receive again.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        self.signal.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn push_wakes_waiter_and_drain_preserves_order() {
        let mailbox = Arc::new(ReplyMailbox::new(1));
        let waiter = {
            let mailbox = Arc::clone(&mailbox);
            tokio::spawn(async move {
                mailbox.wait().await;
                mailbox.drain()
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        mailbox.push(Message::new("first"));
        mailbox.push(Message::new("second"));

        let drained = waiter.await.unwrap();
        let commands: Vec<_> = drained.iter().map(|m| m.command.as_str()).collect();
        // a single wake may observe one or both, but never out of order
        assert_eq!(commands[0], "first");
        if commands.len() > 1 {
            assert_eq!(commands[1], "second");
        }
    }

    #[tokio::test]
    async fn wait_is_pending_until_signaled() {
        use tokio_test::{assert_pending, assert_ready};

        let mailbox = ReplyMailbox::new(4);
        let mut wait = tokio_test::task::spawn(mailbox.wait());
        assert_pending!(wait.poll());

        mailbox.push(Message::new("package-found"));
        assert_ready!(wait.poll());
    }

    #[tokio::test]
    async fn push_before_wait_is_not_lost() {
        let mailbox = ReplyMailbox::new(2);
        mailbox.push(Message::new("early"));
        // the stored permit makes this return immediately
        tokio::time::timeout(Duration::from_millis(100), mailbox.wait())
            .await
            .expect("signal permit should be stored");
        assert_eq!(mailbox.drain().len(), 1);
    }

    #[tokio::test]
    async fn deactivate_unblocks_waiter() {
        let mailbox = Arc::new(ReplyMailbox::new(3));
        let waiter = {
            let mailbox = Arc::clone(&mailbox);
            tokio::spawn(async move {
                mailbox.wait().await;
                mailbox.is_active()
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        mailbox.deactivate();
        assert!(!waiter.await.unwrap());
    }
}
