//! Deferred action queue.
//!
//! Every mutation that originates off the shard thread is wrapped in a
//! [`Message`] and pushed onto the shard's [`MessageQueue`]. Producers never
//! block; the shard drains the queue once per tick before any object update.

use crate::shard::ShardContext;
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Boxed action executed on the shard thread.
pub type MessageAction = Box<dyn FnOnce(&mut ShardContext<'_>) + Send + 'static>;

/// A labelled action waiting to run inside the shard context.
pub struct Message {
    label: &'static str,
    action: MessageAction,
}

impl Message {
    pub fn new<F>(label: &'static str, action: F) -> Self
    where
        F: FnOnce(&mut ShardContext<'_>) + Send + 'static,
    {
        Self {
            label,
            action: Box::new(action),
        }
    }

    /// Short description used when the action fails.
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn run(self, ctx: &mut ShardContext<'_>) {
        (self.action)(ctx)
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message").field("label", &self.label).finish()
    }
}

/// Multi-producer, single-consumer queue of [`Message`]s.
///
/// `push` may be called from any thread at any time. Popping is reserved for
/// the thread holding the shard context, which [`crate::Shard`] enforces.
#[derive(Debug, Default)]
pub struct MessageQueue {
    inner: SegQueue<Message>,
    enqueued: AtomicU64,
    executed: AtomicU64,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a message. Never blocks.
    pub fn push(&self, message: Message) {
        self.inner.push(message);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn pop(&self) -> Option<Message> {
        self.inner.pop()
    }

    /// Number of messages waiting to be drained.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Pops at most the number of messages present when the drain began.
    ///
    /// Messages pushed while the drain is in progress, including those pushed
    /// by drained messages themselves, are left for the next drain.
    pub(crate) fn drain_snapshot(&self) -> SnapshotDrain<'_> {
        SnapshotDrain {
            queue: self,
            remaining: self.inner.len(),
        }
    }

    pub(crate) fn mark_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops every queued message without running it.
    ///
    /// Returns the number of messages discarded.
    pub(crate) fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.inner.pop().is_some() {
            dropped += 1;
        }
        dropped
    }

    /// Total messages ever enqueued.
    pub fn total_enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Total messages that ran to completion or failure.
    pub fn total_executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }
}

/// Iterator returned by [`MessageQueue::drain_snapshot`].
pub(crate) struct SnapshotDrain<'a> {
    queue: &'a MessageQueue,
    remaining: usize,
}

impl Iterator for SnapshotDrain<'_> {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.queue.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_drain_stops_at_initial_length() {
        let queue = MessageQueue::new();
        for _ in 0..3 {
            queue.push(Message::new("noop", |_| {}));
        }
        let mut drained = 0;
        let mut drain = queue.drain_snapshot();
        while drain.next().is_some() {
            drained += 1;
            // Pushed mid-drain, must wait for the next pass.
            queue.push(Message::new("late", |_| {}));
        }
        assert_eq!(drained, 3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.total_enqueued(), 6);
    }

    #[test]
    fn clear_discards_everything() {
        let queue = MessageQueue::new();
        queue.push(Message::new("a", |_| {}));
        queue.push(Message::new("b", |_| {}));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.total_executed(), 0);
    }
}
