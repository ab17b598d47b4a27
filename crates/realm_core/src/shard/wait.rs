//! Waiting for queued actions to run.
//!
//! A waiter enqueues its action together with a completion handle. After the
//! action runs, the message registers a keep-alive updatable owning the
//! handle; the keep-alive fires during the same tick's updatable phase, and
//! tearing the shard down releases it too. If the shard drops the message
//! instead, the handle is dropped with it and the waiter is released with
//! [`ShardError::WaitCancelled`].

use super::{Shard, ShardContext};
use crate::error::ShardError;
use crate::updatable::{Completion, Updatable};
use crossbeam::channel::RecvTimeoutError;
use std::time::Duration;

impl Shard {
    fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.update_delay_ms.saturating_mul(4).max(50))
    }

    fn ensure_waitable(&self, operation: &'static str) -> Result<(), ShardError> {
        self.ensure_no_context(operation)?;
        if self.is_disposed() {
            return Err(ShardError::Disposed(self.name.clone()));
        }
        if !self.is_scheduled() {
            return Err(ShardError::NotRunning(self.name.clone()));
        }
        Ok(())
    }

    /// Enqueues `action` and blocks until the shard has executed it.
    ///
    /// Must not be called from the shard's own thread: that would wait for a
    /// tick that can never run, so it is treated as a context violation.
    pub fn add_message_and_wait<F>(&self, action: F) -> Result<(), ShardError>
    where
        F: FnOnce(&mut ShardContext<'_>) + Send + 'static,
    {
        self.ensure_waitable("add_message_and_wait")?;
        let (tx, rx) = crossbeam::channel::bounded(1);
        self.post("add_message_and_wait", move |ctx| {
            action(ctx);
            ctx.register_updatable(Updatable::KeepAlive(Some(Completion::Blocking(tx))));
        });

        let poll = self.wait_poll_interval();
        loop {
            match rx.recv_timeout(poll) {
                Ok(()) => return Ok(()),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ShardError::WaitCancelled(self.name.clone()))
                }
                Err(RecvTimeoutError::Timeout) if !self.is_scheduled() => {
                    return match rx.try_recv() {
                        Ok(()) => Ok(()),
                        Err(_) => Err(ShardError::WaitCancelled(self.name.clone())),
                    };
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    /// Async counterpart of [`Shard::add_message_and_wait`].
    pub async fn add_message_and_wait_async<F>(&self, action: F) -> Result<(), ShardError>
    where
        F: FnOnce(&mut ShardContext<'_>) + Send + 'static,
    {
        self.ensure_waitable("add_message_and_wait_async")?;
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        self.post("add_message_and_wait", move |ctx| {
            action(ctx);
            ctx.register_updatable(Updatable::KeepAlive(Some(Completion::Async(tx))));
        });

        let poll = self.wait_poll_interval();
        loop {
            match tokio::time::timeout(poll, &mut rx).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(_)) => return Err(ShardError::WaitCancelled(self.name.clone())),
                Err(_) if !self.is_scheduled() => {
                    return match rx.try_recv() {
                        Ok(()) => Ok(()),
                        Err(_) => Err(ShardError::WaitCancelled(self.name.clone())),
                    };
                }
                Err(_) => {}
            }
        }
    }

    /// Blocks until the shard has completed one more message drain.
    pub fn wait_one_tick(&self) -> Result<(), ShardError> {
        self.add_message_and_wait(|_| {})
    }

    /// Blocks until `ticks` more message drains have completed.
    pub fn wait_ticks(&self, ticks: u32) -> Result<(), ShardError> {
        for _ in 0..ticks {
            self.wait_one_tick()?;
        }
        Ok(())
    }

    pub async fn wait_one_tick_async(&self) -> Result<(), ShardError> {
        self.add_message_and_wait_async(|_| {}).await
    }
}
