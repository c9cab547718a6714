//! Queue Engine
//!
//! Owns the outbound backlog and the drain state machine. At most one drain
//! task runs at a time: a trigger arriving while a pass is active only sets
//! `pending_more`, and the active task starts another pass when it finishes
//! the current one.
//!
//! `stop()` is cooperative. The flag is checked before each message, the
//! pacing delay is cut short, and the caller waits on a oneshot released by
//! the drain task once it has quiesced.

use std::sync::Arc;
use std::time::Duration;

use hq_common::{Message, MessageFilter, MessagePage, QueueError, QueueStatus, Result, StatusCounts};
use hq_store::MessageStore;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error, info, warn};

use crate::attempt::{Attempt, DeliveryAttempt};
use crate::auth::AdminKey;

#[derive(Default)]
struct DrainState {
    running: bool,
    draining: bool,
    pending_more: bool,
    /// Messages left in the active pass
    count_draining: u64,
    /// Messages waiting for a future pass
    count_pending: u64,
    stop_waiters: Vec<oneshot::Sender<()>>,
}

impl DrainState {
    fn snapshot(&self) -> QueueStatus {
        QueueStatus {
            running: self.running,
            draining: self.draining,
            pending_more: self.pending_more,
            counts: StatusCounts {
                draining: self.count_draining,
                pending: self.count_pending,
            },
        }
    }

    /// Mark the drain task finished and release every `stop()` caller
    fn finish_pass(&mut self) {
        self.draining = false;
        self.count_draining = 0;
        for waiter in self.stop_waiters.drain(..) {
            let _ = waiter.send(());
        }
        metrics::gauge!("hq_backlog_draining").set(0.0);
    }
}

struct EngineInner {
    store: Arc<dyn MessageStore>,
    attempt: DeliveryAttempt,
    admin_key: AdminKey,
    pacing: Duration,
    state: Mutex<DrainState>,
    wake: Notify,
}

/// Cheap to clone; every clone drives the same engine
#[derive(Clone)]
pub struct QueueEngine {
    inner: Arc<EngineInner>,
}

impl QueueEngine {
    /// Engine in the running state with an empty drain state. Call
    /// [`QueueEngine::trigger`] to pick up a backlog left by a previous process.
    pub fn new(
        store: Arc<dyn MessageStore>,
        attempt: DeliveryAttempt,
        admin_key: AdminKey,
        pacing: Duration,
    ) -> Self {
        let state = DrainState {
            running: true,
            ..Default::default()
        };
        Self {
            inner: Arc::new(EngineInner {
                store,
                attempt,
                admin_key,
                pacing,
                state: Mutex::new(state),
                wake: Notify::new(),
            }),
        }
    }

    pub fn status(&self) -> QueueStatus {
        self.inner.state.lock().snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    // ========================================================================
    // Admin commands
    // ========================================================================

    pub async fn start(&self, key: Option<&str>) -> Result<QueueStatus> {
        self.inner.admin_key.check(key)?;
        self.resume().await?;
        Ok(self.status())
    }

    /// Resolves once an in-flight drain pass has observed the stop
    pub async fn stop(&self, key: Option<&str>) -> Result<QueueStatus> {
        self.inner.admin_key.check(key)?;
        self.halt().await;
        Ok(self.status())
    }

    /// Stop, drop the whole message collection, then start again if the
    /// queue was running
    pub async fn reset(&self, key: Option<&str>) -> Result<QueueStatus> {
        self.inner.admin_key.check(key)?;
        let was_running = self.is_running();

        self.halt().await;
        self.inner.store.drop_all().await?;
        {
            let mut state = self.inner.state.lock();
            state.pending_more = false;
            state.count_pending = 0;
        }
        info!(was_running, "Queue reset, all messages dropped");

        if was_running {
            self.resume().await?;
        }
        Ok(self.status())
    }

    async fn resume(&self) -> Result<()> {
        self.inner.state.lock().running = true;
        info!("Queue started");
        self.trigger().await
    }

    async fn halt(&self) {
        let waiter = {
            let mut state = self.inner.state.lock();
            state.running = false;
            if state.draining {
                let (tx, rx) = oneshot::channel();
                state.stop_waiters.push(tx);
                Some(rx)
            } else {
                None
            }
        };

        self.inner.wake.notify_waiters();
        if let Some(rx) = waiter {
            debug!("Waiting for the drain pass to quiesce");
            let _ = rx.await;
        }
        info!("Queue stopped");
    }

    // ========================================================================
    // Backlog
    // ========================================================================

    /// Persist an admitted message and trigger a drain. Once stored, the
    /// message is admitted even if the trigger fails; the next resend picks it up.
    pub async fn admit(&self, message: Message) -> Result<Message> {
        self.inner.store.insert(&message).await?;
        debug!(message_id = %message.id, subject = %message.subject, "Message queued");
        if let Err(e) = self.trigger().await {
            warn!(message_id = %message.id, error = %e, "Drain trigger failed, message left for the next resend");
        }
        Ok(message)
    }

    pub async fn messages(&self, filter: MessageFilter, page: u32, page_size: u32) -> Result<MessagePage> {
        Ok(self.inner.store.list(filter, page.max(1), page_size).await?)
    }

    pub async fn delete_message(&self, id: &str) -> Result<()> {
        if !self.inner.store.remove(id).await? {
            return Err(QueueError::not_found("message", id));
        }
        info!(message_id = %id, "Message deleted");
        Ok(())
    }

    /// Remove every pending message, waiting for an active pass to stop
    /// first, then restart the queue
    pub async fn clear_pending(&self) -> Result<u64> {
        self.halt().await;
        let removed = self.inner.store.remove_pending().await?;
        {
            let mut state = self.inner.state.lock();
            state.pending_more = false;
            state.count_pending = 0;
        }
        info!(removed, "Pending messages cleared");
        self.resume().await?;
        Ok(removed)
    }

    // ========================================================================
    // Drain loop
    // ========================================================================

    /// Start a drain pass unless one is active or the queue is stopped
    pub async fn trigger(&self) -> Result<()> {
        let backlog = self.inner.store.count_pending().await?;

        {
            let mut state = self.inner.state.lock();
            if state.draining {
                state.pending_more = true;
                state.count_pending += 1;
                return Ok(());
            }
            if !state.running {
                state.pending_more = backlog > 0;
                state.count_pending = backlog;
                return Ok(());
            }
            state.pending_more = false;
            state.count_pending = 0;
            if backlog == 0 {
                return Ok(());
            }
            state.draining = true;
            state.count_draining = backlog;
        }

        debug!(backlog, "Starting drain task");
        let engine = self.clone();
        tokio::spawn(async move { engine.drain().await });
        Ok(())
    }

    /// Body of the drain task. Runs passes until no more work was signalled,
    /// pacing the first delivery of a follow-up pass like any other.
    async fn drain(&self) {
        loop {
            if !self.drain_pass().await {
                return;
            }
            if !self.rearm().await {
                return;
            }
            self.pace().await;
        }
    }

    /// Decide whether another pass follows the one that just ended
    async fn rearm(&self) -> bool {
        {
            let mut state = self.inner.state.lock();
            if !state.pending_more {
                state.finish_pass();
                return false;
            }
        }

        let backlog = match self.inner.store.count_pending().await {
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "Failed to count backlog, halting queue");
                let mut state = self.inner.state.lock();
                state.running = false;
                state.finish_pass();
                return false;
            }
        };

        let mut state = self.inner.state.lock();
        if !state.running {
            state.pending_more = backlog > 0;
            state.count_pending = backlog;
            state.finish_pass();
            return false;
        }
        state.pending_more = false;
        state.count_pending = 0;
        if backlog == 0 {
            state.finish_pass();
            return false;
        }
        state.count_draining = backlog;
        true
    }

    /// One pass over the backlog snapshot. Returns false when the drain task
    /// must end without looking for more work.
    async fn drain_pass(&self) -> bool {
        let messages = match self.inner.store.fetch_pending().await {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, "Failed to fetch backlog, halting queue");
                self.halt_on_store_error();
                return false;
            }
        };

        let total = messages.len() as u64;
        info!(count = total, "Drain pass started");

        for (index, message) in messages.into_iter().enumerate() {
            let index = index as u64;
            {
                let mut state = self.inner.state.lock();
                if !state.running {
                    let remaining = total - index;
                    state.pending_more = true;
                    state.count_pending += remaining;
                    state.finish_pass();
                    info!(remaining, "Drain pass stopped");
                    return false;
                }
                state.count_draining = total - index;
            }
            metrics::gauge!("hq_backlog_draining").set((total - index) as f64);

            if let Err(e) = self.process(message).await {
                error!(error = %e, "Failed to persist delivery outcome, halting queue");
                self.halt_on_store_error();
                return false;
            }

            if index + 1 < total {
                self.pace().await;
            }
        }

        debug!(count = total, "Drain pass finished");
        true
    }

    async fn process(&self, message: Message) -> hq_store::Result<()> {
        let id = message.id.clone();
        let init = message.init;

        match self.inner.attempt.run(message).await {
            Attempt::Resolved { message, outcome } => {
                self.inner.store.save(&message).await?;
                debug!(message_id = %id, outcome = outcome.as_str(), "Message resolved");
            }
            Attempt::Deferred => {
                debug!(message_id = %id, "Message left pending");
            }
            Attempt::Failed { .. } if init => {
                debug!(message_id = %id, "Init message kept for the next pass");
            }
            Attempt::Failed { code, error } => {
                self.inner.store.remove(&id).await?;
                warn!(message_id = %id, code = ?code, error = ?error, "Failed message removed from backlog");
            }
        }
        Ok(())
    }

    async fn pace(&self) {
        tokio::select! {
            _ = tokio::time::sleep(self.inner.pacing) => {}
            _ = self.inner.wake.notified() => {}
        }
    }

    fn halt_on_store_error(&self) {
        let mut state = self.inner.state.lock();
        state.running = false;
        state.pending_more = true;
        state.finish_pass();
    }
}
