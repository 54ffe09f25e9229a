//! Delayed task scheduler for retro session expiry.
//!
//! A scheduled task fires once after its delay and hands its
//! [`ExpiryPayload`] to whoever consumes the scheduler's fired channel.
//! Tasks are tagged (with the session id) so every pending task of a session
//! can be cancelled at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Data carried by an expiry task: only the session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryPayload {
    pub session_id: String,
}

/// A scheduled task that has not fired or been cancelled yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    pub task_id: u64,
    pub tag: String,
    pub delay: Duration,
    pub scheduled_at: DateTime<Utc>,
    pub payload: ExpiryPayload,
}

#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Schedule a one-shot task after `delay`, returning its id.
    async fn schedule(&self, tag: &str, delay: Duration, payload: ExpiryPayload) -> Result<u64>;

    /// Cancel every pending task carrying `tag`, returning how many were cancelled.
    async fn cancel_by_tag(&self, tag: &str) -> Result<usize>;

    /// Replace every pending task carrying `tag` with a single new one.
    ///
    /// Cancel and schedule happen as one step, so concurrent calls for the
    /// same tag leave exactly one task pending.
    async fn reschedule(&self, tag: &str, delay: Duration, payload: ExpiryPayload) -> Result<u64>;

    /// Pending tasks carrying `tag`.
    async fn pending(&self, tag: &str) -> Vec<PendingTask>;
}

/// Handle for a spawned delay task
struct ScheduledHandle {
    abort_handle: tokio::task::AbortHandle,
    task: PendingTask,
}

type TaskMap = HashMap<String, Vec<ScheduledHandle>>;

/// Scheduler backed by one tokio task per scheduled job.
///
/// Pending tasks live only as long as the process; callers that need expiry
/// across restarts re-arm from the persisted end time.
pub struct TokioScheduler {
    tasks: Arc<RwLock<TaskMap>>,
    next_id: AtomicU64,
    fired_tx: mpsc::UnboundedSender<ExpiryPayload>,
    /// Serializes schedule/cancel so a cancel cannot miss a task being inserted
    operation_lock: Mutex<()>,
}

impl TokioScheduler {
    /// Create a scheduler and the receiver its fired payloads are sent to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExpiryPayload>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            fired_tx,
            operation_lock: Mutex::new(()),
        };
        (scheduler, fired_rx)
    }

    /// Every pending task across all tags.
    pub async fn all_pending(&self) -> Vec<PendingTask> {
        let tasks = self.tasks.read().await;
        tasks
            .values()
            .flat_map(|handles| handles.iter().map(|h| h.task.clone()))
            .collect()
    }

    /// Abort everything, e.g. on shutdown.
    pub async fn cancel_all(&self) {
        let _lock = self.operation_lock.lock().await;
        let mut tasks = self.tasks.write().await;
        for (tag, handles) in tasks.drain() {
            for handle in handles {
                handle.abort_handle.abort();
            }
            debug!(tag = %tag, "Cancelled scheduled tasks");
        }
    }

    /// Spawn the delay task and register it under `tag`.
    ///
    /// The caller holds the registry write lock, so the task cannot fire and
    /// try to remove itself before it has been inserted.
    fn spawn_task(&self, tasks: &mut TaskMap, tag: &str, delay: Duration, payload: ExpiryPayload) -> u64 {
        let task_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let task = PendingTask {
            task_id,
            tag: tag.to_string(),
            delay,
            scheduled_at: Utc::now(),
            payload: payload.clone(),
        };

        let registry = Arc::clone(&self.tasks);
        let fired_tx = self.fired_tx.clone();
        let task_tag = tag.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let mut tasks = registry.write().await;
                if let Some(handles) = tasks.get_mut(&task_tag) {
                    handles.retain(|h| h.task.task_id != task_id);
                    if handles.is_empty() {
                        tasks.remove(&task_tag);
                    }
                }
            }

            info!(tag = %task_tag, task_id, "Scheduled task fired");
            if fired_tx.send(payload).is_err() {
                warn!(tag = %task_tag, task_id, "No expiry consumer, fired task dropped");
            }
        });

        tasks.entry(tag.to_string()).or_default().push(ScheduledHandle {
            abort_handle: handle.abort_handle(),
            task,
        });

        debug!(tag = %tag, task_id, delay_secs = delay.as_secs(), "Scheduled task");
        task_id
    }
}

fn abort_tag(tasks: &mut TaskMap, tag: &str) -> usize {
    match tasks.remove(tag) {
        Some(handles) => {
            for handle in &handles {
                handle.abort_handle.abort();
            }
            handles.len()
        }
        None => 0,
    }
}

#[async_trait]
impl TaskScheduler for TokioScheduler {
    async fn schedule(&self, tag: &str, delay: Duration, payload: ExpiryPayload) -> Result<u64> {
        let _lock = self.operation_lock.lock().await;
        let mut tasks = self.tasks.write().await;
        Ok(self.spawn_task(&mut tasks, tag, delay, payload))
    }

    async fn cancel_by_tag(&self, tag: &str) -> Result<usize> {
        let _lock = self.operation_lock.lock().await;
        let mut tasks = self.tasks.write().await;

        let cancelled = abort_tag(&mut tasks, tag);
        if cancelled > 0 {
            debug!(tag = %tag, cancelled, "Cancelled scheduled tasks");
        }
        Ok(cancelled)
    }

    async fn reschedule(&self, tag: &str, delay: Duration, payload: ExpiryPayload) -> Result<u64> {
        let _lock = self.operation_lock.lock().await;
        let mut tasks = self.tasks.write().await;

        let cancelled = abort_tag(&mut tasks, tag);
        let task_id = self.spawn_task(&mut tasks, tag, delay, payload);
        debug!(tag = %tag, cancelled, task_id, "Rescheduled task");
        Ok(task_id)
    }

    async fn pending(&self, tag: &str) -> Vec<PendingTask> {
        let tasks = self.tasks.read().await;
        tasks
            .get(tag)
            .map(|handles| handles.iter().map(|h| h.task.clone()).collect())
            .unwrap_or_default()
    }
}
