//! Alert queue with deduplication, debouncing, and batching.
//!
//! Matched alerts land here before delivery to subscribers. Alerts sharing a
//! dedup key collapse into a single pending entry; a batch is delivered when
//! one of three conditions holds:
//! - debounce: no new activity for `debounce_seconds`
//! - size: the pending map reached `max_batch_size` distinct entries
//! - age: the oldest pending entry is `max_age_seconds` old
//!
//! Deadlines are plain values evaluated by one coordinator task that sleeps
//! until the nearer of the two and re-checks whenever the queue changes, so
//! no per-enqueue timers accumulate. A flush snapshots and clears the pending
//! map before any callback runs; events enqueued during callback execution
//! start a fresh batch.

use crate::config::QueueConfig;
use crate::models::{AlertRule, SecurityEvent};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Queue errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueueError {
    #[error("Event queue has been shut down")]
    ShutDown,
}

/// Identity of "the same alert" for deduplication purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    /// Matched rule name
    pub rule_name: String,
    /// Event source id
    pub source_id: String,
    /// Event class name
    pub class_name: String,
}

/// An in-flight deduplicated alert awaiting flush.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingAlert {
    /// Dedup key this entry collapses
    pub key: DedupKey,
    /// Number of enqueues collapsed into this entry
    pub count: u64,
    /// Time of the first collapsed enqueue
    pub first_seen: DateTime<Utc>,
    /// Time of the most recent collapsed enqueue
    pub last_seen: DateTime<Utc>,
    /// Message from the most recent enqueue
    pub latest_message: String,
    /// Rule that matched
    pub rule: AlertRule,
    /// Representative event (the first one enqueued for this key)
    pub event: SecurityEvent,
}

/// Queue counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Enqueue calls accepted
    pub total_enqueued: u64,
    /// Enqueues collapsed into an existing pending entry
    pub total_deduplicated: u64,
    /// Entries delivered across all flushes
    pub total_flushed: u64,
    /// Entries currently pending
    pub pending: usize,
}

/// Registered flush subscriber.
pub type FlushCallback =
    Arc<dyn Fn(Vec<PendingAlert>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct QueueInner {
    pending: HashMap<DedupKey, PendingAlert>,
    debounce_at: Option<Instant>,
    age_at: Option<Instant>,
    callbacks: Vec<FlushCallback>,
    total_enqueued: u64,
    total_deduplicated: u64,
    total_flushed: u64,
    shut_down: bool,
}

/// Deduplicating, debouncing, batching alert queue.
pub struct EventQueue {
    debounce: Duration,
    max_age: Duration,
    max_batch_size: usize,
    inner: Arc<Mutex<QueueInner>>,
    notify: Arc<Notify>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl EventQueue {
    /// Create a queue and spawn its deadline coordinator.
    #[must_use]
    pub fn new(config: &QueueConfig) -> Self {
        let inner = Arc::new(Mutex::new(QueueInner {
            pending: HashMap::new(),
            debounce_at: None,
            age_at: None,
            callbacks: Vec::new(),
            total_enqueued: 0,
            total_deduplicated: 0,
            total_flushed: 0,
            shut_down: false,
        }));
        let notify = Arc::new(Notify::new());
        let coordinator = tokio::spawn(Self::coordinate(Arc::clone(&inner), Arc::clone(&notify)));

        Self {
            debounce: Duration::from_secs_f64(config.debounce_seconds),
            max_age: Duration::from_secs_f64(config.max_age_seconds),
            max_batch_size: config.max_batch_size,
            inner,
            notify,
            coordinator: Mutex::new(Some(coordinator)),
        }
    }

    /// Register a callback invoked with every flushed batch.
    ///
    /// A callback returning an error is logged and does not affect the flush
    /// or the other callbacks.
    pub async fn register_callback(&self, callback: FlushCallback) {
        let mut inner = self.inner.lock().await;
        inner.callbacks.push(callback);
    }

    /// Enqueue one matched alert.
    ///
    /// Alerts sharing `(rule.name, event.source_id, event.class_name)` with an
    /// already-pending entry collapse into it. Every enqueue re-arms the
    /// debounce deadline; the max-age deadline is armed only when the queue
    /// transitions from empty to non-empty. Reaching `max_batch_size` distinct
    /// entries flushes inline before this call returns.
    pub async fn enqueue(
        &self,
        event: SecurityEvent,
        rule: AlertRule,
        message: impl Into<String>,
    ) -> Result<(), QueueError> {
        let message = message.into();
        let flush = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            if inner.shut_down {
                return Err(QueueError::ShutDown);
            }

            let key = DedupKey {
                rule_name: rule.name.clone(),
                source_id: event.source_id.clone(),
                class_name: event.class_name.clone(),
            };
            let now_wall = Utc::now();
            let now = Instant::now();
            let was_empty = inner.pending.is_empty();

            match inner.pending.entry(key.clone()) {
                Entry::Occupied(mut occupied) => {
                    let entry = occupied.get_mut();
                    entry.count += 1;
                    entry.last_seen = now_wall;
                    entry.latest_message = message;
                    inner.total_deduplicated += 1;
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(PendingAlert {
                        key,
                        count: 1,
                        first_seen: now_wall,
                        last_seen: now_wall,
                        latest_message: message,
                        rule,
                        event,
                    });
                }
            }
            inner.total_enqueued += 1;

            if was_empty {
                inner.age_at = Some(now + self.max_age);
            }
            inner.debounce_at = Some(now + self.debounce);

            if inner.pending.len() >= self.max_batch_size {
                Some(Self::take_batch(inner))
            } else {
                None
            }
        };

        match flush {
            Some((batch, callbacks)) => Self::deliver(batch, callbacks).await,
            None => self.notify.notify_one(),
        }
        Ok(())
    }

    /// Current queue counters.
    pub async fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().await;
        QueueStats {
            total_enqueued: inner.total_enqueued,
            total_deduplicated: inner.total_deduplicated,
            total_flushed: inner.total_flushed,
            pending: inner.pending.len(),
        }
    }

    /// Shut the queue down: cancel deadlines, deliver one terminal flush of
    /// anything still pending, and stop the coordinator.
    ///
    /// Idempotent; shutting down an empty queue invokes no callback.
    pub async fn shutdown(&self) {
        let flush = {
            let mut inner = self.inner.lock().await;
            if inner.shut_down {
                None
            } else {
                inner.shut_down = true;
                inner.debounce_at = None;
                inner.age_at = None;
                if inner.pending.is_empty() {
                    None
                } else {
                    Some(Self::take_batch(&mut inner))
                }
            }
        };
        // Wake the coordinator so it observes the shutdown flag and exits.
        self.notify.notify_one();

        if let Some((batch, callbacks)) = flush {
            Self::deliver(batch, callbacks).await;
        }

        let handle = self.coordinator.lock().await.take();
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                tracing::warn!(%error, "Event queue coordinator exited abnormally");
            }
        }
    }

    /// Snapshot and clear the pending map, cancel deadlines, and account the
    /// flush. Callers deliver the returned batch after releasing the lock.
    fn take_batch(inner: &mut QueueInner) -> (Vec<PendingAlert>, Vec<FlushCallback>) {
        let mut batch: Vec<PendingAlert> = inner.pending.drain().map(|(_, entry)| entry).collect();
        batch.sort_by(|a, b| a.first_seen.cmp(&b.first_seen));
        inner.debounce_at = None;
        inner.age_at = None;
        inner.total_flushed += batch.len() as u64;
        (batch, inner.callbacks.clone())
    }

    /// Invoke every callback with its own copy of the batch. Callback errors
    /// are logged and do not stop later callbacks.
    async fn deliver(batch: Vec<PendingAlert>, callbacks: Vec<FlushCallback>) {
        if batch.is_empty() {
            return;
        }
        let batch_id = Uuid::new_v4();
        tracing::debug!(
            batch_id = %batch_id,
            entries = batch.len(),
            subscribers = callbacks.len(),
            "Flushing alert batch"
        );
        for callback in callbacks {
            if let Err(error) = callback(batch.clone()).await {
                tracing::warn!(batch_id = %batch_id, %error, "Flush callback failed");
            }
        }
    }

    /// Coordinator loop: wait for the nearer of the debounce/max-age deadlines
    /// and flush when one elapses. Any queue change nudges the loop awake so it
    /// re-reads the deadlines.
    async fn coordinate(inner: Arc<Mutex<QueueInner>>, notify: Arc<Notify>) {
        loop {
            let next_deadline = {
                let guard = inner.lock().await;
                if guard.shut_down {
                    break;
                }
                match (guard.debounce_at, guard.age_at) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (Some(a), None) => Some(a),
                    (None, Some(b)) => Some(b),
                    (None, None) => None,
                }
            };

            let Some(deadline) = next_deadline else {
                notify.notified().await;
                continue;
            };

            tokio::select! {
                () = tokio::time::sleep_until(deadline) => {
                    let flush = {
                        let mut guard = inner.lock().await;
                        let now = Instant::now();
                        let due = guard.debounce_at.is_some_and(|at| now >= at)
                            || guard.age_at.is_some_and(|at| now >= at);
                        if due && !guard.pending.is_empty() {
                            Some(Self::take_batch(&mut guard))
                        } else {
                            None
                        }
                    };
                    if let Some((batch, callbacks)) = flush {
                        Self::deliver(batch, callbacks).await;
                    }
                }
                () = notify.notified() => {
                    // Deadlines changed (or shutdown); re-read them.
                }
            }
        }
    }
}
