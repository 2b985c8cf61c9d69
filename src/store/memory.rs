//! In-process queue store.
//!
//! Holds messages in a `BTreeMap` keyed by id behind a `parking_lot::Mutex`.
//! Each operation takes the lock once and never awaits while holding it, so
//! a claim is a compare-and-set on status that no other caller can interleave
//! with, and no caller waits longer than one map scan.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::QueueStore;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::model::{MessageId, QueueMessage, Status, StatusCount};

pub struct MemoryStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct Inner {
    last_id: i64,
    messages: BTreeMap<MessageId, QueueMessage>,
}

impl MemoryStore {
    /// Memory store on wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    /// Transition `id` from `processing` to `to`, stamping `processed_at`.
    fn resolve(&self, id: MessageId, to: Status) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        match inner.messages.get_mut(&id) {
            Some(msg) if msg.status.can_transition_to(to) => {
                msg.status = to;
                msg.processed_at = Some(now);
                true
            }
            _ => false,
        }
    }

    fn requeue_where(&self, timeout: Duration, in_scope: impl Fn(&QueueMessage) -> bool) -> u64 {
        let Some(cutoff) = cutoff(self.clock.now(), timeout) else {
            return 0;
        };
        let mut inner = self.inner.lock();
        let mut requeued = 0;
        for msg in inner.messages.values_mut() {
            let stale = msg.status.can_transition_to(Status::Pending)
                && msg.processed_at.is_some_and(|at| at < cutoff);
            if stale && in_scope(msg) {
                msg.status = Status::Pending;
                msg.processed_at = None;
                requeued += 1;
            }
        }
        requeued
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// `now - timeout`, or None if that predates the representable range
/// (nothing can be older than it).
fn cutoff(now: DateTime<Utc>, timeout: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|timeout| now.checked_sub_signed(timeout))
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn send(&self, queue: &str, payload: &serde_json::Value) -> Result<MessageId> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.last_id += 1;
        let id = MessageId(inner.last_id);
        inner.messages.insert(
            id,
            QueueMessage {
                id,
                queue: queue.to_string(),
                payload: payload.clone(),
                status: Status::Pending,
                attempts: 0,
                created_at: now,
                processed_at: None,
            },
        );
        Ok(id)
    }

    async fn receive(&self, queue: &str) -> Result<Option<QueueMessage>> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let oldest = inner
            .messages
            .values()
            .filter(|m| m.queue == queue && m.status.can_transition_to(Status::Processing))
            .min_by_key(|m| (m.created_at, m.id))
            .map(|m| m.id);

        let Some(id) = oldest else {
            return Ok(None);
        };
        let Some(msg) = inner.messages.get_mut(&id) else {
            return Ok(None);
        };
        msg.status = Status::Processing;
        msg.attempts += 1;
        msg.processed_at = Some(now);
        Ok(Some(msg.clone()))
    }

    async fn complete(&self, id: MessageId) -> Result<bool> {
        Ok(self.resolve(id, Status::Completed))
    }

    async fn fail(&self, id: MessageId) -> Result<bool> {
        Ok(self.resolve(id, Status::Failed))
    }

    async fn requeue_stale(&self, queue: &str, timeout: Duration) -> Result<u64> {
        Ok(self.requeue_where(timeout, |m| m.queue == queue))
    }

    async fn requeue_stale_all(&self, timeout: Duration) -> Result<u64> {
        Ok(self.requeue_where(timeout, |_| true))
    }

    async fn stats(&self, queue: &str) -> Result<Vec<StatusCount>> {
        let inner = self.inner.lock();
        let mut counts: BTreeMap<&'static str, StatusCount> = BTreeMap::new();
        for msg in inner.messages.values().filter(|m| m.queue == queue) {
            counts
                .entry(msg.status.as_str())
                .or_insert(StatusCount {
                    status: msg.status,
                    count: 0,
                })
                .count += 1;
        }
        Ok(counts.into_values().collect())
    }

    async fn list(
        &self,
        queue: &str,
        status: Option<Status>,
        limit: i64,
    ) -> Result<Vec<QueueMessage>> {
        let inner = self.inner.lock();
        let mut messages: Vec<QueueMessage> = inner
            .messages
            .values()
            .filter(|m| m.queue == queue && status.is_none_or(|s| m.status == s))
            .cloned()
            .collect();
        messages.sort_by_key(|m| (m.created_at, m.id));
        messages.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(messages)
    }

    async fn get(&self, id: MessageId) -> Result<Option<QueueMessage>> {
        Ok(self.inner.lock().messages.get(&id).cloned())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
