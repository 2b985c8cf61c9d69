//! Queue service: the public API for producers, workers and the reaper.
//!
//! Validates input before it reaches the store, then forwards each call as
//! one atomic store operation. Outcomes that callers are expected to retry
//! on are values, not errors: `receive` returns `None` when nothing is
//! claimable, `complete`/`fail` return `false` when the message is unknown
//! or not currently `processing`. Storage failures surface as
//! [`Error::Storage`] and are never retried here.

pub mod reaper;

pub use reaper::{Reaper, ReaperConfig};

use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::{Instrument, debug};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::model::{MessageId, QueueMessage, Status, StatusCount};
use crate::store::{MemoryStore, QueueStore};
use crate::telemetry::metrics;
use crate::telemetry::queue::{record_message_id, record_state_transition, start_queue_span};

/// Page size for `list` when the caller gives none.
pub const DEFAULT_LIST_LIMIT: i64 = 20;

/// Upper bound on a single `list` page.
pub const MAX_LIST_LIMIT: i64 = 1000;

/// Longest accepted visibility timeout (one year). Postgres cannot
/// subtract much larger intervals from `NOW()`.
pub const MAX_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Queue names that collide with the `/queue/complete/{id}` and
/// `/queue/fail/{id}` routes.
pub const RESERVED_QUEUE_NAMES: [&str; 2] = ["complete", "fail"];

#[derive(Clone)]
pub struct QueueService {
    store: Arc<dyn QueueStore>,
}

impl QueueService {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Service over an in-process store (for tests and local runs).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// In-process store reading time from `clock`.
    pub fn in_memory_with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(MemoryStore::with_clock(clock)))
    }

    /// Enqueue a payload. Returns the new message id.
    pub async fn send(&self, queue: &str, payload: &serde_json::Value) -> Result<MessageId> {
        validate_queue(queue)?;
        validate_payload(payload)?;
        let span = start_queue_span("send", queue);
        let start = Instant::now();

        let id = self.store.send(queue, payload).instrument(span.clone()).await?;

        record_message_id(&span, id);
        record_operation(queue, "send", start);
        Ok(id)
    }

    /// Claim the oldest claimable message in `queue`, if any.
    pub async fn receive(&self, queue: &str) -> Result<Option<QueueMessage>> {
        validate_queue(queue)?;
        let span = start_queue_span("receive", queue);
        let start = Instant::now();

        let msg = self.store.receive(queue).instrument(span.clone()).await?;

        match &msg {
            Some(m) => {
                record_message_id(&span, m.id);
                record_state_transition(&span, m.id, Status::Pending, Status::Processing);
                record_operation(queue, "receive", start);
            }
            None => record_operation(queue, "receive_empty", start),
        }
        Ok(msg)
    }

    /// Acknowledge a claimed message. False if it was not `processing`.
    pub async fn complete(&self, id: MessageId) -> Result<bool> {
        self.resolve(id, Resolution::Complete).await
    }

    /// Dead-letter a claimed message. False if it was not `processing`.
    pub async fn fail(&self, id: MessageId) -> Result<bool> {
        self.resolve(id, Resolution::Fail).await
    }

    async fn resolve(&self, id: MessageId, resolution: Resolution) -> Result<bool> {
        let (operation, to) = match resolution {
            Resolution::Complete => ("complete", Status::Completed),
            Resolution::Fail => ("fail", Status::Failed),
        };
        let span = start_queue_span(operation, "");
        record_message_id(&span, id);
        let start = Instant::now();

        let applied = match resolution {
            Resolution::Complete => self.store.complete(id).instrument(span.clone()).await?,
            Resolution::Fail => self.store.fail(id).instrument(span.clone()).await?,
        };

        if applied {
            record_state_transition(&span, id, Status::Processing, to);
            record_operation("", operation, start);
        } else {
            debug!(message_id = id.0, operation, "message not processing, nothing to do");
            record_operation("", &format!("{operation}_noop"), start);
        }
        Ok(applied)
    }

    /// Return messages of `queue` claimed longer than `timeout` ago to `pending`.
    pub async fn requeue_stale(&self, queue: &str, timeout: Duration) -> Result<u64> {
        validate_queue(queue)?;
        validate_timeout(timeout)?;
        let requeued = self
            .store
            .requeue_stale(queue, timeout)
            .instrument(start_queue_span("requeue_stale", queue))
            .await?;
        record_requeued(queue, requeued);
        Ok(requeued)
    }

    /// Return stale claims in every queue to `pending`.
    pub async fn requeue_stale_all(&self, timeout: Duration) -> Result<u64> {
        validate_timeout(timeout)?;
        let requeued = self
            .store
            .requeue_stale_all(timeout)
            .instrument(start_queue_span("requeue_stale", "*"))
            .await?;
        record_requeued("*", requeued);
        Ok(requeued)
    }

    /// Message counts per status.
    pub async fn stats(&self, queue: &str) -> Result<Vec<StatusCount>> {
        validate_queue(queue)?;
        self.store.stats(queue).await
    }

    /// Browse messages in FIFO order. `limit` must be positive and is
    /// capped at [`MAX_LIST_LIMIT`].
    pub async fn list(
        &self,
        queue: &str,
        status: Option<Status>,
        limit: i64,
    ) -> Result<Vec<QueueMessage>> {
        validate_queue(queue)?;
        if limit < 1 {
            return Err(Error::Validation(format!(
                "limit must be at least 1, got {limit}"
            )));
        }
        self.store
            .list(queue, status, limit.min(MAX_LIST_LIMIT))
            .await
    }

    /// Fetch one message by id.
    pub async fn get(&self, id: MessageId) -> Result<Option<QueueMessage>> {
        self.store.get(id).await
    }

    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await
    }
}

/// How a worker resolves its claim.
#[derive(Debug, Clone, Copy)]
enum Resolution {
    Complete,
    Fail,
}

fn validate_queue(queue: &str) -> Result<()> {
    if queue.trim().is_empty() {
        return Err(Error::Validation("queue name must not be empty".to_string()));
    }
    if queue.contains('\0') {
        return Err(Error::Validation(
            "queue name must not contain NUL characters".to_string(),
        ));
    }
    if RESERVED_QUEUE_NAMES.contains(&queue) {
        return Err(Error::Validation(format!("queue name {queue:?} is reserved")));
    }
    Ok(())
}

/// Postgres `jsonb` cannot store `\u0000` in strings or keys.
fn validate_payload(payload: &serde_json::Value) -> Result<()> {
    use serde_json::Value;

    let has_nul = |s: &str| s.contains('\0');
    match payload {
        Value::String(s) if has_nul(s) => Err(Error::Validation(
            "payload strings must not contain NUL characters".to_string(),
        )),
        Value::Array(items) => items.iter().try_for_each(validate_payload),
        Value::Object(map) => map.iter().try_for_each(|(key, value)| {
            if has_nul(key) {
                return Err(Error::Validation(
                    "payload keys must not contain NUL characters".to_string(),
                ));
            }
            validate_payload(value)
        }),
        _ => Ok(()),
    }
}

fn validate_timeout(timeout: Duration) -> Result<()> {
    if timeout > MAX_VISIBILITY_TIMEOUT {
        return Err(Error::Validation(format!(
            "visibility timeout must be at most {}s, got {}s",
            MAX_VISIBILITY_TIMEOUT.as_secs(),
            timeout.as_secs()
        )));
    }
    Ok(())
}

fn record_operation(queue: &str, operation: &str, start: Instant) {
    let mut labels = vec![KeyValue::new("operation", operation.to_string())];
    if !queue.is_empty() {
        labels.push(KeyValue::new("queue", queue.to_string()));
    }
    metrics::queue_operations().add(1, &labels);
    metrics::operation_duration_ms().record(
        start.elapsed().as_secs_f64() * 1000.0,
        &[KeyValue::new("operation", format!("queue.{operation}"))],
    );
}

fn record_requeued(queue: &str, requeued: u64) {
    if requeued > 0 {
        metrics::messages_requeued().add(requeued, &[KeyValue::new("queue", queue.to_string())]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn blank_queue_names_are_rejected() {
        let service = QueueService::in_memory();
        for name in ["", "   "] {
            assert!(matches!(
                service.send(name, &json!({})).await,
                Err(Error::Validation(_))
            ));
            assert!(matches!(
                service.receive(name).await,
                Err(Error::Validation(_))
            ));
            assert!(matches!(service.stats(name).await, Err(Error::Validation(_))));
        }
    }

    #[tokio::test]
    async fn nul_in_queue_name_is_rejected() {
        let service = QueueService::in_memory();
        assert!(matches!(
            service.send("a\0b", &json!({})).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            service.receive("a\0b").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn route_names_are_reserved() {
        let service = QueueService::in_memory();
        for name in RESERVED_QUEUE_NAMES {
            assert!(matches!(
                service.send(name, &json!({})).await,
                Err(Error::Validation(_))
            ));
        }
        assert!(service.send("completed", &json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn nul_in_payload_is_rejected_before_storage() {
        let service = QueueService::in_memory();
        for payload in [
            json!("a\0b"),
            json!({ "s": "a\0b" }),
            json!({ "nested": [1, { "deep": "x\0" }] }),
            json!({ "k\0": 1 }),
        ] {
            assert!(matches!(
                service.send("q", &payload).await,
                Err(Error::Validation(_))
            ));
        }
        assert!(service.stats("q").await.unwrap().is_empty());
        assert!(service.send("q", &json!({ "s": "plain" })).await.is_ok());
    }

    #[tokio::test]
    async fn oversized_visibility_timeout_is_rejected() {
        let service = QueueService::in_memory();
        let huge = Duration::from_secs(u64::MAX / 4);
        assert!(matches!(
            service.requeue_stale_all(huge).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            service.requeue_stale("q", huge).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(
            service
                .requeue_stale_all(MAX_VISIBILITY_TIMEOUT)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn complete_and_fail_reach_their_own_terminal_status() {
        let service = QueueService::in_memory();
        let done = service.send("q", &json!({})).await.unwrap();
        let dead = service.send("q", &json!({})).await.unwrap();
        service.receive("q").await.unwrap();
        service.receive("q").await.unwrap();

        assert!(service.complete(done).await.unwrap());
        assert!(service.fail(dead).await.unwrap());
        assert_eq!(
            service.get(done).await.unwrap().unwrap().status,
            Status::Completed
        );
        assert_eq!(
            service.get(dead).await.unwrap().unwrap().status,
            Status::Failed
        );
    }

    #[tokio::test]
    async fn list_rejects_non_positive_limit() {
        let service = QueueService::in_memory();
        assert!(matches!(
            service.list("q", None, 0).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            service.list("q", None, -5).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn list_caps_limit() {
        let service = QueueService::in_memory();
        service.send("q", &json!({})).await.unwrap();
        let messages = service.list("q", None, i64::MAX).await.unwrap();
        assert_eq!(messages.len(), 1);
    }
}
