//! Queue store abstraction.
//!
//! Every queue operation is a single atomic statement against the store.
//! Two implementations exist:
//!
//! - [`crate::db::Db`]: Postgres. Claims use `FOR UPDATE SKIP LOCKED`, so
//!   concurrent receivers skip each other's rows instead of blocking.
//! - [`MemoryStore`]: in-process. Claims are arbitrated by a compare-and-set
//!   on status under one short lock. Time comes from an injectable
//!   [`Clock`](crate::clock::Clock).
//!
//! No implementation caches message state; every call reads the store.

mod memory;

pub use memory::MemoryStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{MessageId, QueueMessage, Status, StatusCount};

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a new `pending` message and return its id.
    async fn send(&self, queue: &str, payload: &serde_json::Value) -> Result<MessageId>;

    /// Claim the oldest unlocked `pending` message in `queue`.
    ///
    /// Sets `processing`, bumps `attempts`, stamps `processed_at`.
    /// `Ok(None)` means nothing was available to claim.
    async fn receive(&self, queue: &str) -> Result<Option<QueueMessage>>;

    /// `processing → completed`. False if the message is unknown or not processing.
    async fn complete(&self, id: MessageId) -> Result<bool>;

    /// `processing → failed`. False if the message is unknown or not processing.
    async fn fail(&self, id: MessageId) -> Result<bool>;

    /// Return `processing` messages of `queue` claimed longer than `timeout`
    /// ago to `pending`. Returns how many were requeued.
    async fn requeue_stale(&self, queue: &str, timeout: Duration) -> Result<u64>;

    /// Same as [`requeue_stale`](Self::requeue_stale) across every queue.
    async fn requeue_stale_all(&self, timeout: Duration) -> Result<u64>;

    /// Message counts per status, ordered by status name.
    async fn stats(&self, queue: &str) -> Result<Vec<StatusCount>>;

    /// Messages of `queue` in FIFO order, optionally filtered by status.
    async fn list(
        &self,
        queue: &str,
        status: Option<Status>,
        limit: i64,
    ) -> Result<Vec<QueueMessage>>;

    /// Fetch one message by id.
    async fn get(&self, id: MessageId) -> Result<Option<QueueMessage>>;

    /// Round trip to the store.
    async fn health_check(&self) -> Result<()>;
}
