//! Queue operations on the `message_queue` table via direct SQLx.
//!
//! `receive` is one `UPDATE ... WHERE id = (SELECT ... FOR UPDATE SKIP LOCKED)`
//! statement: the subquery locks the oldest pending row nobody else holds,
//! and the update flips it to `processing` in the same statement. Concurrent
//! receivers skip locked rows instead of waiting on them, which makes FIFO
//! order best-effort under contention.
//!
//! `complete`/`fail` are guarded by `status = 'processing'` in the WHERE
//! clause, so a second call or a call on an unclaimed message changes nothing.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{MessageId, QueueMessage, Status, StatusCount};
use crate::store::QueueStore;

use super::Db;

const MESSAGE_COLUMNS: &str =
    "id, queue, payload, status, attempts, created_at, processed_at";

#[async_trait]
impl QueueStore for Db {
    async fn send(&self, queue: &str, payload: &serde_json::Value) -> Result<MessageId> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO message_queue (queue, payload, status)
             VALUES ($1, $2, 'pending')
             RETURNING id",
        )
        .bind(queue)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;
        Ok(MessageId(row.0))
    }

    async fn receive(&self, queue: &str) -> Result<Option<QueueMessage>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "UPDATE message_queue
             SET status = 'processing',
                 attempts = attempts + 1,
                 processed_at = NOW()
             WHERE id = (
                 SELECT id FROM message_queue
                 WHERE queue = $1 AND status = 'pending'
                 ORDER BY created_at, id
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(queue)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MessageRow::try_into_message).transpose()
    }

    async fn complete(&self, id: MessageId) -> Result<bool> {
        resolve(self, id, Status::Completed).await
    }

    async fn fail(&self, id: MessageId) -> Result<bool> {
        resolve(self, id, Status::Failed).await
    }

    async fn requeue_stale(&self, queue: &str, timeout: Duration) -> Result<u64> {
        let rows_affected = sqlx::query(
            "UPDATE message_queue
             SET status = 'pending', processed_at = NULL
             WHERE queue = $1 AND status = 'processing'
               AND processed_at < NOW() - make_interval(secs => $2)",
        )
        .bind(queue)
        .bind(timeout.as_secs_f64())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows_affected)
    }

    async fn requeue_stale_all(&self, timeout: Duration) -> Result<u64> {
        let rows_affected = sqlx::query(
            "UPDATE message_queue
             SET status = 'pending', processed_at = NULL
             WHERE status = 'processing'
               AND processed_at < NOW() - make_interval(secs => $1)",
        )
        .bind(timeout.as_secs_f64())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows_affected)
    }

    async fn stats(&self, queue: &str) -> Result<Vec<StatusCount>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*)
             FROM message_queue
             WHERE queue = $1
             GROUP BY status
             ORDER BY status",
        )
        .bind(queue)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(status, count)| {
                Ok(StatusCount {
                    status: status.parse()?,
                    count,
                })
            })
            .collect()
    }

    async fn list(
        &self,
        queue: &str,
        status: Option<Status>,
        limit: i64,
    ) -> Result<Vec<QueueMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM message_queue
             WHERE queue = $1
             AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at, id
             LIMIT $3"
        ))
        .bind(queue)
        .bind(status.map(Status::as_str))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MessageRow::try_into_message).collect()
    }

    async fn get(&self, id: MessageId) -> Result<Option<QueueMessage>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM message_queue WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MessageRow::try_into_message).transpose()
    }

    async fn health_check(&self) -> Result<()> {
        Db::health_check(self).await
    }
}

/// `processing → to`, stamping `processed_at`. True if a row changed.
async fn resolve(db: &Db, id: MessageId, to: Status) -> Result<bool> {
    let rows_affected = sqlx::query(
        "UPDATE message_queue SET status = $1, processed_at = NOW()
         WHERE id = $2 AND status = 'processing'",
    )
    .bind(to.as_str())
    .bind(id.0)
    .execute(&db.pool)
    .await?
    .rows_affected();
    Ok(rows_affected > 0)
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    queue: String,
    payload: serde_json::Value,
    status: String,
    attempts: i32,
    created_at: chrono::DateTime<chrono::Utc>,
    processed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl MessageRow {
    fn try_into_message(self) -> Result<QueueMessage> {
        Ok(QueueMessage {
            id: MessageId(self.id),
            queue: self.queue,
            payload: self.payload,
            status: self.status.parse()?,
            attempts: self.attempts,
            created_at: self.created_at,
            processed_at: self.processed_at,
        })
    }
}
