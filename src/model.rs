//! Core data model.
//!
//! A queue message is a unit of work sitting in a named queue. It has an
//! opaque JSON payload, a lifecycle status, and an attempt counter that
//! records how many times a worker has claimed it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ---------------------------------------------------------------------------
// Queue Message
// ---------------------------------------------------------------------------

/// A message stored in the queue table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    /// Unique, monotonically assigned identifier. Never reused.
    pub id: MessageId,

    /// Logical queue this message belongs to.
    pub queue: String,

    /// Arbitrary data for the consumer. The queue doesn't interpret it.
    pub payload: serde_json::Value,

    /// Current lifecycle status.
    pub status: Status,

    /// Number of successful claims so far.
    pub attempts: i32,

    /// Insertion time. Defines FIFO order within a queue (ties broken by id).
    pub created_at: DateTime<Utc>,

    /// Time of the most recent claim or terminal transition.
    /// None until first claimed, and again after a timeout rollback.
    pub processed_at: Option<DateTime<Utc>>,
}

/// Newtype for message IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by a worker, hidden from other receivers.
    Processing,
    /// Acknowledged by the worker. Terminal.
    Completed,
    /// Dead-lettered by the worker. Terminal.
    Failed,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Pending,
        Status::Processing,
        Status::Completed,
        Status::Failed,
    ];

    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Pending) // visibility timeout expired
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "processing" => Ok(Status::Processing),
            "completed" => Ok(Status::Completed),
            "failed" => Ok(Status::Failed),
            other => Err(Error::Validation(format!("unknown status: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Number of messages in one status for a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: Status,
    pub count: i64,
}
