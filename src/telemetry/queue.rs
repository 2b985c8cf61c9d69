//! Queue operation span helpers.
//!
//! Provides span creation and state-transition recording for messages
//! moving through the claim protocol.

use tracing::Span;

use crate::model::{MessageId, Status};

/// Start a span for one queue operation.
///
/// The `message.id` field is declared empty and is filled once the
/// operation knows which message it touched.
pub fn start_queue_span(operation: &str, queue: &str) -> Span {
    tracing::info_span!(
        "queue.operation",
        "queue.operation" = operation,
        "queue.name" = queue,
        "message.id" = tracing::field::Empty,
    )
}

/// Record the message id on a span created by [`start_queue_span`].
pub fn record_message_id(span: &Span, id: MessageId) {
    span.record("message.id", id.0);
}

/// Record a state transition event on the given span.
///
/// Emits a tracing `debug` event scoped to the span.
pub fn record_state_transition(span: &Span, id: MessageId, from: Status, to: Status) {
    span.in_scope(|| {
        tracing::debug!(message_id = id.0, from = %from, to = %to, "state_transition");
    });
}
