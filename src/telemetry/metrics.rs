//! Metric instrument factories for pgqueue.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"pgqueue"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for pgqueue instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("pgqueue")
}

/// Counter: queue-level operations.
/// Labels: `queue`, `operation` ("send" | "receive" | "receive_empty" |
/// "complete" | "complete_noop" | "fail" | "fail_noop").
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("pgqueue.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: messages returned to pending after their visibility timeout.
/// Labels: `queue` ("*" for an all-queue sweep).
pub fn messages_requeued() -> Counter<u64> {
    meter()
        .u64_counter("pgqueue.queue.requeued")
        .with_description("Messages requeued after visibility timeout")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("pgqueue.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
