//! HTTP API module.
//!
//! REST endpoints over the queue service:
//!
//! | Method | Path                             | Operation |
//! |--------|----------------------------------|-----------|
//! | POST   | `/queue/{queue}/send`            | send      |
//! | POST   | `/queue/{queue}/receive`         | receive   |
//! | POST   | `/queue/complete/{message_id}`   | complete  |
//! | POST   | `/queue/fail/{message_id}`       | fail      |
//! | GET    | `/queue/{queue}/stats`           | stats     |
//! | GET    | `/queue/{queue}/messages`        | list      |
//! | GET    | `/health`                        | health    |
//!
//! `complete` and `fail` are reserved queue names, since
//! `/queue/complete/send` would otherwise be ambiguous.

pub mod error;
pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::queue::QueueService;

pub use error::ApiError;

/// Shared application state.
pub type AppState = QueueService;

/// Create the HTTP router with all API routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/queue/complete/{message_id}", post(handlers::complete_message))
        .route("/queue/fail/{message_id}", post(handlers::fail_message))
        .route("/queue/{queue}/send", post(handlers::send_message))
        .route("/queue/{queue}/receive", post(handlers::receive_message))
        .route("/queue/{queue}/stats", get(handlers::queue_stats))
        .route("/queue/{queue}/messages", get(handlers::list_messages))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
