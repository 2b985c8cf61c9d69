//! Queue HTTP handlers. Each one is a thin adapter over [`QueueService`].
//!
//! [`QueueService`]: crate::queue::QueueService

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::AppState;
use super::error::ApiError;
use crate::model::{MessageId, QueueMessage, Status, StatusCount};
use crate::queue::DEFAULT_LIST_LIMIT;

/// Send message request. A missing `payload` (or an empty body) enqueues `{}`.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(default = "empty_object")]
    pub payload: Value,
}

fn empty_object() -> Value {
    json!({})
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub message_id: MessageId,
    pub queue: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    pub completed: bool,
    pub message_id: MessageId,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailResponse {
    pub failed: bool,
    pub message_id: MessageId,
}

/// Query for `GET /queue/{queue}/messages`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// `GET /health`
pub async fn health(State(service): State<AppState>) -> Result<Json<Value>, ApiError> {
    service
        .health_check()
        .await
        .map_err(|e| ApiError::ServiceUnavailable(format!("store unavailable: {e}")))?;
    Ok(Json(json!({ "status": "ok" })))
}

/// `POST /queue/{queue}/send`
pub async fn send_message(
    State(service): State<AppState>,
    Path(queue): Path<String>,
    body: Bytes,
) -> Result<Json<SendResponse>, ApiError> {
    let request = parse_send_request(&body)?;
    let id = service.send(&queue, &request.payload).await?;
    Ok(Json(SendResponse {
        message_id: id,
        queue,
        status: "sent".to_string(),
    }))
}

fn parse_send_request(body: &[u8]) -> Result<SendRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SendRequest {
            payload: empty_object(),
        });
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("malformed request body: {e}")))
}

/// `POST /queue/{queue}/receive` — 200 with the claimed message, 204 if none.
pub async fn receive_message(
    State(service): State<AppState>,
    Path(queue): Path<String>,
) -> Result<Response, ApiError> {
    match service.receive(&queue).await? {
        Some(msg) => Ok(Json(msg).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// `POST /queue/complete/{message_id}`
pub async fn complete_message(
    State(service): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<CompleteResponse>, ApiError> {
    let id = message_id(path)?;
    let completed = service.complete(id).await?;
    Ok(Json(CompleteResponse {
        completed,
        message_id: id,
    }))
}

/// `POST /queue/fail/{message_id}`
pub async fn fail_message(
    State(service): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<FailResponse>, ApiError> {
    let id = message_id(path)?;
    let failed = service.fail(id).await?;
    Ok(Json(FailResponse {
        failed,
        message_id: id,
    }))
}

fn message_id(path: Result<Path<i64>, PathRejection>) -> Result<MessageId, ApiError> {
    path.map(|Path(id)| MessageId(id))
        .map_err(|e| ApiError::BadRequest(format!("invalid message id: {}", e.body_text())))
}

/// `GET /queue/{queue}/stats`
pub async fn queue_stats(
    State(service): State<AppState>,
    Path(queue): Path<String>,
) -> Result<Json<Vec<StatusCount>>, ApiError> {
    Ok(Json(service.stats(&queue).await?))
}

/// `GET /queue/{queue}/messages?status=&limit=`
pub async fn list_messages(
    State(service): State<AppState>,
    Path(queue): Path<String>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<QueueMessage>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(s.parse::<Status>()?),
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Ok(Json(service.list(&queue, status, limit).await?))
}
